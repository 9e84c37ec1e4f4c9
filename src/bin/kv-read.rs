use clap::Arg;
use std::process;
use tablet_client::opts::{connect, ClientOpts};
use tablet_client::{auth, with_session, Authorizations, NewTableConfiguration, Result, RowRange};
use tracing::{debug, info};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = ClientOpts::command("kv-read", "Scan a row range of a table", "hellotable")
        .arg(
            Arg::new("start")
                .help("First row, inclusive")
                .long("start")
                .default_value("row_0"),
        )
        .arg(
            Arg::new("end")
                .help("Row to stop at, exclusive")
                .long("end")
                .default_value("row_1002"),
        )
        .arg(
            Arg::new("auths")
                .help("Comma separated scan authorizations")
                .long("auths"),
        )
        .get_matches();

    let opts = ClientOpts::from_matches(&matches)?;
    opts.init_logging();
    let start = matches.get_one::<String>("start").cloned().unwrap_or_default();
    let end = matches.get_one::<String>("end").cloned().unwrap_or_default();
    let auths = match matches.get_one::<String>("auths") {
        Some(list) => Authorizations::new(list.split(',').map(str::trim).filter(|s| !s.is_empty())),
        None => Authorizations::empty(),
    };

    let config = opts.client_config()?;
    let transport = connect(&config)?;
    let credentials = auth::credentials_from_config(&config)?;

    with_session(&config, transport, credentials, |session| {
        debug!("Session created with : {}", session.whoami()?);
        session
            .table_operations()
            .create_if_absent(&opts.table, NewTableConfiguration::new())?;

        let mut scanner = session.create_scanner(&opts.table, auths)?;
        scanner.set_range(RowRange::half_open(start, end));

        let mut count = 0usize;
        for entry in scanner {
            let (key, value) = entry?;
            debug!(
                "{} {} {} {}",
                key.row_str(),
                String::from_utf8_lossy(&key.family),
                String::from_utf8_lossy(&key.qualifier),
                value
            );
            count += 1;
        }
        info!("Read {} entries from {}", count, opts.table);
        Ok(())
    })
}
