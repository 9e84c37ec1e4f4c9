use clap::Arg;
use std::process;
use tablet_client::opts::{connect, ClientOpts};
use tablet_client::{admin, auth, with_session, Mutation, NewTableConfiguration, Result, TimeType};
use tracing::{debug, info, trace};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = ClientOpts::command(
        "kv-insert",
        "Create a table if needed and write rows through a batch writer",
        "hellotable",
    )
    .arg(
        Arg::new("rows")
            .help("Number of rows to write")
            .long("rows")
            .value_parser(clap::value_parser!(usize))
            .default_value("10000"),
    )
    .arg(
        Arg::new("columns")
            .help("Columns per row")
            .long("columns")
            .value_parser(clap::value_parser!(usize))
            .default_value("5"),
    )
    .get_matches();

    let opts = ClientOpts::from_matches(&matches)?;
    opts.init_logging();
    let rows = matches.get_one::<usize>("rows").copied().unwrap_or(10_000);
    let columns = matches.get_one::<usize>("columns").copied().unwrap_or(5);

    let config = opts.client_config()?;
    let transport = connect(&config)?;
    let credentials = auth::credentials_from_config(&config)?;

    with_session(&config, transport, credentials, |session| {
        debug!(
            "Session created with : {} for {:?}",
            session.whoami()?,
            config.auth_type
        );
        admin::log_tables_and_users(session);

        let ntc = NewTableConfiguration::new()
            .set_time_type(TimeType::Millis)
            .set_properties(Default::default());
        session.table_operations().create_if_absent(&opts.table, ntc)?;

        let writer = session.create_batch_writer(&opts.table)?;
        trace!("writing ...");
        for i in 0..rows {
            let mut m = Mutation::new(format!("row_{}", i));
            for j in 0..columns {
                m.put("colfam", format!("colqual_{}", j), format!("value_{}_{}", i, j));
            }
            writer.add_mutation(m)?;
            if i % 100 == 0 {
                trace!("{}", i);
            }
        }
        writer.close()?;
        info!("Wrote {} rows to {}", rows, opts.table);
        Ok(())
    })
}
