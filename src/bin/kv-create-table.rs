use std::process;
use tablet_client::opts::{connect, ClientOpts};
use tablet_client::{auth, with_session, NewTableConfiguration, Result, TimeType};
use tracing::info;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = ClientOpts::command(
        "kv-create-table",
        "Create a table with millisecond timestamps",
        "hellotable2",
    )
    .get_matches();

    let opts = ClientOpts::from_matches(&matches)?;
    opts.init_logging();

    let config = opts.client_config()?;
    let transport = connect(&config)?;
    let credentials = auth::credentials_from_config(&config)?;

    with_session(&config, transport, credentials, |session| {
        let tables = session.table_operations();
        let ntc = NewTableConfiguration::new().set_time_type(TimeType::Millis);
        if tables.create_if_absent(&opts.table, ntc)? {
            info!("Created table {}", opts.table);
        } else {
            info!("Table {} already exists", opts.table);
        }
        Ok(())
    })
}
