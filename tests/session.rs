mod common;

use common::{client_with_table, connect_to, hello_mutation, test_config, writer_config};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tablet_client::{
    with_session, BatchWriter, ClientConfig, ClientSession, Error, KeytabFile, LocalStore,
    NewTableConfiguration, SessionState, StaticCredential,
};
use tempfile::tempdir;

#[test]
fn test_wrong_credential_is_authentication_error() {
    let store = Arc::new(LocalStore::new());
    store.add_user("root", b"secret");

    let result = ClientSession::open(
        &test_config(),
        store,
        Box::new(StaticCredential::password("root", "guess")),
    );
    match result {
        Err(err @ Error::Authentication { .. }) => assert!(!err.is_retryable()),
        Err(other) => panic!("expected authentication error, got {:?}", other),
        Ok(_) => panic!("login with wrong password succeeded"),
    }
}

#[test]
fn test_keytab_login() {
    let dir = tempdir().unwrap();
    let keytab = dir.path().join("svc.keytab");
    fs::write(&keytab, b"\x05\x02keytab-bytes").unwrap();

    let store = Arc::new(LocalStore::new());
    let session = ClientSession::open(
        &test_config(),
        store,
        Box::new(KeytabFile::new("svc/host@EXAMPLE.COM", &keytab)),
    )
    .unwrap();
    assert_eq!(session.whoami().unwrap(), "svc/host@EXAMPLE.COM");
    assert_eq!(
        session.security_operations().list_local_users().unwrap(),
        vec!["svc/host@EXAMPLE.COM".to_string()]
    );
}

#[test]
fn test_keytab_requires_sasl() {
    let dir = tempdir().unwrap();
    let keytab = dir.path().join("svc.keytab");
    fs::write(&keytab, b"keytab").unwrap();

    let mut config = test_config();
    config.handshake.sasl_enabled = false;
    let result = ClientSession::open(
        &config,
        Arc::new(LocalStore::new()),
        Box::new(KeytabFile::new("svc", &keytab)),
    );
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[test]
fn test_revoked_token_is_refreshed_transparently() {
    let client = client_with_table("t");
    let before = client.session.token().unwrap();

    client.store.revoke_tokens();
    assert_eq!(client.session.table_operations().list().unwrap(), vec!["t"]);

    let after = client.session.token().unwrap();
    assert_ne!(before.secret, after.secret);
    assert_eq!(client.session.state(), SessionState::Authenticated);
}

#[test]
fn test_token_refreshed_before_expiry() {
    let config = ClientConfig {
        token_ttl: Duration::from_millis(1000),
        refresh_margin: Duration::from_millis(600),
        ..test_config()
    };
    let client = connect_to(Arc::new(LocalStore::new()), &config);
    let first = client.session.token().unwrap();

    thread::sleep(Duration::from_millis(500));
    let second = client.session.token().unwrap();
    assert_ne!(first.secret, second.secret);
    assert!(!second.is_expired());
}

#[test]
fn test_writes_continue_across_token_revocation() {
    let client = client_with_table("t");
    let writer = BatchWriter::new(client.session.clone(), "t", writer_config(10)).unwrap();
    for i in 0..25 {
        if i == 12 {
            client.store.revoke_tokens();
        }
        writer.add_mutation(hello_mutation(i, 1)).unwrap();
    }
    writer.close().unwrap();
    assert_eq!(client.store.raw_entry_count("t").unwrap(), 25);
}

#[test]
fn test_table_administration_errors() {
    let client = client_with_table("t");
    let tables = client.session.table_operations();

    assert!(matches!(
        tables.create("t", NewTableConfiguration::new()),
        Err(Error::TableExists(name)) if name == "t"
    ));
    assert!(!tables.create_if_absent("t", NewTableConfiguration::new()).unwrap());
    assert!(matches!(tables.delete("missing"), Err(Error::TableNotFound(_))));
    assert!(matches!(
        BatchWriter::new(client.session.clone(), "missing", writer_config(10)),
        Err(Error::TableNotFound(_))
    ));

    tables.delete("t").unwrap();
    assert!(!tables.exists("t").unwrap());
}

#[test]
fn test_with_session_closes_on_error() {
    let store = Arc::new(LocalStore::new());
    let mut captured = None;
    let result: tablet_client::Result<()> = with_session(
        &test_config(),
        store,
        Box::new(StaticCredential::password("root", "secret")),
        |session| {
            captured = Some(Arc::clone(session));
            session.table_operations().delete("missing")
        },
    );

    assert!(matches!(result, Err(Error::TableNotFound(_))));
    let session = captured.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.whoami(), Err(Error::SessionClosed)));
}

#[test]
fn test_session_shared_across_threads() {
    let client = client_with_table("t");
    thread::scope(|s| {
        for t in 0..4 {
            let session = Arc::clone(&client.session);
            s.spawn(move || {
                let writer = session.create_batch_writer("t").unwrap();
                for i in 0..100 {
                    writer.add_mutation(hello_mutation(t * 100 + i, 2)).unwrap();
                }
                writer.close().unwrap();
            });
        }
    });
    assert_eq!(client.store.raw_entry_count("t").unwrap(), 800);
}
