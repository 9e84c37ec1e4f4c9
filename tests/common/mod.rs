#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tablet_client::{
    BatchWriterConfig, ClientConfig, ClientSession, LocalStore, Mutation, NewTableConfiguration,
    RetryPolicy, StaticCredential, TimeType,
};

pub struct TestClient {
    pub store: Arc<LocalStore>,
    pub session: Arc<ClientSession>,
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        batch_writer: BatchWriterConfig {
            retry: RetryPolicy::immediate(3),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn connect_to(store: Arc<LocalStore>, config: &ClientConfig) -> TestClient {
    let session = ClientSession::open(
        config,
        store.clone(),
        Box::new(StaticCredential::password("root", "secret")),
    )
    .unwrap();
    TestClient { store, session }
}

/// Session against a fresh in-memory store with `table` created.
pub fn client_with_table(table: &str) -> TestClient {
    let client = connect_to(Arc::new(LocalStore::new()), &test_config());
    client
        .session
        .table_operations()
        .create(table, NewTableConfiguration::new().set_time_type(TimeType::Millis))
        .unwrap();
    client
}

pub fn writer_config(max_mutations: usize) -> BatchWriterConfig {
    BatchWriterConfig {
        max_mutations,
        max_latency: Duration::from_secs(60),
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

/// `row_<i>` with `columns` entries `colfam:colqual_<j> = value_<i>_<j>`.
pub fn hello_mutation(i: usize, columns: usize) -> Mutation {
    let mut m = Mutation::new(format!("row_{}", i));
    for j in 0..columns {
        m.put("colfam", format!("colqual_{}", j), format!("value_{}_{}", i, j));
    }
    m
}
