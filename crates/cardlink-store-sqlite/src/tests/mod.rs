//! Tests for `SqliteStore` and the cardlink components running on it,
//! against in-memory databases.

mod concurrency;

use cardlink_core::{account::NewAccount, store::ProfileStore as _};
use std::sync::Arc;

use crate::SqliteStore;

async fn store() -> Arc<SqliteStore> {
  Arc::new(
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store"),
  )
}

fn person(name: &str) -> NewAccount {
  NewAccount {
    display_name: Some(name.into()),
    email:        Some(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
    phone:        Some("+1 555 0100".into()),
    ..Default::default()
  }
}

async fn account_id(s: &SqliteStore, name: &str) -> uuid::Uuid {
  s.create_account(person(name)).await.unwrap().account_id
}
