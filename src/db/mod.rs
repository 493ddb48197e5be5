pub mod assets;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::{Display, Error};
use log::info;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::models::{BankDetails, Event, Registration, User};
use crate::PGPool;

#[derive(Debug, Clone, Display, Error)]
pub enum StoreError {
    #[display(fmt = "duplicate record")]
    Duplicate,

    #[display(fmt = "store unavailable: {}", _0)]
    Unavailable(#[error(not(source))] String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            StoreError::Duplicate
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// Durable record store handle. Injected into the services so tests can
/// substitute [`memory::MemStore`] for the Postgres backend.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;
    async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, StoreError>;
    async fn events_created_by(
        &self,
        organizer: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<Event>, StoreError>;
    async fn events_upcoming(
        &self,
        on_or_after: NaiveDate,
        search: Option<&str>,
    ) -> Result<Vec<Event>, StoreError>;
    async fn update_event(&self, event: &Event) -> Result<(), StoreError>;
    async fn set_event_bank_details(
        &self,
        event_id: Uuid,
        bank_details: &BankDetails,
    ) -> Result<(), StoreError>;
    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError>;

    /// Capacity Ledger admission: atomically increments the attendee counter
    /// iff `current_attendees < max_attendees`. Returns whether a slot was
    /// taken. Must be a single conditional read-modify-write; two concurrent
    /// admits for the last slot must not both succeed.
    async fn try_admit(&self, event_id: Uuid) -> Result<bool, StoreError>;

    /// Compensating decrement for an admitted slot that was never persisted.
    /// Never drives the counter below zero.
    async fn release(&self, event_id: Uuid) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the (event, user) pair already
    /// holds a registration. The backing store's uniqueness guarantee is the
    /// authoritative guard; callers only use existence checks as a fast path.
    async fn insert_registration(&self, registration: &Registration) -> Result<(), StoreError>;
    async fn registration_by_id(&self, id: Uuid) -> Result<Option<Registration>, StoreError>;
    async fn registration_for(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, StoreError>;
    async fn registrations_by_event(&self, event_id: Uuid)
        -> Result<Vec<Registration>, StoreError>;
    async fn registrations_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Registration, Option<Event>)>, StoreError>;
    async fn set_registration_data(
        &self,
        id: Uuid,
        data: &Map<String, Value>,
        modified_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// `registered -> checked_in` transition. Returns whether the row
    /// actually transitioned; an already-checked-in registration is left
    /// untouched and reported as `false`.
    async fn mark_checked_in(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Object storage for uploaded QR-code images, addressable by key.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn public_url(&self, key: &str) -> String;
}

pub async fn init_db_pool(db_url: &str) -> Result<PGPool, sqlx::Error> {
    // acquire timeouts surface as StoreError::Unavailable, a retryable failure
    let pool: PGPool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(db_url)
        .await?;
    info!("connected to postgres");
    Ok(pool)
}
