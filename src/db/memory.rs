use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{AssetStore, Store, StoreError};
use crate::models::{BankDetails, Event, Registration, RegistrationStatus, User};

/// In-memory [`Store`] used by the test suite in place of Postgres. The whole
/// table set sits behind one async mutex, so every operation (in particular
/// the capacity check-and-increment) is atomic with respect to the others.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    registrations: HashMap<Uuid, Registration>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(event: &Event, search: Option<&str>) -> bool {
    match search {
        Some(q) => {
            let q = q.to_lowercase();
            event.title.to_lowercase().contains(&q)
                || event.description.to_lowercase().contains(&q)
        }
        None => true,
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate);
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        tables.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.inner.lock().await.events.get(&id).cloned())
    }

    async fn events_created_by(
        &self,
        organizer: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<Event>, StoreError> {
        let tables = self.inner.lock().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| e.created_by == organizer && matches_search(e, search))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn events_upcoming(
        &self,
        on_or_after: NaiveDate,
        search: Option<&str>,
    ) -> Result<Vec<Event>, StoreError> {
        let tables = self.inner.lock().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| e.date >= on_or_after && matches_search(e, search))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        match tables.events.get_mut(&event.id) {
            Some(stored) => {
                // current_attendees is owned by the ledger, not the form
                let current = stored.current_attendees;
                *stored = event.clone();
                stored.current_attendees = current;
                Ok(())
            }
            None => Err(StoreError::Unavailable("no such event".to_string())),
        }
    }

    async fn set_event_bank_details(
        &self,
        event_id: Uuid,
        bank_details: &BankDetails,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(stored) = tables.events.get_mut(&event_id) {
            stored.bank_details = Some(sqlx::types::Json(bank_details.clone()));
        }
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().await.events.remove(&id);
        Ok(())
    }

    async fn try_admit(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.inner.lock().await;
        match tables.events.get_mut(&event_id) {
            Some(event) if event.current_attendees < event.max_attendees => {
                event.current_attendees += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn release(&self, event_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(event) = tables.events.get_mut(&event_id) {
            if event.current_attendees > 0 {
                event.current_attendees -= 1;
            }
        }
        Ok(())
    }

    async fn insert_registration(&self, registration: &Registration) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let duplicate = tables
            .registrations
            .values()
            .any(|r| r.event_id == registration.event_id && r.user_id == registration.user_id);
        if duplicate {
            return Err(StoreError::Duplicate);
        }
        tables.registrations.insert(registration.id, registration.clone());
        Ok(())
    }

    async fn registration_by_id(&self, id: Uuid) -> Result<Option<Registration>, StoreError> {
        Ok(self.inner.lock().await.registrations.get(&id).cloned())
    }

    async fn registration_for(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .registrations
            .values()
            .find(|r| r.event_id == event_id && r.user_id == user_id)
            .cloned())
    }

    async fn registrations_by_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<Registration>, StoreError> {
        let tables = self.inner.lock().await;
        let mut registrations: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        registrations.sort_by_key(|r| r.registered_at);
        Ok(registrations)
    }

    async fn registrations_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Registration, Option<Event>)>, StoreError> {
        let tables = self.inner.lock().await;
        let mut registrations: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        registrations.sort_by_key(|r| std::cmp::Reverse(r.registered_at));
        Ok(registrations
            .into_iter()
            .map(|r| {
                let event = tables.events.get(&r.event_id).cloned();
                (r, event)
            })
            .collect())
    }

    async fn set_registration_data(
        &self,
        id: Uuid,
        data: &Map<String, Value>,
        modified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(registration) = tables.registrations.get_mut(&id) {
            registration.registration_data = sqlx::types::Json(data.clone());
            registration.last_modified_at = Some(modified_at);
        }
        Ok(())
    }

    async fn mark_checked_in(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.inner.lock().await;
        match tables.registrations.get_mut(&id) {
            Some(registration) if registration.status == RegistrationStatus::Registered => {
                registration.status = RegistrationStatus::CheckedIn;
                registration.checked_in_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory [`AssetStore`] counterpart, also used to observe the two-phase
/// QR upload from tests.
#[derive(Default)]
pub struct MemAssetStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl AssetStore for MemAssetStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://qr-codes/{}", key)
    }
}
