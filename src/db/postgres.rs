use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::models::{BankDetails, Event, Registration, User};
use crate::PGPool;

const EVENT_COLUMNS: &str = "id, title, description, date, time, location, max_attendees, \
     current_attendees, registration_fee, requires_checkin, registration_fields, bank_details, \
     created_by, created_at, updated_at";

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, registration_data, full_name, email, \
     status, registered_at, last_modified_at, checked_in_at";

/// Postgres-backed [`Store`]. All counter and status mutations are single
/// conditional UPDATEs so concurrent requests serialize on the row, not in
/// application code.
pub struct PgStore {
    pool: PGPool,
}

impl PgStore {
    pub fn new(pool: PGPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, full_name, email, pwd_hash, role, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.pwd_hash)
        .bind(user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (id, title, description, date, time, location, max_attendees, \
             current_attendees, registration_fee, requires_checkin, registration_fields, \
             bank_details, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.location)
        .bind(event.max_attendees)
        .bind(event.current_attendees)
        .bind(event.registration_fee)
        .bind(event.requires_checkin)
        .bind(&event.registration_fields)
        .bind(&event.bank_details)
        .bind(event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn events_created_by(
        &self,
        organizer: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<Event>, StoreError> {
        let events = match search {
            Some(q) => {
                sqlx::query_as::<_, Event>(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE created_by = $1 AND (title ILIKE $2 OR description ILIKE $2)
                     ORDER BY date ASC"
                ))
                .bind(organizer)
                .bind(format!("%{}%", q))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Event>(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE created_by = $1 ORDER BY date ASC"
                ))
                .bind(organizer)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    async fn events_upcoming(
        &self,
        on_or_after: NaiveDate,
        search: Option<&str>,
    ) -> Result<Vec<Event>, StoreError> {
        let events = match search {
            Some(q) => {
                sqlx::query_as::<_, Event>(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE date >= $1 AND (title ILIKE $2 OR description ILIKE $2)
                     ORDER BY date ASC"
                ))
                .bind(on_or_after)
                .bind(format!("%{}%", q))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Event>(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE date >= $1 ORDER BY date ASC"
                ))
                .bind(on_or_after)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE events SET title = $2, description = $3, date = $4, time = $5, \
             location = $6, max_attendees = $7, registration_fee = $8, requires_checkin = $9, \
             registration_fields = $10, bank_details = $11, updated_at = $12
             WHERE id = $1",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.location)
        .bind(event.max_attendees)
        .bind(event.registration_fee)
        .bind(event.requires_checkin)
        .bind(&event.registration_fields)
        .bind(&event.bank_details)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_event_bank_details(
        &self,
        event_id: Uuid,
        bank_details: &BankDetails,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE events SET bank_details = $2 WHERE id = $1")
            .bind(event_id)
            .bind(Json(bank_details))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_admit(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE events SET current_attendees = current_attendees + 1
             WHERE id = $1 AND current_attendees < max_attendees",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, event_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE events SET current_attendees = current_attendees - 1
             WHERE id = $1 AND current_attendees > 0",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_registration(&self, registration: &Registration) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO registrations (id, event_id, user_id, registration_data, full_name, \
             email, status, registered_at, last_modified_at, checked_in_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(registration.id)
        .bind(registration.event_id)
        .bind(registration.user_id)
        .bind(&registration.registration_data)
        .bind(&registration.full_name)
        .bind(&registration.email)
        .bind(registration.status)
        .bind(registration.registered_at)
        .bind(registration.last_modified_at)
        .bind(registration.checked_in_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn registration_by_id(&self, id: Uuid) -> Result<Option<Registration>, StoreError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn registration_for(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, StoreError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations
             WHERE event_id = $1 AND user_id = $2"
        ))
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn registrations_by_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<Registration>, StoreError> {
        let registrations = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations
             WHERE event_id = $1 ORDER BY registered_at ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(registrations)
    }

    async fn registrations_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Registration, Option<Event>)>, StoreError> {
        let registrations = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations
             WHERE user_id = $1 ORDER BY registered_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let event_ids: Vec<Uuid> = registrations.iter().map(|r| r.event_id).collect();
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ANY($1)"
        ))
        .bind(&event_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations
            .into_iter()
            .map(|registration| {
                let event = events.iter().find(|e| e.id == registration.event_id).cloned();
                (registration, event)
            })
            .collect())
    }

    async fn set_registration_data(
        &self,
        id: Uuid,
        data: &Map<String, Value>,
        modified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE registrations SET registration_data = $2, last_modified_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(Json(data))
        .bind(modified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_checked_in(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE registrations SET status = 'checked_in', checked_in_at = $2
             WHERE id = $1 AND status = 'registered'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
