use chrono::Utc;
use log::error;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::dto::{NewRegistrationDto, OwnRegistrationDto, UpdateRegistrationDto};
use crate::errors::ApiError;
use crate::models::{Registration, RegistrationStatus};
use crate::service::{auth::AuthUser, validation};

/// Registers the caller for an event. Admission order: visibility, duplicate
/// fast path, schema validation, then the atomic capacity admit, then the
/// insert. A failed insert after a successful admit releases the slot again
/// so the counter cannot leak.
pub async fn register(
    auth: &AuthUser,
    dto: NewRegistrationDto,
    store: &dyn Store,
) -> Result<Registration, ApiError> {
    let event = store.event_by_id(dto.event_id).await?.ok_or(ApiError::NotFound)?;
    if event.created_by != auth.user_id && !event.is_upcoming(Utc::now().date_naive()) {
        return Err(ApiError::NotFound);
    }

    // Fast path only; the store's uniqueness constraint is the real guard.
    if store.registration_for(event.id, auth.user_id).await?.is_some() {
        return Err(ApiError::AlreadyRegistered);
    }

    let normalized =
        validation::validate_registration_data(&event.registration_fields, &dto.registration_data)?;

    let user = store.user_by_id(auth.user_id).await?.ok_or(ApiError::NotFound)?;

    if !store.try_admit(event.id).await? {
        return Err(ApiError::CapacityExceeded);
    }

    let registration = Registration {
        id: Uuid::new_v4(),
        event_id: event.id,
        user_id: user.id,
        registration_data: Json(normalized),
        full_name: user.full_name,
        email: user.email,
        status: RegistrationStatus::Registered,
        registered_at: Utc::now(),
        last_modified_at: None,
        checked_in_at: None,
    };

    match store.insert_registration(&registration).await {
        Ok(()) => Ok(registration),
        Err(err) => {
            // Compensate the admitted slot before surfacing the failure.
            if let Err(release_err) = store.release(event.id).await {
                error!(
                    "failed to release admitted slot for event {}: {}",
                    event.id, release_err
                );
            }
            match err {
                StoreError::Duplicate => Err(ApiError::AlreadyRegistered),
                other => Err(ApiError::from(other)),
            }
        }
    }
}

pub async fn list_own(
    auth: &AuthUser,
    store: &dyn Store,
) -> Result<Vec<OwnRegistrationDto>, ApiError> {
    let rows = store.registrations_by_user(auth.user_id).await?;
    Ok(rows
        .into_iter()
        .map(|(registration, event)| OwnRegistrationDto { registration, event })
        .collect())
}

/// Attendee lists for an event are visible to the owning organizer only.
pub async fn list_for_event(
    auth: &AuthUser,
    event_id: Uuid,
    store: &dyn Store,
) -> Result<Vec<Registration>, ApiError> {
    let event = store.event_by_id(event_id).await?.ok_or(ApiError::NotFound)?;
    if !auth.is_organizer() || event.created_by != auth.user_id {
        return Err(ApiError::Forbidden);
    }
    let registrations = store.registrations_by_event(event_id).await?;
    Ok(registrations)
}

/// Owner-only data edit, re-validated against the event's current schema.
/// A registration whose event is gone can no longer be validated, so the
/// edit is refused.
pub async fn edit_data(
    auth: &AuthUser,
    registration_id: Uuid,
    dto: UpdateRegistrationDto,
    store: &dyn Store,
) -> Result<Registration, ApiError> {
    let mut registration = store
        .registration_by_id(registration_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if registration.user_id != auth.user_id {
        return Err(ApiError::NotFound);
    }
    let event = store
        .event_by_id(registration.event_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let normalized =
        validation::validate_registration_data(&event.registration_fields, &dto.registration_data)?;

    let modified_at = Utc::now();
    store
        .set_registration_data(registration.id, &normalized, modified_at)
        .await?;
    registration.registration_data = Json(normalized);
    registration.last_modified_at = Some(modified_at);
    Ok(registration)
}

/// `registered -> checked_in`, restricted to the organizer who owns the
/// event. Checking in twice is an idempotent success so duplicate scans at
/// the door don't error.
pub async fn check_in(
    auth: &AuthUser,
    registration_id: Uuid,
    store: &dyn Store,
) -> Result<Registration, ApiError> {
    if !auth.is_organizer() {
        return Err(ApiError::Forbidden);
    }
    let registration = store
        .registration_by_id(registration_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let event = store
        .event_by_id(registration.event_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if event.created_by != auth.user_id {
        return Err(ApiError::Forbidden);
    }

    if registration.status == RegistrationStatus::CheckedIn {
        return Ok(registration);
    }

    store.mark_checked_in(registration.id, Utc::now()).await?;
    store
        .registration_by_id(registration.id)
        .await?
        .ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    use super::*;
    use crate::db::memory::MemStore;
    use crate::db::{Store, StoreError};
    use crate::models::{BankDetails, Event, Registration, Role, User};
    use crate::service::test_support::{
        event_owned_by, seed_event, seed_user, select_field, text_field,
    };

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn dto(event_id: Uuid, value: Value) -> NewRegistrationDto {
        NewRegistrationDto {
            event_id,
            registration_data: data(value),
        }
    }

    #[tokio::test]
    async fn register_creates_record_and_takes_a_slot() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (user, auth) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(
            organizer.id,
            2,
            vec![select_field("diet", &["veg", "nonveg"])],
        );
        seed_event(&store, &event).await;

        let registration = register(&auth, dto(event.id, json!({"diet": "veg"})), &store)
            .await
            .unwrap();

        assert_eq!(registration.status, RegistrationStatus::Registered);
        assert_eq!(registration.full_name, user.full_name);
        assert_eq!(registration.email, user.email);
        assert_eq!(registration.registration_data["diet"], json!("veg"));

        let stored = store.event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attendees, 1);
    }

    #[tokio::test]
    async fn second_registration_for_same_pair_conflicts() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, auth) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 5, vec![]);
        seed_event(&store, &event).await;

        register(&auth, dto(event.id, json!({})), &store).await.unwrap();
        let err = register(&auth, dto(event.id, json!({})), &store).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyRegistered));

        let stored = store.event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attendees, 1);
    }

    #[tokio::test]
    async fn invalid_submission_fails_before_taking_a_slot() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, auth) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(
            organizer.id,
            5,
            vec![select_field("diet", &["veg", "nonveg"])],
        );
        seed_event(&store, &event).await;

        let err = register(&auth, dto(event.id, json!({"diet": "vegan"})), &store)
            .await
            .unwrap_err();
        match err {
            ApiError::Validation { field, .. } => assert_eq!(field, "diet"),
            other => panic!("unexpected error: {:?}", other),
        }

        let stored = store.event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attendees, 0);
    }

    #[tokio::test]
    async fn last_slot_goes_to_exactly_one_of_two_users() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, first) = seed_user(&store, "Ada", Role::Attendee).await;
        let (_, second) = seed_user(&store, "Ben", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 1, vec![]);
        seed_event(&store, &event).await;

        register(&first, dto(event.id, json!({})), &store).await.unwrap();
        let err = register(&second, dto(event.id, json!({})), &store).await.unwrap_err();
        assert!(matches!(err, ApiError::CapacityExceeded));

        let stored = store.event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attendees, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_registrations_fill_capacity_exactly() {
        let store = Arc::new(MemStore::new());
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let event = event_owned_by(organizer.id, 3, vec![]);
        seed_event(&store, &event).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let (_, auth) = seed_user(&store, &format!("User {}", i), Role::Attendee).await;
            let store = Arc::clone(&store);
            let event_id = event.id;
            handles.push(tokio::spawn(async move {
                register(&auth, dto(event_id, json!({})), &*store).await
            }));
        }

        let mut admitted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(ApiError::CapacityExceeded) => refused += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(refused, 5);

        let stored = store.event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attendees, stored.max_attendees);
    }

    /// Store decorator that refuses registration inserts, to drive the
    /// compensation path after a successful admit.
    struct FlakyInsertStore {
        inner: MemStore,
        fail_inserts: AtomicBool,
    }

    #[async_trait]
    impl Store for FlakyInsertStore {
        async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
            self.inner.insert_user(user).await
        }
        async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.inner.user_by_id(id).await
        }
        async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.user_by_email(email).await
        }
        async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
            self.inner.insert_event(event).await
        }
        async fn event_by_id(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
            self.inner.event_by_id(id).await
        }
        async fn events_created_by(
            &self,
            organizer: Uuid,
            search: Option<&str>,
        ) -> Result<Vec<Event>, StoreError> {
            self.inner.events_created_by(organizer, search).await
        }
        async fn events_upcoming(
            &self,
            on_or_after: NaiveDate,
            search: Option<&str>,
        ) -> Result<Vec<Event>, StoreError> {
            self.inner.events_upcoming(on_or_after, search).await
        }
        async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
            self.inner.update_event(event).await
        }
        async fn set_event_bank_details(
            &self,
            event_id: Uuid,
            bank_details: &BankDetails,
        ) -> Result<(), StoreError> {
            self.inner.set_event_bank_details(event_id, bank_details).await
        }
        async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
            self.inner.delete_event(id).await
        }
        async fn try_admit(&self, event_id: Uuid) -> Result<bool, StoreError> {
            self.inner.try_admit(event_id).await
        }
        async fn release(&self, event_id: Uuid) -> Result<(), StoreError> {
            self.inner.release(event_id).await
        }
        async fn insert_registration(
            &self,
            registration: &Registration,
        ) -> Result<(), StoreError> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("insert refused".to_string()));
            }
            self.inner.insert_registration(registration).await
        }
        async fn registration_by_id(
            &self,
            id: Uuid,
        ) -> Result<Option<Registration>, StoreError> {
            self.inner.registration_by_id(id).await
        }
        async fn registration_for(
            &self,
            event_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<Registration>, StoreError> {
            self.inner.registration_for(event_id, user_id).await
        }
        async fn registrations_by_event(
            &self,
            event_id: Uuid,
        ) -> Result<Vec<Registration>, StoreError> {
            self.inner.registrations_by_event(event_id).await
        }
        async fn registrations_by_user(
            &self,
            user_id: Uuid,
        ) -> Result<Vec<(Registration, Option<Event>)>, StoreError> {
            self.inner.registrations_by_user(user_id).await
        }
        async fn set_registration_data(
            &self,
            id: Uuid,
            data: &Map<String, Value>,
            modified_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.set_registration_data(id, data, modified_at).await
        }
        async fn mark_checked_in(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
            self.inner.mark_checked_in(id, at).await
        }
    }

    #[tokio::test]
    async fn failed_insert_releases_the_admitted_slot() {
        let store = FlakyInsertStore {
            inner: MemStore::new(),
            fail_inserts: AtomicBool::new(false),
        };
        let (organizer, _) = seed_user(&store.inner, "Org", Role::Organizer).await;
        let (_, auth) = seed_user(&store.inner, "Ada", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 1, vec![]);
        seed_event(&store.inner, &event).await;

        store.fail_inserts.store(true, Ordering::SeqCst);
        let err = register(&auth, dto(event.id, json!({})), &store).await.unwrap_err();
        assert!(matches!(err, ApiError::Dependency(_)));

        // the slot must be free again, so a healthy retry succeeds
        store.fail_inserts.store(false, Ordering::SeqCst);
        let stored = store.inner.event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.current_attendees, 0);
        register(&auth, dto(event.id, json!({})), &store).await.unwrap();
    }

    #[tokio::test]
    async fn edit_data_revalidates_and_stamps_modification() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, auth) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(
            organizer.id,
            5,
            vec![select_field("diet", &["veg", "nonveg"]), text_field("notes", false)],
        );
        seed_event(&store, &event).await;
        let registration = register(&auth, dto(event.id, json!({"diet": "veg"})), &store)
            .await
            .unwrap();

        let updated = edit_data(
            &auth,
            registration.id,
            UpdateRegistrationDto {
                registration_data: data(json!({"diet": "nonveg", "notes": "window seat"})),
            },
            &store,
        )
        .await
        .unwrap();
        assert_eq!(updated.registration_data["diet"], json!("nonveg"));
        assert!(updated.last_modified_at.is_some());

        let err = edit_data(
            &auth,
            registration.id,
            UpdateRegistrationDto {
                registration_data: data(json!({"diet": "fruitarian"})),
            },
            &store,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[tokio::test]
    async fn edit_by_non_owner_reads_as_missing() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, owner) = seed_user(&store, "Ada", Role::Attendee).await;
        let (_, intruder) = seed_user(&store, "Mallory", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 5, vec![]);
        seed_event(&store, &event).await;
        let registration = register(&owner, dto(event.id, json!({})), &store).await.unwrap();

        let err = edit_data(
            &intruder,
            registration.id,
            UpdateRegistrationDto { registration_data: Map::new() },
            &store,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn check_in_is_owner_scoped_and_idempotent() {
        let store = MemStore::new();
        let (organizer, owner_auth) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, other_org) = seed_user(&store, "Other", Role::Organizer).await;
        let (_, attendee) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 5, vec![]);
        seed_event(&store, &event).await;
        let registration = register(&attendee, dto(event.id, json!({})), &store).await.unwrap();

        let err = check_in(&attendee, registration.id, &store).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
        let err = check_in(&other_org, registration.id, &store).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let first = check_in(&owner_auth, registration.id, &store).await.unwrap();
        assert_eq!(first.status, RegistrationStatus::CheckedIn);
        assert!(first.checked_in_at.is_some());

        let second = check_in(&owner_auth, registration.id, &store).await.unwrap();
        assert_eq!(second.status, RegistrationStatus::CheckedIn);
        assert_eq!(second.checked_in_at, first.checked_in_at);
    }

    #[tokio::test]
    async fn own_registrations_keep_orphans_after_event_deletion() {
        let store = MemStore::new();
        let (organizer, _) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, auth) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 5, vec![]);
        seed_event(&store, &event).await;
        register(&auth, dto(event.id, json!({})), &store).await.unwrap();

        let listed = list_own(&auth, &store).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].event.is_some());

        store.delete_event(event.id).await.unwrap();
        let listed = list_own(&auth, &store).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].event.is_none());
    }

    #[tokio::test]
    async fn event_attendee_list_is_owner_only() {
        let store = MemStore::new();
        let (organizer, owner_auth) = seed_user(&store, "Org", Role::Organizer).await;
        let (_, other_org) = seed_user(&store, "Other", Role::Organizer).await;
        let (_, attendee) = seed_user(&store, "Ada", Role::Attendee).await;
        let event = event_owned_by(organizer.id, 5, vec![]);
        seed_event(&store, &event).await;
        register(&attendee, dto(event.id, json!({})), &store).await.unwrap();

        let listed = list_for_event(&owner_auth, event.id, &store).await.unwrap();
        assert_eq!(listed.len(), 1);

        assert!(matches!(
            list_for_event(&other_org, event.id, &store).await.unwrap_err(),
            ApiError::Forbidden
        ));
        assert!(matches!(
            list_for_event(&attendee, event.id, &store).await.unwrap_err(),
            ApiError::Forbidden
        ));
    }
}
