//! Fixture builders shared by the service test modules.

use chrono::{Duration, NaiveTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::memory::MemStore;
use crate::db::Store;
use crate::models::{Event, FieldSpec, FieldType, Role, User};
use crate::service::auth::AuthUser;

pub fn auth_for(user: &User) -> AuthUser {
    AuthUser {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
    }
}

pub async fn seed_user(store: &MemStore, full_name: &str, role: Role) -> (User, AuthUser) {
    let user = User {
        id: Uuid::new_v4(),
        full_name: full_name.to_string(),
        email: format!("{}@example.com", Uuid::new_v4()),
        pwd_hash: String::new(),
        role,
        created_at: Utc::now(),
    };
    store.insert_user(&user).await.unwrap();
    let auth = auth_for(&user);
    (user, auth)
}

pub fn event_owned_by(owner: Uuid, max_attendees: i32, fields: Vec<FieldSpec>) -> Event {
    Event {
        id: Uuid::new_v4(),
        title: "Rust Meetup".to_string(),
        description: "Monthly meetup".to_string(),
        date: Utc::now().date_naive() + Duration::days(7),
        time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
        location: "Community hall".to_string(),
        max_attendees,
        current_attendees: 0,
        registration_fee: None,
        requires_checkin: true,
        registration_fields: Json(fields),
        bank_details: None,
        created_by: owner,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub async fn seed_event(store: &MemStore, event: &Event) {
    store.insert_event(event).await.unwrap();
}

pub fn text_field(key: &str, required: bool) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: key.to_string(),
        field_type: FieldType::Text,
        required,
        options: None,
    }
}

pub fn select_field(key: &str, options: &[&str]) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: key.to_string(),
        field_type: FieldType::Select,
        required: true,
        options: Some(options.iter().map(|o| o.to_string()).collect()),
    }
}
