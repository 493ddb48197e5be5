use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{BankDetails, Event, FieldSpec, Registration, Role, User};

#[derive(Debug, Deserialize, Clone)]
pub struct SignupDto {
    pub full_name: String,
    pub email: String,
    pub pwd: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoginDto {
    pub email: String,
    pub pwd: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn new(user_id: &Uuid, email: &str, role: Role, exp: usize) -> Self {
        Self {
            user_id: *user_id,
            email: email.to_string(),
            role,
            exp,
        }
    }
}

/// Base64-encoded image payload attached to an event form.
#[derive(Debug, Deserialize, Clone)]
pub struct ImageUploadDto {
    pub file_name: String,
    pub content_type: String,
    pub data: String,
}

/// Full event payload; `PUT` replaces the record, so create and update share it.
#[derive(Debug, Deserialize, Clone)]
pub struct EventFormDto {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub max_attendees: i32,
    pub registration_fee: Option<Decimal>,
    #[serde(default)]
    pub requires_checkin: bool,
    #[serde(default)]
    pub registration_fields: Vec<FieldSpec>,
    pub bank_details: Option<BankDetails>,
    pub qr_code: Option<ImageUploadDto>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewRegistrationDto {
    pub event_id: Uuid,
    #[serde(default)]
    pub registration_data: Map<String, Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateRegistrationDto {
    pub registration_data: Map<String, Value>,
}

/// A user's own registration joined with its event; the event is gone if the
/// organizer deleted it after the registration was made.
#[derive(Debug, Serialize)]
pub struct OwnRegistrationDto {
    #[serde(flatten)]
    pub registration: Registration,
    pub event: Option<Event>,
}

#[derive(Debug, Deserialize)]
pub struct EventSearchQuery {
    pub q: Option<String>,
}
