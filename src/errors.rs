use actix_web::{error, http::StatusCode, HttpResponse};
use derive_more::{Display, Error};

use crate::db::StoreError;

#[derive(Debug, Clone, Display, Error, serde::Serialize)]
pub enum ApiError {
    #[display(fmt = "field '{}' is invalid: {}", field, message)]
    Validation { field: String, message: String },

    #[display(fmt = "unauthorized")]
    Unauthorized,

    #[display(fmt = "forbidden")]
    Forbidden,

    #[display(fmt = "not found")]
    NotFound,

    #[display(fmt = "event is at full capacity")]
    CapacityExceeded,

    #[display(fmt = "already registered for this event")]
    AlreadyRegistered,

    #[display(fmt = "dependency failure: {}", _0)]
    Dependency(#[error(not(source))] String),
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound => "not_found",
            ApiError::CapacityExceeded => "capacity_exceeded",
            ApiError::AlreadyRegistered => "conflict",
            ApiError::Dependency(_) => "dependency",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::AlreadyRegistered,
            StoreError::Unavailable(msg) => ApiError::Dependency(msg),
        }
    }
}

impl error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "error": self.to_string(),
        });
        if let ApiError::Validation { field, .. } = self {
            body["field"] = serde_json::Value::String(field.clone());
        }
        HttpResponse::build(self.status_code()).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::CapacityExceeded => StatusCode::CONFLICT,
            ApiError::AlreadyRegistered => StatusCode::CONFLICT,
            ApiError::Dependency(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
