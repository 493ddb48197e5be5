use chrono::Utc;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::dto::{AuthResponse, LoginDto, SignupDto};
use crate::errors::ApiError;
use crate::models::{Role, User};
use crate::service::{auth, crypto};

pub async fn signup(dto: SignupDto, store: &dyn Store) -> Result<AuthResponse, ApiError> {
    let SignupDto { full_name, email, pwd, role } = dto;
    if full_name.trim().is_empty() {
        return Err(ApiError::validation("full_name", "is required"));
    }
    if email.trim().is_empty() || !email.contains('@') {
        return Err(ApiError::validation("email", "is not a valid address"));
    }
    if pwd.is_empty() {
        return Err(ApiError::validation("pwd", "is required"));
    }
    if store.user_by_email(&email).await?.is_some() {
        return Err(ApiError::validation("email", "is already registered"));
    }

    let user = User {
        id: Uuid::new_v4(),
        full_name,
        email,
        pwd_hash: crypto::get_sha3_256_hash(&pwd),
        role: role.unwrap_or(Role::Attendee),
        created_at: Utc::now(),
    };
    match store.insert_user(&user).await {
        Ok(()) => {}
        Err(StoreError::Duplicate) => {
            return Err(ApiError::validation("email", "is already registered"));
        }
        Err(err) => return Err(ApiError::from(err)),
    }

    let token = auth::jwt::create(&user)?;
    Ok(AuthResponse { token, user })
}

pub async fn login(dto: LoginDto, store: &dyn Store) -> Result<AuthResponse, ApiError> {
    let user = store
        .user_by_email(&dto.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if crypto::get_sha3_256_hash(&dto.pwd) != user.pwd_hash {
        return Err(ApiError::Unauthorized);
    }
    let token = auth::jwt::create(&user)?;
    Ok(AuthResponse { token, user })
}

pub async fn me(user_id: Uuid, store: &dyn Store) -> Result<User, ApiError> {
    store.user_by_id(user_id).await?.ok_or(ApiError::NotFound)
}
