use std::future::{ready, Ready};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::HttpMessage;
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::models::Role;

/// Verified caller identity, inserted into request extensions by
/// [`AuthMiddleware`] and read back by the handlers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_organizer(&self) -> bool {
        self.role == Role::Organizer
    }
}

/// Bearer-token gate for the protected scopes. The token is the opaque
/// credential issued at login; everything behind this middleware can assume
/// a verified (user, role) pair.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
    where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
    where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match jwt::parse_request(&req).and_then(|token| jwt::decode_claims(&token)) {
            Ok(claims) => {
                let auth_user = AuthUser {
                    user_id: claims.user_id,
                    email: claims.email,
                    role: claims.role,
                };
                req.extensions_mut().insert(auth_user);
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res)
                })
            }
            Err(err) => Box::pin(async move { Err(err.into()) }),
        }
    }
}

pub mod jwt {
    use std::env::{self, VarError};

    use actix_web::dev::ServiceRequest;
    use chrono::Utc;
    use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

    use crate::dto::Claims;
    use crate::errors::ApiError;
    use crate::models::User;
    use crate::TOKEN_TTL_SECS;

    pub fn get_secret() -> Result<String, VarError> {
        env::var("JWT_SECRET")
    }

    /// Issues the opaque credential for a freshly authenticated user.
    pub fn create(user: &User) -> Result<String, ApiError> {
        let exp = (Utc::now().timestamp() + TOKEN_TTL_SECS) as usize;
        let secret = get_secret().map_err(|_| {
            ApiError::Dependency("JWT_SECRET is not configured".to_string())
        })?;
        let claims = Claims::new(&user.id, &user.email, user.role, exp);
        let key = EncodingKey::from_secret(secret.as_ref());
        encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|err| ApiError::Dependency(err.to_string()))
    }

    /// Verifies signature and expiry, yielding the embedded identity.
    pub fn decode_claims(token: &str) -> Result<Claims, ApiError> {
        let secret = get_secret().map_err(|_| {
            ApiError::Dependency("JWT_SECRET is not configured".to_string())
        })?;
        let decoding_key = DecodingKey::from_secret(secret.as_ref());
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized)
    }

    pub fn parse_request(req: &ServiceRequest) -> Result<String, ApiError> {
        if let Some(auth_header) = req.headers().get("Authorization") {
            if let Ok(auth_value) = auth_header.to_str() {
                if let Some(token) = auth_value.strip_prefix("Bearer ") {
                    return Ok(token.to_string());
                }
            }
        }
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::jwt;
    use crate::models::{Role, User};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            full_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            pwd_hash: String::new(),
            role: Role::Organizer,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trip_preserves_identity() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let user = sample_user();
        let token = jwt::create(&user).unwrap();
        let claims = jwt::decode_claims(&token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, Role::Organizer);
    }

    #[test]
    fn garbage_token_is_unauthorized() {
        std::env::set_var("JWT_SECRET", "test-secret");
        assert!(jwt::decode_claims("not-a-token").is_err());
    }
}
