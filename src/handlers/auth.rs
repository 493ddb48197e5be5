use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder, ResponseError};
use log::error;

use crate::dto::{LoginDto, SignupDto};
use crate::errors::ApiError;
use crate::service::{self, auth::AuthUser};
use crate::AppState;

pub async fn signup(dto: web::Json<SignupDto>, state: web::Data<AppState>) -> impl Responder {
    let response = service::user::signup(dto.into_inner(), state.store.as_ref()).await;
    match response {
        Ok(auth) => HttpResponse::Created().json(auth),
        Err(err) => {
            error!("signup failed: {}", err);
            err.error_response()
        }
    }
}

pub async fn login(dto: web::Json<LoginDto>, state: web::Data<AppState>) -> impl Responder {
    let response = service::user::login(dto.into_inner(), state.store.as_ref()).await;
    match response {
        Ok(auth) => HttpResponse::Ok().json(auth),
        Err(err) => err.error_response(),
    }
}

pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    match req.extensions().get::<AuthUser>().cloned() {
        Some(auth) => {
            let response = service::user::me(auth.user_id, state.store.as_ref()).await;
            match response {
                Ok(user) => HttpResponse::Ok().json(user),
                Err(err) => err.error_response(),
            }
        }
        None => ApiError::Unauthorized.error_response(),
    }
}
