use actix_web::{get, post, put, web, HttpMessage, HttpRequest, HttpResponse, Responder, ResponseError};
use uuid::Uuid;

use crate::dto::{NewRegistrationDto, UpdateRegistrationDto};
use crate::errors::ApiError;
use crate::service::{self, auth::AuthUser};
use crate::AppState;

#[post("")]
pub async fn create(
   req: HttpRequest,
   dto: web::Json<NewRegistrationDto>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res =
            service::registration::register(&auth, dto.into_inner(), state.store.as_ref()).await;
         match res {
            Ok(registration) => HttpResponse::Created().json(registration),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[get("")]
pub async fn list_own(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::registration::list_own(&auth, state.store.as_ref()).await;
         match res {
            Ok(list) => HttpResponse::Ok().json(list),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[put("/{id}")]
pub async fn update(
   req: HttpRequest,
   id: web::Path<Uuid>,
   dto: web::Json<UpdateRegistrationDto>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::registration::edit_data(
            &auth,
            id.into_inner(),
            dto.into_inner(),
            state.store.as_ref(),
         )
         .await;
         match res {
            Ok(registration) => HttpResponse::Ok().json(registration),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[put("/{id}/checkin")]
pub async fn check_in(
   req: HttpRequest,
   id: web::Path<Uuid>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res =
            service::registration::check_in(&auth, id.into_inner(), state.store.as_ref()).await;
         match res {
            Ok(registration) => HttpResponse::Ok().json(registration),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
   cfg.service(create);
   cfg.service(list_own);
   cfg.service(update);
   cfg.service(check_in);
}
