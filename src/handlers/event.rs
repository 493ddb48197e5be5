use actix_web::{delete, get, post, put, web, HttpMessage, HttpRequest, HttpResponse, Responder, ResponseError};
use uuid::Uuid;

use crate::dto::{EventFormDto, EventSearchQuery};
use crate::errors::ApiError;
use crate::service::{self, auth::AuthUser};
use crate::AppState;

#[get("")]
pub async fn list(
   req: HttpRequest,
   query: web::Query<EventSearchQuery>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::event::list(&auth, query.q.as_deref(), state.store.as_ref()).await;
         match res {
            Ok(events) => HttpResponse::Ok().json(events),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[post("")]
pub async fn create(
   req: HttpRequest,
   form: web::Json<EventFormDto>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::event::create(
            &auth,
            form.into_inner(),
            state.store.as_ref(),
            state.assets.as_ref(),
         )
         .await;
         match res {
            Ok(event) => HttpResponse::Created().json(event),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[get("/{id}")]
pub async fn get_by_id(
   req: HttpRequest,
   id: web::Path<Uuid>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::event::get_by_id(&auth, id.into_inner(), state.store.as_ref()).await;
         match res {
            Ok(event) => HttpResponse::Ok().json(event),
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
   form: web::Json<EventFormDto>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::event::update(
            &auth,
            id.into_inner(),
            form.into_inner(),
            state.store.as_ref(),
            state.assets.as_ref(),
         )
         .await;
         match res {
            Ok(event) => HttpResponse::Ok().json(event),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[delete("/{id}")]
pub async fn remove(
   req: HttpRequest,
   id: web::Path<Uuid>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::event::delete(
            &auth,
            id.into_inner(),
            state.store.as_ref(),
            state.assets.as_ref(),
         )
         .await;
         match res {
            Ok(()) => HttpResponse::Ok().json(serde_json::json!({
               "message": "event deleted"
            })),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

#[get("/{id}/registrations")]
pub async fn registrations(
   req: HttpRequest,
   id: web::Path<Uuid>,
   state: web::Data<AppState>,
) -> impl Responder {
   match req.extensions().get::<AuthUser>().cloned() {
      Some(auth) => {
         let res = service::registration::list_for_event(
            &auth,
            id.into_inner(),
            state.store.as_ref(),
         )
         .await;
         match res {
            Ok(items) => HttpResponse::Ok().json(items),
            Err(err) => err.error_response(),
         }
      }
      None => ApiError::Unauthorized.error_response(),
   }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
   cfg.service(list);
   cfg.service(create);
   cfg.service(get_by_id);
   cfg.service(update);
   cfg.service(remove);
   cfg.service(registrations);
}
