pub mod auth;
pub mod event;
pub mod registration;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::dev::Service;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::{json, Value};

    use crate::db::memory::{MemAssetStore, MemStore};
    use crate::service::auth::AuthMiddleware;
    use crate::AppState;

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemStore::new()),
            assets: Arc::new(MemAssetStore::new()),
        }
    }

    macro_rules! spawn_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .service(
                        web::scope("/api/auth")
                            .route("/signup", web::post().to(super::auth::signup))
                            .route("/login", web::post().to(super::auth::login))
                            .service(
                                web::resource("/me")
                                    .wrap(AuthMiddleware)
                                    .route(web::get().to(super::auth::me)),
                            ),
                    )
                    .service(
                        web::scope("/api/events")
                            .wrap(AuthMiddleware)
                            .configure(super::event::init_routes),
                    )
                    .service(
                        web::scope("/api/registrations")
                            .wrap(AuthMiddleware)
                            .configure(super::registration::init_routes),
                    ),
            )
            .await
        };
    }

    macro_rules! signup {
        ($app:expr, $name:expr, $role:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/auth/signup")
                .set_json(json!({
                    "full_name": $name,
                    "email": format!("{}@example.com", $name.to_lowercase()),
                    "pwd": "hunter2",
                    "role": $role,
                }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&$app, req).await;
            body["token"].as_str().unwrap().to_string()
        }};
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn protected_scope_rejects_missing_and_bad_tokens() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let app = spawn_app!(state());

        let req = test::TestRequest::get().uri("/api/events").to_request();
        match app.call(req).await {
            Ok(_) => panic!("request without a token must not pass"),
            Err(err) => assert_eq!(
                err.as_response_error().status_code(),
                StatusCode::UNAUTHORIZED
            ),
        }

        let req = test::TestRequest::get()
            .uri("/api/events")
            .insert_header(bearer("garbage"))
            .to_request();
        match app.call(req).await {
            Ok(_) => panic!("request with a bad token must not pass"),
            Err(err) => assert_eq!(
                err.as_response_error().status_code(),
                StatusCode::UNAUTHORIZED
            ),
        }
    }

    #[actix_web::test]
    async fn full_registration_flow_over_http() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let app = spawn_app!(state());

        let organizer_token = signup!(app, "Olive", "organizer");
        let attendee_token = signup!(app, "Ada", "attendee");

        // organizer publishes a two-seat event with one select field
        let req = test::TestRequest::post()
            .uri("/api/events")
            .insert_header(bearer(&organizer_token))
            .set_json(json!({
                "title": "Rust Workshop",
                "description": "Intro to ownership",
                "date": "2030-05-01",
                "time": "10:00:00",
                "location": "Lab 2",
                "max_attendees": 2,
                "registration_fields": [
                    {"key": "diet", "label": "Diet", "type": "select",
                     "required": true, "options": ["veg", "nonveg"]}
                ]
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let event: Value = test::read_body_json(res).await;
        let event_id = event["id"].as_str().unwrap().to_string();

        // a bad option is refused, naming the field
        let req = test::TestRequest::post()
            .uri("/api/registrations")
            .insert_header(bearer(&attendee_token))
            .set_json(json!({
                "event_id": event_id,
                "registration_data": {"diet": "vegan"}
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["field"], json!("diet"));

        let req = test::TestRequest::post()
            .uri("/api/registrations")
            .insert_header(bearer(&attendee_token))
            .set_json(json!({
                "event_id": event_id,
                "registration_data": {"diet": "veg"}
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let registration: Value = test::read_body_json(res).await;
        assert_eq!(registration["status"], json!("registered"));
        let registration_id = registration["id"].as_str().unwrap().to_string();

        // the same attendee cannot register twice
        let req = test::TestRequest::post()
            .uri("/api/registrations")
            .insert_header(bearer(&attendee_token))
            .set_json(json!({
                "event_id": event_id,
                "registration_data": {"diet": "veg"}
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        // the owning organizer checks the attendee in
        let req = test::TestRequest::put()
            .uri(&format!("/api/registrations/{}/checkin", registration_id))
            .insert_header(bearer(&organizer_token))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let checked_in: Value = test::read_body_json(res).await;
        assert_eq!(checked_in["status"], json!("checked_in"));

        // and sees the registration in the event listing
        let req = test::TestRequest::get()
            .uri(&format!("/api/events/{}/registrations", event_id))
            .insert_header(bearer(&organizer_token))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let listed: Value = test::read_body_json(res).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
