pub mod db;
pub mod handlers;
pub mod service;
pub mod models;
pub mod dto;
pub mod errors;

use std::env;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use db::assets::FsAssetStore;
use db::postgres::PgStore;
use db::{init_db_pool, AssetStore, Store};
use dotenv::dotenv;
use service::auth::AuthMiddleware;
use service::log::LoggerMiddleware;
use sqlx::{postgres::Postgres, Pool};

pub type PGPool = Pool<Postgres>;

pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Store handles injected into every handler; tests substitute the
/// in-memory backends for these.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub assets: Arc<dyn AssetStore>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    service::log::init_logger();

    let db_url = env::var("DATABASE_URL")
    .unwrap_or_else(|e| {
        panic!("Failed to get env with name 'DATABASE_URL': {:?}", e);
    });
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let asset_dir = env::var("ASSET_DIR").unwrap_or_else(|_| "qr-codes".to_string());
    let asset_base_url = env::var("ASSET_PUBLIC_URL")
        .unwrap_or_else(|_| format!("http://{}/qr-codes", bind_addr));

    let pool: PGPool = init_db_pool(&db_url)
        .await
        .expect("failed to connect to postgres");
    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        assets: Arc::new(FsAssetStore::new(asset_dir, asset_base_url)),
    };

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(LoggerMiddleware)
            .service(
                web::scope("/api/auth")
                    .route("/signup", web::post().to(handlers::auth::signup))
                    .route("/login", web::post().to(handlers::auth::login))
                    .service(
                        web::resource("/me")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(handlers::auth::me)),
                    ),
            )
            .service(
                web::scope("/api/events")
                    .wrap(AuthMiddleware)
                    .configure(handlers::event::init_routes),
            )
            .service(
                web::scope("/api/registrations")
                    .wrap(AuthMiddleware)
                    .configure(handlers::registration::init_routes),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
