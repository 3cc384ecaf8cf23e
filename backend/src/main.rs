mod auth;
mod db;
mod diagnosis;
mod engine;
mod error;
mod routes;
mod session;
mod storage;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use auth::jwt::JwtService;
use auth::middleware::AuthMiddleware;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use db::dynamodb_repository::DynamoDbRepository;
use diagnosis::annotate::Annotator;
use engine::config::DetectorConfig;
use engine::model::YoloEngine;
use engine::EngineHandle;
use routes::configure_routes;
use session::registry::SessionRegistry;
use std::env;
use storage::image_store::ImageStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    dotenv::dotenv().ok();

    // Model load failure is a lost capability, not a fatal error: the service
    // keeps running and detection requests get an error-shaped result.
    let config_path =
        env::var("DETECTOR_CONFIG").unwrap_or_else(|_| "config/detector.yaml".to_string());
    let (detector, annotator) = match DetectorConfig::load(&config_path) {
        Ok(config) => {
            let annotator = Annotator::new(config.label_font.as_deref());
            match YoloEngine::load(config) {
                Ok(engine) => (Some(engine), annotator),
                Err(e) => {
                    log::error!("Failed to load detector model at startup: {:?}", e);
                    (None, annotator)
                }
            }
        }
        Err(e) => {
            log::error!("Failed to load detector config '{}': {:?}", config_path, e);
            (None, Annotator::new(None))
        }
    };
    let engine_handle = EngineHandle::new(detector, annotator);

    // Initialize AWS configuration
    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = DynamoDbClient::new(&aws_config);

    let users_table =
        env::var("DYNAMODB_USERS_TABLE").unwrap_or_else(|_| "melon_users".to_string());
    let detections_table =
        env::var("DYNAMODB_DETECTIONS_TABLE").unwrap_or_else(|_| "melon_detections".to_string());
    let db_repo = DynamoDbRepository::new(dynamodb_client, users_table, detections_table);

    let media_dir = env::var("MEDIA_DIR").unwrap_or_else(|_| "media".to_string());
    let image_store = ImageStore::new(&media_dir).map_err(|e| {
        std::io::Error::other(format!("failed to prepare media directory: {:?}", e))
    })?;

    let jwt_secret = env::var("JWT_SECRET").unwrap().to_string();
    let jwt_service = JwtService::new(&jwt_secret);
    let auth_middleware = AuthMiddleware::new(jwt_service.clone());

    let registry = SessionRegistry::new();

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(engine_handle.clone()))
            .app_data(web::Data::new(db_repo.clone()))
            .app_data(web::Data::new(image_store.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(registry.clone()))
            .configure(|cfg| configure_routes(cfg, media_dir.clone(), auth_middleware.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
