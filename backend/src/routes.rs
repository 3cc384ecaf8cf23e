use actix_files::Files;
use actix_web::{web, HttpResponse};
use actix_multipart::Multipart;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use log::{error, warn};
use serde_json::json;

use shared::ThresholdRequest;

use crate::auth::middleware::{AuthMiddleware, AuthenticatedUser};
use crate::auth::routes as auth_routes;
use crate::db::dynamodb_repository::DynamoDbRepository;
use crate::db::models::DetectionRecord;
use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::session::controller;
use crate::session::registry::SessionRegistry;
use crate::storage::image_store::ImageStore;

pub fn configure_routes(
    cfg: &mut web::ServiceConfig,
    media_dir: String,
    auth_middleware: AuthMiddleware,
) {
    cfg.service(
        web::scope("/api")
            .wrap(auth_middleware)
            .service(web::resource("/auth/register").route(web::post().to(auth_routes::register)))
            .service(web::resource("/auth/login").route(web::post().to(auth_routes::login)))
            .service(
                web::resource("/auth/me")
                    .route(web::get().to(auth_routes::me))
                    .route(web::delete().to(auth_routes::delete_account)),
            )
            .service(web::resource("/detect").route(web::post().to(handle_detect)))
            .service(
                web::resource("/session/threshold").route(web::put().to(handle_threshold_change)),
            )
            .service(web::resource("/session/current").route(web::get().to(handle_current)))
            .service(web::resource("/stream/frame").route(web::post().to(handle_stream_frame)))
            .service(web::resource("/stream/current").route(web::get().to(handle_stream_current)))
            .service(web::resource("/stream/stop").route(web::post().to(handle_stream_stop)))
            .service(web::resource("/history").route(web::get().to(handle_history))),
    )
    .service(Files::new("/media", media_dir));
}

/// Pull the first uploaded file out of a multipart payload.
async fn read_upload(mut payload: Multipart) -> Result<(Vec<u8>, String), ApiError> {
    let mut image_data = Vec::new();
    let mut image_name = String::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        if let Some(content_type) = field.content_type() {
            if ImageStore::extract_file_extension(content_type.essence_str()).is_err() {
                return Err(ApiError::UnsupportedMedia);
            }
        }
        if let Some(name) = field.content_disposition().and_then(|cd| cd.get_filename()) {
            image_name = name.to_string();
        }

        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| ApiError::Payload(e.to_string()))?;
            image_data.extend_from_slice(&data);
        }
        if !image_data.is_empty() {
            break;
        }
    }

    if image_data.is_empty() {
        return Err(ApiError::Payload("no image in upload".to_string()));
    }
    if ImageStore::validate_image_size(&image_data).is_err() {
        return Err(ApiError::FileTooLarge);
    }
    if image_name.is_empty() {
        image_name = "upload.png".to_string();
    }

    Ok((image_data, image_name))
}

/// Upload-mode detection: run the engine, display the result, and auto-save
/// the first result for each new image exactly once. A failed save degrades
/// to a warning; the result is still displayed.
async fn handle_detect(
    user: AuthenticatedUser,
    payload: Multipart,
    engine: web::Data<EngineHandle>,
    registry: web::Data<SessionRegistry>,
    db_repo: web::Data<DynamoDbRepository>,
    image_store: web::Data<ImageStore>,
) -> Result<HttpResponse, ApiError> {
    let (image_data, image_name) = read_upload(payload).await?;

    let username = match db_repo.get_user_by_id(user.0).await {
        Ok(Some(account)) => Some(account.username),
        Ok(None) => None,
        Err(e) => {
            warn!("could not resolve user {} before save: {:?}", user.0, e);
            None
        }
    };

    let session = registry.session(user.0).await;
    let mut session = session.lock().await;

    controller::handle_new_upload(
        &mut session.state,
        engine.detector(),
        &engine.annotator,
        image_data.clone(),
        image_name.clone(),
    )?;

    let mut saved = false;
    let mut warning = None;

    if session.state.take_pending_save() {
        match &username {
            Some(username) => {
                let filename = ImageStore::unique_filename(username, &image_name, Utc::now());
                match image_store.save_image(&filename, &image_data) {
                    Ok(path) => {
                        let Some(diagnosis) = session.state.result() else {
                            return Err(ApiError::Internal);
                        };
                        let record = DetectionRecord::new(
                            user.0,
                            path.to_string_lossy().into_owned(),
                            diagnosis.diseases.clone(),
                            diagnosis.average_confidence,
                            diagnosis.advisory.clone(),
                        );
                        match db_repo.save_detection(&record).await {
                            Ok(()) => saved = true,
                            Err(e) => {
                                error!("failed to save detection to history: {:?}", e);
                                warning =
                                    Some("Failed to save this detection to your history".into());
                            }
                        }
                    }
                    Err(e) => {
                        error!("failed to store upload image: {:?}", e);
                        warning = Some("Failed to store the uploaded image".into());
                    }
                }
            }
            None => {
                // Should not happen post-authentication; signal, don't write.
                warning = Some("Your account could not be resolved; result not saved".into());
            }
        }
    }

    let report = session
        .state
        .result()
        .map(|d| d.to_report(saved, warning))
        .ok_or(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(report))
}

/// Re-score the stored upload image at a new threshold. The engine is
/// re-invoked; nothing is re-saved.
async fn handle_threshold_change(
    user: AuthenticatedUser,
    request: web::Json<ThresholdRequest>,
    engine: web::Data<EngineHandle>,
    registry: web::Data<SessionRegistry>,
) -> Result<HttpResponse, ApiError> {
    let threshold = request.threshold;
    if !(0.0..=1.0).contains(&threshold) || !threshold.is_finite() {
        return Err(ApiError::Payload(format!(
            "threshold {} outside [0, 1]",
            threshold
        )));
    }

    let session = registry.session(user.0).await;
    let mut session = session.lock().await;

    controller::handle_threshold_change(
        &mut session.state,
        engine.detector(),
        &engine.annotator,
        threshold,
    );

    match session.state.result() {
        Some(diagnosis) => Ok(HttpResponse::Ok().json(diagnosis.to_report(false, None))),
        None => Ok(HttpResponse::Ok().json(json!({ "threshold": threshold }))),
    }
}

async fn handle_current(
    user: AuthenticatedUser,
    registry: web::Data<SessionRegistry>,
) -> Result<HttpResponse, ApiError> {
    let session = registry.session(user.0).await;
    let session = session.lock().await;

    session
        .state
        .result()
        .map(|d| HttpResponse::Ok().json(d.to_report(false, None)))
        .ok_or(ApiError::NoCurrentResult)
}

/// One live frame. The result overwrites the session's current one and is
/// published to the live cell; live frames are never persisted.
async fn handle_stream_frame(
    user: AuthenticatedUser,
    frame: web::Bytes,
    engine: web::Data<EngineHandle>,
    registry: web::Data<SessionRegistry>,
) -> Result<HttpResponse, ApiError> {
    if frame.is_empty() {
        return Err(ApiError::Payload("empty frame".to_string()));
    }

    let session = registry.session(user.0).await;
    let mut session = session.lock().await;

    controller::handle_stream_frame(
        &mut session.state,
        engine.detector(),
        &engine.annotator,
        &frame,
    )?;

    let report = session
        .state
        .result()
        .map(|d| d.to_report(false, None))
        .ok_or(ApiError::Internal)?;
    session.publish_live(session.state.result().map(|d| d.to_live_info()));

    Ok(HttpResponse::Ok().json(report))
}

async fn handle_stream_current(
    user: AuthenticatedUser,
    registry: web::Data<SessionRegistry>,
) -> Result<HttpResponse, ApiError> {
    let session = registry.session(user.0).await;
    let session = session.lock().await;

    session
        .latest_live()
        .map(|info| HttpResponse::Ok().json(info))
        .ok_or(ApiError::NoCurrentResult)
}

async fn handle_stream_stop(
    user: AuthenticatedUser,
    registry: web::Data<SessionRegistry>,
) -> Result<HttpResponse, ApiError> {
    let session = registry.session(user.0).await;
    let mut session = session.lock().await;

    controller::handle_stream_stop(&mut session.state);
    session.publish_live(None);

    Ok(HttpResponse::Ok().json(json!({ "message": "live stream stopped" })))
}

async fn handle_history(
    user: AuthenticatedUser,
    db_repo: web::Data<DynamoDbRepository>,
) -> Result<HttpResponse, ApiError> {
    match db_repo.list_detections(user.0).await {
        Ok(records) => {
            let entries: Vec<_> = records.iter().map(|r| r.to_history_entry()).collect();
            Ok(HttpResponse::Ok().json(entries))
        }
        Err(e) => {
            error!("failed to list history for user {}: {:?}", user.0, e);
            Ok(HttpResponse::InternalServerError()
                .json(json!({ "error": "Failed to load detection history" })))
        }
    }
}
