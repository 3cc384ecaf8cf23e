use actix_web::{web, HttpResponse, Result};
use log::error;

use crate::db::dynamodb_repository::DynamoDbRepository;
use crate::db::models::User;

use super::jwt::JwtService;
use super::middleware::AuthenticatedUser;
use super::models::{AuthResponse, AuthUser, LoginRequest, RegisterRequest};
use super::password::{hash_password, verify_password};

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(serde::Serialize)]
struct MessageResponse {
    message: String,
}

pub async fn register(
    request: web::Json<RegisterRequest>,
    db_repo: web::Data<DynamoDbRepository>,
) -> Result<HttpResponse> {
    let request = request.into_inner();

    if request.username.trim().is_empty()
        || request.password.is_empty()
        || request.fullname.trim().is_empty()
        || request.email.trim().is_empty()
    {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "All fields are required".to_string(),
        }));
    }

    // Collisions are expected and recoverable, not an exception path.
    match db_repo.get_user_by_username(&request.username).await {
        Ok(Some(_)) => {
            return Ok(HttpResponse::Conflict().json(ErrorResponse {
                error: "Username already taken, please pick another".to_string(),
            }));
        }
        Ok(None) => {}
        Err(e) => {
            error!("Failed to check username '{}': {:?}", request.username, e);
            return Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Registration is temporarily unavailable".to_string(),
            }));
        }
    }

    let user = User::new(
        request.username,
        hash_password(&request.password),
        request.fullname,
        request.email,
    );

    match db_repo.create_user(&user).await {
        Ok(()) => {
            log::info!("Registered new user '{}'", user.username);
            Ok(HttpResponse::Created().json(MessageResponse {
                message: "Registration successful, please log in".to_string(),
            }))
        }
        Err(e) => {
            error!("Failed to create user '{}': {:?}", user.username, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Registration failed".to_string(),
            }))
        }
    }
}

pub async fn login(
    request: web::Json<LoginRequest>,
    db_repo: web::Data<DynamoDbRepository>,
    jwt_service: web::Data<JwtService>,
) -> Result<HttpResponse> {
    let request = request.into_inner();

    let user = match db_repo.get_user_by_username(&request.username).await {
        Ok(Some(user)) if verify_password(&request.password, &user.password_hash) => user,
        Ok(_) => {
            // Uniform message for unknown user and wrong password.
            return Ok(HttpResponse::Unauthorized().json(ErrorResponse {
                error: "Invalid username or password".to_string(),
            }));
        }
        Err(e) => {
            error!("Failed to fetch user '{}': {:?}", request.username, e);
            return Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Login is temporarily unavailable".to_string(),
            }));
        }
    };

    let auth_user = AuthUser::from(user);
    match jwt_service.generate_token(&auth_user) {
        Ok(token) => {
            log::info!("User '{}' logged in", auth_user.username);
            Ok(HttpResponse::Ok().json(AuthResponse {
                token,
                user: auth_user,
            }))
        }
        Err(e) => {
            error!("Failed to issue token for '{}': {:?}", auth_user.username, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Login failed".to_string(),
            }))
        }
    }
}

/// Delete the calling account. Detection records go with it, cascade-style,
/// and the in-memory session is dropped.
pub async fn delete_account(
    user: AuthenticatedUser,
    db_repo: web::Data<DynamoDbRepository>,
    registry: web::Data<crate::session::registry::SessionRegistry>,
) -> Result<HttpResponse> {
    if user.0.is_nil() {
        return Ok(HttpResponse::Unauthorized().json(ErrorResponse {
            error: "Invalid user ID".to_string(),
        }));
    }

    match db_repo.delete_user(user.0).await {
        Ok(()) => {
            registry.remove(user.0).await;
            Ok(HttpResponse::Ok().json(MessageResponse {
                message: "Account and detection history deleted".to_string(),
            }))
        }
        Err(e) => {
            error!("Failed to delete account {}: {:?}", user.0, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Account deletion failed".to_string(),
            }))
        }
    }
}

pub async fn me(
    user: AuthenticatedUser,
    db_repo: web::Data<DynamoDbRepository>,
) -> Result<HttpResponse> {
    log::debug!("/api/auth/me called for user ID: {}", user.0);

    if user.0.is_nil() {
        return Ok(HttpResponse::Unauthorized().json(ErrorResponse {
            error: "Invalid user ID".to_string(),
        }));
    }

    match db_repo.get_user_by_id(user.0).await {
        Ok(Some(user_data)) => Ok(HttpResponse::Ok().json(AuthUser::from(user_data))),
        Ok(None) => {
            log::warn!("User not found in database for ID: {}", user.0);
            Ok(HttpResponse::NotFound().json(ErrorResponse {
                error: "User not found".to_string(),
            }))
        }
        Err(e) => {
            error!("Failed to fetch user data for ID {}: {:?}", user.0, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to fetch user data".to_string(),
            }))
        }
    }
}
