use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, ResetPasswordRequest,
        },
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        reset::{generate_reset_token, RESET_TOKEN_TTL},
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", post(reset_password))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    if payload.name.is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Valid email is required".into()));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(&payload.name, &payload.email, &hash)
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Valid email is required".into()));
    }
    if payload.password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }

    // Unknown email and wrong password must be indistinguishable.
    let user = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let mut user = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or(ApiError::UnknownUser)?;

    let token = generate_reset_token();
    user.reset_password_token = Some(token.clone());
    user.reset_password_expires = Some(OffsetDateTime::now_utc() + RESET_TOKEN_TTL);
    state.users.save(&user).await?;

    let reset_link = format!("{}/reset-password/{}", state.config.client_base_url, token);
    // Delivery failures are logged, never surfaced to the caller.
    if let Err(e) = state
        .mailer
        .send_password_reset(&user.email, &reset_link)
        .await
    {
        error!(error = %e, user_id = %user.id, "password reset email failed");
    }

    info!(user_id = %user.id, "password reset requested");
    Ok(Json(MessageResponse::new("Password reset email sent")))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if payload.password.len() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }

    let mut user = state
        .users
        .find_by_reset_token(&token)
        .await?
        .ok_or(ApiError::InvalidOrExpiredToken)?;

    // Replacing the hash and clearing the token is one save: single use.
    user.password_hash = hash_password(&payload.password)?;
    user.reset_password_token = None;
    user.reset_password_expires = None;
    state.users.save(&user).await?;

    info!(user_id = %user.id, "password reset completed");
    Ok(Json(MessageResponse::new("Password has been reset")))
}
