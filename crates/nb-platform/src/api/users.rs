//! Users API Endpoints
//!
//! - POST /users/login - Password login, sets the refresh cookie
//! - POST /users/register - Create a user with a generated password
//! - GET /users/logout - Clear the refresh cookie
//! - GET /me - New access token from the refresh cookie

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::common::SuccessResponse;
use crate::api::middleware::CurrentUser;
use crate::error::PlatformError;
use crate::service::{Registration, TokenKind, TokenService, UserService};

pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Clone)]
pub struct UsersState {
    pub user_service: Arc<UserService>,
    pub cookie_secure: bool,
}

/// Login request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Email address
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggedInUser {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
    pub is_first_login: bool,
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: LoggedInUser,
}

/// Registration request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact: String,
}

/// The generated password is only ever returned here.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: u64,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: SessionUser,
}

fn refresh_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::seconds(TokenService::ttl_seconds(TokenKind::Refresh)))
        .build()
}

/// Always emits the expiring cookie, even when the request carried none.
fn clear_refresh_cookie(jar: CookieJar) -> CookieJar {
    let mut cookie = Cookie::build((REFRESH_COOKIE, "")).http_only(true).path("/").build();
    cookie.make_removal();
    jar.add(cookie)
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, refresh cookie set", body = LoginResponse),
        (status = 400, description = "Missing credentials", body = crate::api::common::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::api::common::ApiError)
    )
)]
pub async fn login(
    State(state): State<UsersState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), PlatformError> {
    let outcome = state.user_service.login(&req.username, &req.password).await?;
    let user = outcome.user;
    let id = user
        .id
        .ok_or_else(|| PlatformError::internal("Stored user without id"))?;

    let jar = jar.add(refresh_cookie(outcome.refresh_token, state.cookie_secure));
    Ok((
        jar,
        Json(LoginResponse {
            user: LoggedInUser {
                id,
                first_name: user.first_name,
                last_name: user.last_name,
                email: user.email,
                contact: user.contact,
                is_first_login: user.is_first_login,
                access_token: outcome.access_token,
            },
        }),
    ))
}

/// Register a new user
///
/// Requires an authenticated caller, who is recorded as the creator.
#[utoipa::path(
    post,
    path = "/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Validation error", body = crate::api::common::ApiError),
        (status = 401, description = "Not authenticated", body = crate::api::common::ApiError),
        (status = 409, description = "Email already registered", body = crate::api::common::ApiError)
    )
)]
pub async fn register(
    State(state): State<UsersState>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), PlatformError> {
    let registered = state
        .user_service
        .register(
            Registration {
                first_name: req.first_name,
                last_name: req.last_name,
                email: req.email,
                contact: req.contact,
            },
            &actor,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: registered.user_id,
            email: registered.email,
            password: registered.password,
        }),
    ))
}

/// Logout
///
/// Tokens are stateless; logging out clears the refresh cookie.
#[utoipa::path(
    get,
    path = "/users/logout",
    tag = "users",
    responses(
        (status = 200, description = "Refresh cookie cleared", body = SuccessResponse)
    )
)]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<SuccessResponse>) {
    (clear_refresh_cookie(jar), Json(SuccessResponse::ok()))
}

/// Refresh access from the refresh cookie
#[utoipa::path(
    get,
    path = "/me",
    tag = "users",
    responses(
        (status = 200, description = "New access token", body = MeResponse),
        (status = 400, description = "User not found", body = crate::api::common::ApiError),
        (status = 403, description = "No refresh cookie", body = crate::api::common::ApiError),
        (status = 440, description = "Session expired, cookie cleared", body = crate::api::common::ApiError)
    )
)]
pub async fn me(State(state): State<UsersState>, jar: CookieJar) -> Response {
    let token = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    match state.user_service.refresh(token.as_deref()).await {
        Ok(outcome) => Json(MeResponse {
            user: SessionUser {
                id: outcome.identity.id,
                first_name: outcome.identity.first_name,
                last_name: outcome.identity.last_name,
                access_token: outcome.access_token,
            },
        })
        .into_response(),
        Err(PlatformError::RefreshExpired) => {
            (clear_refresh_cookie(jar), PlatformError::RefreshExpired).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub fn users_router(state: UsersState) -> Router {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/register", post(register))
        .route("/users/logout", get(logout))
        .route("/me", get(me))
        .with_state(state)
}
