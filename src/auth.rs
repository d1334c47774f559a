use actix_web::{
    body::EitherBody,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use futures_util::future::{ok, LocalBoxFuture, Ready as FutureReady};
use jsonwebtoken::{
    decode, encode, errors::Error as JwtError, DecodingKey, EncodingKey, Header, Validation,
};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::error::ApiError;
use crate::models::{Role, User, UserResponse};
use crate::response;
use crate::store::StoreError;
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const EMAIL_TAKEN: &str = "کاربر با این ایمیل قبلا ثبت نام کرده است";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub exp: i64,
    pub iat: i64,
}

/// Identity proven by a bearer token, attached to the request by [`AuthMiddleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: ObjectId,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    web::block(move || hash(password.as_bytes(), cost))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            ApiError::Internal("Password hashing failed".into())
        })
}

pub async fn verify_password(password: String, password_hash: String) -> Result<bool, ApiError> {
    web::block(move || verify(password.as_bytes(), &password_hash))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))?
        .map_err(|e| {
            error!("Password verification error: {}", e);
            ApiError::Internal("Password verification failed".into())
        })
}

pub fn generate_token(
    user_id: &ObjectId,
    secret: &str,
    lifetime: Duration,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        user_id: user_id.to_hex(),
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Token generation error: {}", e);
        ApiError::Internal("Token generation failed".into())
    })
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Reads `Authorization: Bearer <jwt>` and turns it into a [`Session`].
pub fn session_from_request(req: &HttpRequest, secret: &str) -> Result<Session, ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| ApiError::Auth("No authorization header".into()))?;
    let value = header
        .to_str()
        .map_err(|_| ApiError::Auth("Invalid authorization header".into()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Auth("Invalid authorization header format".into()))?;

    let claims = verify_token(token.trim(), secret).map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Auth("Invalid token".into())
    })?;
    let user_id = ObjectId::parse_str(&claims.user_id)
        .map_err(|_| ApiError::Auth("Invalid token".into()))?;

    Ok(Session { user_id })
}

fn issue(state: &AppState, user: &User) -> Result<AuthResponse, ApiError> {
    Ok(AuthResponse {
        user: UserResponse::from(user),
        token: generate_token(&user.id, &state.config.jwt_secret, state.config.token_lifetime)?,
    })
}

pub async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut payload = payload.into_inner();
    payload.email = normalize_email(&payload.email);
    payload.name = normalize_name(payload.name);
    payload.validate()?;

    if state.store.find_user_by_email(&payload.email).await?.is_some() {
        debug!("Registration rejected, email in use: {}", payload.email);
        return Err(ApiError::Duplicate(EMAIL_TAKEN.into()));
    }

    let password_hash = hash_password(payload.password, state.config.bcrypt_cost).await?;
    let user = User {
        id: ObjectId::new(),
        name: payload.name,
        email: payload.email,
        password_hash,
        // the public endpoint only ever creates customers
        role: Role::Customer,
        addresses: Vec::new(),
        created_at: BsonDateTime::now(),
    };

    match state.store.insert_user(&user).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => return Err(ApiError::Duplicate(EMAIL_TAKEN.into())),
        Err(e) => return Err(e.into()),
    }

    info!("Created new user with ID: {}", user.id);
    Ok(response::created(
        "Customer registered successfully",
        issue(&state, &user)?,
    ))
}

pub async fn login(
    state: web::Data<AppState>,
    credentials: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut credentials = credentials.into_inner();
    credentials.email = normalize_email(&credentials.email);
    credentials.validate()?;

    // Same answer for unknown email and wrong password.
    let user = match state.store.find_user_by_email(&credentials.email).await? {
        Some(user) => user,
        None => {
            debug!("Login failed, unknown email");
            return Err(ApiError::Auth(INVALID_CREDENTIALS.into()));
        }
    };

    if !verify_password(credentials.password, user.password_hash.clone()).await? {
        warn!("Login failed, bad password for user {}", user.id);
        return Err(ApiError::Auth(INVALID_CREDENTIALS.into()));
    }

    info!("User {} logged in", user.id);
    Ok(response::ok("Login successful", issue(&state, &user)?))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Result<HttpResponse, ApiError> {
    Ok(response::ok(
        "User retrieved successfully",
        serde_json::json!({ "user": UserResponse::from(&user) }),
    ))
}

pub async fn change_password(
    state: web::Data<AppState>,
    CurrentUser(mut user): CurrentUser,
    payload: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload.validate()?;

    if !verify_password(payload.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::Validation("Current password is incorrect".into()));
    }

    user.password_hash = hash_password(payload.new_password, state.config.bcrypt_cost).await?;
    if !state.store.save_user(&user).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }

    info!("Password changed for user {}", user.id);
    Ok(response::message("Password changed successfully"))
}

/// Authenticated caller, loaded from the store.
pub struct CurrentUser(pub User);

/// Authenticated caller holding the admin role.
pub struct AdminUser(pub User);

async fn load_user(
    state: Option<web::Data<AppState>>,
    session: Result<Session, ApiError>,
) -> Result<User, ApiError> {
    let state =
        state.ok_or_else(|| ApiError::Internal("application state not configured".into()))?;
    let session = session?;
    state
        .store
        .find_user(&session.user_id)
        .await?
        .ok_or_else(|| ApiError::Auth("User not found".into()))
}

fn resolve_session(
    req: &HttpRequest,
    state: Option<&web::Data<AppState>>,
) -> Result<Session, ApiError> {
    if let Some(session) = req.extensions().get::<Session>() {
        return Ok(*session);
    }
    match state {
        Some(state) => session_from_request(req, &state.config.jwt_secret),
        None => Err(ApiError::Auth("User not authenticated".into())),
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let session = resolve_session(req, state.as_ref());
        Box::pin(async move { load_user(state, session).await.map(CurrentUser) })
    }
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let session = resolve_session(req, state.as_ref());
        Box::pin(async move {
            let user = load_user(state, session).await?;
            if !user.is_admin() {
                debug!("User {} denied admin route", user.id);
                return Err(ApiError::Forbidden("Admin access required".into()));
            }
            Ok(AdminUser(user))
        })
    }
}

// Auth middleware implementation
pub struct AuthMiddleware;

impl Default for AuthMiddleware {
    fn default() -> Self {
        AuthMiddleware
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareMiddleware<S>;
    type Future = FutureReady<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware { service })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session = match req.app_data::<web::Data<AppState>>() {
            Some(state) => session_from_request(req.request(), &state.config.jwt_secret),
            None => Err(ApiError::Internal("application state not configured".into())),
        };

        match session {
            Ok(session) => {
                req.extensions_mut().insert(session);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(err) => {
                let response = err.error_response();
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}
