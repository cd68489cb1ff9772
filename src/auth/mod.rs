//! Login and bearer-session handling.
//!
//! Passwords are stored as Argon2 PHC strings. A successful login returns an
//! opaque bearer token backed by the in-memory session map plus the caller's
//! feature-permission snapshot, so dashboards can gate controls without a
//! round-trip per feature.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::permissions::{load_center_permissions, load_teacher_permissions};
use crate::shared::models::User;
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Admin,
    Center,
    Principal,
    Teacher,
    Student,
    Parent,
    Vendor,
    Developer,
}

impl ActorRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "center" => Some(Self::Center),
            "principal" => Some(Self::Principal),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            "parent" => Some(Self::Parent),
            "vendor" => Some(Self::Vendor),
            "developer" => Some(Self::Developer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Center => "center",
            Self::Principal => "principal",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Vendor => "vendor",
            Self::Developer => "developer",
        }
    }

    /// Principals act with center-level authority.
    pub fn is_center_level(&self) -> bool {
        matches!(self, Self::Center | Self::Principal)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub role: ActorRole,
    pub center_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub role: ActorRole,
    pub center_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub center_permissions: HashMap<String, bool>,
    pub teacher_permissions: HashMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: LoginUser,
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let user: Option<User> = users::table
        .filter(users::username.eq(&req.username))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let Some(user) = user else {
        warn!("Login failed: unknown user {}", req.username);
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()));
    };

    if !user.is_active || !verify_password(&req.password, &user.password_hash) {
        warn!("Login failed for {}", req.username);
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()));
    }

    let Some(role) = ActorRole::parse(&user.role) else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unknown role on account: {}", user.role),
        ));
    };

    diesel::update(users::table.filter(users::id.eq(user.id)))
        .set(users::last_login.eq(Some(Utc::now())))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    let center_permissions = match user.center_id {
        Some(center_id) => load_center_permissions(&mut conn, center_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?,
        None => HashMap::new(),
    };
    let teacher_permissions = match user.teacher_id {
        Some(teacher_id) => load_teacher_permissions(&mut conn, teacher_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?,
        None => HashMap::new(),
    };

    let session = SessionUser {
        user_id: user.id,
        role,
        center_id: user.center_id,
        student_id: user.student_id,
        teacher_id: user.teacher_id,
    };
    let token = Uuid::new_v4().to_string();
    state.sessions.write().await.insert(token.clone(), session);

    info!("User {} logged in as {}", user.username, role.as_str());

    Ok(Json(LoginResponse {
        success: true,
        token,
        user: LoginUser {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            role,
            center_id: user.center_id,
            student_id: user.student_id,
            teacher_id: user.teacher_id,
            center_permissions,
            teacher_permissions,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub role: String,
    pub display_name: Option<String>,
    pub center_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: ActorRole,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    if session.role != ActorRole::Admin && !session.role.is_center_level() {
        return Err((
            StatusCode::FORBIDDEN,
            "Not authorized to create accounts".to_string(),
        ));
    }

    let Some(role) = ActorRole::parse(&req.role) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Unknown role: {}", req.role),
        ));
    };
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Username and password are required".to_string(),
        ));
    }
    // Center actors may only provision accounts inside their own center.
    if session.role != ActorRole::Admin && req.center_id != session.center_id {
        return Err((
            StatusCode::FORBIDDEN,
            "Cannot create accounts outside your center".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash error: {e}")))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    diesel::insert_into(users::table)
        .values((
            users::id.eq(id),
            users::username.eq(&req.username),
            users::email.eq(req.email.as_deref()),
            users::password_hash.eq(&password_hash),
            users::role.eq(role.as_str()),
            users::display_name.eq(req.display_name.as_deref()),
            users::center_id.eq(req.center_id),
            users::student_id.eq(req.student_id),
            users::teacher_id.eq(req.teacher_id),
            users::is_active.eq(true),
            users::created_at.eq(now),
            users::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    info!("Created {} account {}", role.as_str(), req.username);
    Ok(Json(CreateUserResponse {
        id,
        username: req.username,
        role,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.write().await.remove(&token);
    }
    Ok(StatusCode::NO_CONTENT)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Resolve the caller from the Authorization header or reject with 401.
pub async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<SessionUser, (StatusCode, String)> {
    let Some(token) = bearer_token(headers) else {
        return Err((StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()));
    };
    state
        .sessions
        .read()
        .await
        .get(&token)
        .cloned()
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string()))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/users", post(create_user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn role_parsing_round_trip() {
        for role in [
            ActorRole::Admin,
            ActorRole::Center,
            ActorRole::Principal,
            ActorRole::Teacher,
            ActorRole::Student,
            ActorRole::Parent,
            ActorRole::Vendor,
            ActorRole::Developer,
        ] {
            assert_eq!(ActorRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ActorRole::parse("superuser"), None);
    }
}
