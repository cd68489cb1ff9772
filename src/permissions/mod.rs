//! Feature-permission cascade.
//!
//! A feature flag is stored per center and per teacher, one row per
//! (owner, feature). An absent row is `Unset`, which resolves to enabled, so
//! the default policy lives in one visible place instead of a fallback
//! expression. A teacher sees a feature only when the center flag AND the
//! teacher flag both allow it.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, put},
    Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_session, ActorRole, SessionUser};
use crate::shared::schema::{center_feature_permissions, teacher_feature_permissions, teachers};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Enabled,
    Disabled,
    Unset,
}

impl PermissionState {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Enabled,
            Some(false) => Self::Disabled,
            None => Self::Unset,
        }
    }

    /// `Unset` maps to enabled here, at the resolution boundary.
    pub fn allows(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Pure cascade decision: which stored states grant access to which actor.
pub fn resolve_states(
    role: ActorRole,
    center: PermissionState,
    teacher: PermissionState,
) -> bool {
    match role {
        ActorRole::Admin => true,
        ActorRole::Center | ActorRole::Principal => center.allows(),
        ActorRole::Teacher => center.allows() && teacher.allows(),
        // Parents, students, vendors and developers are not feature-gated.
        _ => true,
    }
}

pub fn center_permission_state(
    conn: &mut PgConnection,
    center_id: Uuid,
    feature: &str,
) -> QueryResult<PermissionState> {
    let flag = center_feature_permissions::table
        .filter(center_feature_permissions::center_id.eq(center_id))
        .filter(center_feature_permissions::feature_name.eq(feature))
        .select(center_feature_permissions::is_enabled)
        .first::<bool>(conn)
        .optional()?;
    Ok(PermissionState::from_flag(flag))
}

pub fn teacher_permission_state(
    conn: &mut PgConnection,
    teacher_id: Uuid,
    feature: &str,
) -> QueryResult<PermissionState> {
    let flag = teacher_feature_permissions::table
        .filter(teacher_feature_permissions::teacher_id.eq(teacher_id))
        .filter(teacher_feature_permissions::feature_name.eq(feature))
        .select(teacher_feature_permissions::is_enabled)
        .first::<bool>(conn)
        .optional()?;
    Ok(PermissionState::from_flag(flag))
}

/// Resolve feature access for an actor. Every call is a fresh read; there is
/// no permission cache to invalidate.
pub fn resolve(
    conn: &mut PgConnection,
    role: ActorRole,
    center_id: Option<Uuid>,
    teacher_id: Option<Uuid>,
    feature: &str,
) -> QueryResult<bool> {
    let center = match center_id {
        Some(id) => center_permission_state(conn, id, feature)?,
        None => PermissionState::Unset,
    };
    let teacher = match teacher_id {
        Some(id) => teacher_permission_state(conn, id, feature)?,
        None => PermissionState::Unset,
    };
    Ok(resolve_states(role, center, teacher))
}

pub fn load_center_permissions(
    conn: &mut PgConnection,
    center_id: Uuid,
) -> QueryResult<HashMap<String, bool>> {
    let rows: Vec<(String, bool)> = center_feature_permissions::table
        .filter(center_feature_permissions::center_id.eq(center_id))
        .select((
            center_feature_permissions::feature_name,
            center_feature_permissions::is_enabled,
        ))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

pub fn load_teacher_permissions(
    conn: &mut PgConnection,
    teacher_id: Uuid,
) -> QueryResult<HashMap<String, bool>> {
    let rows: Vec<(String, bool)> = teacher_feature_permissions::table
        .filter(teacher_feature_permissions::teacher_id.eq(teacher_id))
        .select((
            teacher_feature_permissions::feature_name,
            teacher_feature_permissions::is_enabled,
        ))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

// ===== HTTP surface =====

#[derive(Debug, Deserialize)]
pub struct ToggleCenterFeatureRequest {
    pub center_id: Uuid,
    pub feature_name: String,
    pub is_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToggleTeacherFeatureRequest {
    pub teacher_id: Uuid,
    pub feature_name: String,
    pub is_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct FeatureCheckResponse {
    pub feature: String,
    pub allowed: bool,
}

fn center_scope_or_forbidden(
    session: &SessionUser,
    center_id: Uuid,
) -> Result<(), (StatusCode, String)> {
    if session.role == ActorRole::Admin {
        return Ok(());
    }
    if session.role.is_center_level() && session.center_id == Some(center_id) {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        "Not authorized for this center".to_string(),
    ))
}

pub async fn get_center_permissions(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, bool>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    center_scope_or_forbidden(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    let map = load_center_permissions(&mut conn, center_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(map))
}

pub async fn get_teacher_permissions(
    State(state): State<Arc<AppState>>,
    Path(teacher_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, bool>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let teacher_center: Uuid = teachers::table
        .filter(teachers::id.eq(teacher_id))
        .select(teachers::center_id)
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Teacher not found".to_string()))?;

    // Teachers may read their own flags; otherwise center scope applies.
    if session.teacher_id != Some(teacher_id) {
        center_scope_or_forbidden(&session, teacher_center)?;
    }

    let map = load_teacher_permissions(&mut conn, teacher_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(map))
}

/// Resolve a single feature for the calling session.
pub async fn check_feature(
    State(state): State<Arc<AppState>>,
    Path(feature): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FeatureCheckResponse>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    let allowed = resolve(
        &mut conn,
        session.role,
        session.center_id,
        session.teacher_id,
        &feature,
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(FeatureCheckResponse { feature, allowed }))
}

pub async fn toggle_center_feature(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ToggleCenterFeatureRequest>,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    if session.role != ActorRole::Admin {
        return Err((
            StatusCode::FORBIDDEN,
            "Only admins may toggle center features".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    let now = Utc::now();

    diesel::insert_into(center_feature_permissions::table)
        .values((
            center_feature_permissions::id.eq(Uuid::new_v4()),
            center_feature_permissions::center_id.eq(req.center_id),
            center_feature_permissions::feature_name.eq(&req.feature_name),
            center_feature_permissions::is_enabled.eq(req.is_enabled),
            center_feature_permissions::updated_at.eq(now),
        ))
        .on_conflict((
            center_feature_permissions::center_id,
            center_feature_permissions::feature_name,
        ))
        .do_update()
        .set((
            center_feature_permissions::is_enabled.eq(req.is_enabled),
            center_feature_permissions::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Upsert error: {e}")))?;

    info!(
        "Center {} feature '{}' set to {}",
        req.center_id, req.feature_name, req.is_enabled
    );
    Ok(Json(ToggleResponse { success: true }))
}

/// Toggle a teacher's flag. The disabled UI control in clients is advisory;
/// the real guard lives here: caller must hold center scope for the teacher's
/// center, and the center-level flag for the feature must itself allow it.
pub async fn toggle_teacher_feature(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ToggleTeacherFeatureRequest>,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let teacher_center: Uuid = teachers::table
        .filter(teachers::id.eq(req.teacher_id))
        .select(teachers::center_id)
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Teacher not found".to_string()))?;

    if !(session.role.is_center_level() && session.center_id == Some(teacher_center)) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the teacher's center may toggle teacher features".to_string(),
        ));
    }

    let center_state = center_permission_state(&mut conn, teacher_center, &req.feature_name)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if !center_state.allows() {
        return Err((
            StatusCode::FORBIDDEN,
            format!(
                "Feature '{}' is disabled at the center level",
                req.feature_name
            ),
        ));
    }

    let now = Utc::now();
    diesel::insert_into(teacher_feature_permissions::table)
        .values((
            teacher_feature_permissions::id.eq(Uuid::new_v4()),
            teacher_feature_permissions::teacher_id.eq(req.teacher_id),
            teacher_feature_permissions::feature_name.eq(&req.feature_name),
            teacher_feature_permissions::is_enabled.eq(req.is_enabled),
            teacher_feature_permissions::updated_at.eq(now),
        ))
        .on_conflict((
            teacher_feature_permissions::teacher_id,
            teacher_feature_permissions::feature_name,
        ))
        .do_update()
        .set((
            teacher_feature_permissions::is_enabled.eq(req.is_enabled),
            teacher_feature_permissions::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Upsert error: {e}")))?;

    info!(
        "Teacher {} feature '{}' set to {}",
        req.teacher_id, req.feature_name, req.is_enabled
    );
    Ok(Json(ToggleResponse { success: true }))
}

pub fn configure_permission_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/permissions/center/:center_id", get(get_center_permissions))
        .route("/api/permissions/teacher/:teacher_id", get(get_teacher_permissions))
        .route("/api/permissions/check/:feature", get(check_feature))
        .route("/api/permissions/center", put(toggle_center_feature))
        .route("/api/permissions/teacher", put(toggle_teacher_feature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_access_is_the_and_of_both_flags() {
        let cases = [
            (Some(true), Some(true), true),
            (Some(true), Some(false), false),
            (Some(false), Some(true), false),
            (Some(false), Some(false), false),
        ];
        for (center, teacher, expected) in cases {
            let got = resolve_states(
                ActorRole::Teacher,
                PermissionState::from_flag(center),
                PermissionState::from_flag(teacher),
            );
            assert_eq!(got, expected, "center={center:?} teacher={teacher:?}");
        }
    }

    #[test]
    fn unset_flags_default_to_enabled() {
        assert!(resolve_states(
            ActorRole::Teacher,
            PermissionState::Unset,
            PermissionState::Unset
        ));
        assert!(resolve_states(
            ActorRole::Center,
            PermissionState::Unset,
            PermissionState::Unset
        ));
        // One side unset still defers to the other.
        assert!(!resolve_states(
            ActorRole::Teacher,
            PermissionState::Disabled,
            PermissionState::Unset
        ));
        assert!(!resolve_states(
            ActorRole::Teacher,
            PermissionState::Unset,
            PermissionState::Disabled
        ));
    }

    #[test]
    fn admin_sees_every_feature() {
        for center in [
            PermissionState::Enabled,
            PermissionState::Disabled,
            PermissionState::Unset,
        ] {
            for teacher in [
                PermissionState::Enabled,
                PermissionState::Disabled,
                PermissionState::Unset,
            ] {
                assert!(resolve_states(ActorRole::Admin, center, teacher));
            }
        }
    }

    #[test]
    fn parents_are_not_gated() {
        assert!(resolve_states(
            ActorRole::Parent,
            PermissionState::Disabled,
            PermissionState::Disabled
        ));
    }

    #[test]
    fn center_actors_ignore_teacher_flags() {
        assert!(resolve_states(
            ActorRole::Center,
            PermissionState::Enabled,
            PermissionState::Disabled
        ));
        assert!(!resolve_states(
            ActorRole::Principal,
            PermissionState::Disabled,
            PermissionState::Enabled
        ));
    }
}
