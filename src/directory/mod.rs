//! Center roster lookups backing dashboards and invitee pickers.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_session, ActorRole, SessionUser};
use crate::shared::models::{Center, ParentStudent, Student, Teacher};
use crate::shared::schema::{centers, parent_students, students, teachers};
use crate::shared::state::AppState;

fn center_scope(session: &SessionUser, center_id: Uuid) -> Result<(), (StatusCode, String)> {
    if session.role == ActorRole::Admin {
        return Ok(());
    }
    if session.center_id == Some(center_id) {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        "Not authorized for this center".to_string(),
    ))
}

pub async fn list_centers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Center>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    if session.role != ActorRole::Admin {
        return Err((
            StatusCode::FORBIDDEN,
            "Only admins may list centers".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<Center> = centers::table
        .filter(centers::is_active.eq(true))
        .order(centers::name.asc())
        .select(Center::as_select())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn list_students(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<Student>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    center_scope(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<Student> = students::table
        .filter(students::center_id.eq(center_id))
        .filter(students::is_active.eq(true))
        .order((students::last_name.asc(), students::first_name.asc()))
        .select(Student::as_select())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<Teacher>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    center_scope(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<Teacher> = teachers::table
        .filter(teachers::center_id.eq(center_id))
        .filter(teachers::is_active.eq(true))
        .order((teachers::last_name.asc(), teachers::first_name.asc()))
        .select(Teacher::as_select())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn list_student_parents(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<ParentStudent>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let student_center: Uuid = students::table
        .filter(students::id.eq(student_id))
        .select(students::center_id)
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Student not found".to_string()))?;
    center_scope(&session, student_center)?;

    let rows: Vec<ParentStudent> = parent_students::table
        .filter(parent_students::student_id.eq(student_id))
        .select(ParentStudent::as_select())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub fn configure_directory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/directory/centers", get(list_centers))
        .route("/api/directory/centers/:center_id/students", get(list_students))
        .route("/api/directory/centers/:center_id/teachers", get(list_teachers))
        .route("/api/directory/students/:student_id/parents", get(list_student_parents))
}
