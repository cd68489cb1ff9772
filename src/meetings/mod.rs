//! Meetings and attendee rosters.
//!
//! Relinking attendees is a full replace: the previous roster is deleted and
//! the new one inserted in a single transaction, so a failed relink never
//! leaves a half-replaced roster. Students resolve to their linked parent
//! login and teachers to their own login; invitees with no resolvable account
//! are skipped with a warning.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_session, ActorRole, SessionUser};
use crate::shared::schema::{meeting_attendees, meetings::meetings, parent_students, users};
use crate::shared::state::AppState;

pub const MEETING_TYPE_PARENTS: &str = "parents";
pub const MEETING_TYPE_TEACHERS: &str = "teachers";
pub const MEETING_TYPE_BOTH: &str = "both";

pub const ATTENDANCE_INVITE: &str = "invite";

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = meetings)]
pub struct Meeting {
    pub id: Uuid,
    pub center_id: Uuid,
    pub title: String,
    pub agenda: Option<String>,
    pub meeting_date: NaiveDate,
    pub meeting_time: String,
    pub meeting_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = meeting_attendees)]
pub struct MeetingAttendee {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub student_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub attendance_status: String,
    pub attended: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStudent {
    pub student_id: Uuid,
    pub parent_user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTeacher {
    pub teacher_id: Uuid,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendeeSeed {
    pub student_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Decide the fresh roster from resolved invitees. Students without a linked
/// parent account and teachers without a login produce no row.
pub fn build_roster(
    meeting_type: &str,
    students: &[ResolvedStudent],
    teachers: &[ResolvedTeacher],
) -> Vec<AttendeeSeed> {
    let mut roster = Vec::new();
    if meeting_type == MEETING_TYPE_PARENTS || meeting_type == MEETING_TYPE_BOTH {
        for s in students {
            if let Some(parent_user_id) = s.parent_user_id {
                roster.push(AttendeeSeed {
                    student_id: Some(s.student_id),
                    teacher_id: None,
                    user_id: Some(parent_user_id),
                });
            }
        }
    }
    if meeting_type == MEETING_TYPE_TEACHERS || meeting_type == MEETING_TYPE_BOTH {
        for t in teachers {
            if let Some(user_id) = t.user_id {
                roster.push(AttendeeSeed {
                    student_id: None,
                    teacher_id: Some(t.teacher_id),
                    user_id: Some(user_id),
                });
            }
        }
    }
    roster
}

// ===== HTTP surface =====

#[derive(Debug, Deserialize)]
pub struct CreateMeetingRequest {
    pub center_id: Uuid,
    pub title: String,
    pub agenda: Option<String>,
    pub meeting_date: NaiveDate,
    pub meeting_time: String,
    pub meeting_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RelinkAttendeesRequest {
    #[serde(default)]
    pub student_ids: Vec<Uuid>,
    #[serde(default)]
    pub teacher_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RelinkResponse {
    pub success: bool,
    pub attendees_linked: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub attendance_status: String,
    pub attended: bool,
}

fn meeting_scope(session: &SessionUser, center_id: Uuid) -> Result<(), (StatusCode, String)> {
    if session.role == ActorRole::Admin {
        return Ok(());
    }
    if session.role.is_center_level() && session.center_id == Some(center_id) {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        "Not authorized for this center's meetings".to_string(),
    ))
}

pub async fn create_meeting(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateMeetingRequest>,
) -> Result<Json<Meeting>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    meeting_scope(&session, req.center_id)?;

    if ![MEETING_TYPE_PARENTS, MEETING_TYPE_TEACHERS, MEETING_TYPE_BOTH]
        .contains(&req.meeting_type.as_str())
    {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Invalid meeting type: {}", req.meeting_type),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let meeting = Meeting {
        id: Uuid::new_v4(),
        center_id: req.center_id,
        title: req.title,
        agenda: req.agenda,
        meeting_date: req.meeting_date,
        meeting_time: req.meeting_time,
        meeting_type: req.meeting_type,
        status: "scheduled".to_string(),
        created_at: Utc::now(),
    };
    diesel::insert_into(meetings::table)
        .values(&meeting)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(meeting))
}

pub async fn list_meetings(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<Meeting>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    meeting_scope(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<Meeting> = meetings::table
        .filter(meetings::center_id.eq(center_id))
        .order(meetings::meeting_date.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

/// Replace the meeting's roster with the given invitees. Prior rows are
/// dropped wholesale, including any attendance already recorded on them.
pub async fn relink_attendees(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RelinkAttendeesRequest>,
) -> Result<Json<RelinkResponse>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let meeting: Meeting = meetings::table
        .filter(meetings::id.eq(meeting_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Meeting not found".to_string()))?;
    meeting_scope(&session, meeting.center_id)?;

    let mut students = Vec::with_capacity(req.student_ids.len());
    for student_id in &req.student_ids {
        let parent_user_id: Option<Uuid> = parent_students::table
            .filter(parent_students::student_id.eq(student_id))
            .select(parent_students::parent_user_id)
            .first(&mut conn)
            .optional()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if parent_user_id.is_none() {
            warn!("Student {student_id} has no linked parent account, skipping invite");
        }
        students.push(ResolvedStudent {
            student_id: *student_id,
            parent_user_id,
        });
    }

    let mut teacher_links = Vec::with_capacity(req.teacher_ids.len());
    for teacher_id in &req.teacher_ids {
        let user_id: Option<Uuid> = users::table
            .filter(users::teacher_id.eq(teacher_id))
            .select(users::id)
            .first(&mut conn)
            .optional()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if user_id.is_none() {
            warn!("Teacher {teacher_id} has no login account, skipping invite");
        }
        teacher_links.push(ResolvedTeacher {
            teacher_id: *teacher_id,
            user_id,
        });
    }

    let roster = build_roster(&meeting.meeting_type, &students, &teacher_links);
    let invited = req.student_ids.len() + req.teacher_ids.len();
    let now = Utc::now();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(
            meeting_attendees::table.filter(meeting_attendees::meeting_id.eq(meeting_id)),
        )
        .execute(conn)?;

        for seed in &roster {
            let attendee = MeetingAttendee {
                id: Uuid::new_v4(),
                meeting_id,
                student_id: seed.student_id,
                teacher_id: seed.teacher_id,
                user_id: seed.user_id,
                attendance_status: ATTENDANCE_INVITE.to_string(),
                attended: false,
                created_at: now,
            };
            diesel::insert_into(meeting_attendees::table)
                .values(&attendee)
                .execute(conn)?;
        }
        Ok(())
    })
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Relink error: {e}")))?;

    info!(
        "Relinked meeting {meeting_id}: {} attendees, {} skipped",
        roster.len(),
        invited - roster.len()
    );
    Ok(Json(RelinkResponse {
        success: true,
        attendees_linked: roster.len(),
        skipped: invited - roster.len(),
    }))
}

pub async fn list_attendees(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<MeetingAttendee>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let meeting: Meeting = meetings::table
        .filter(meetings::id.eq(meeting_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Meeting not found".to_string()))?;
    meeting_scope(&session, meeting.center_id)?;

    let rows: Vec<MeetingAttendee> = meeting_attendees::table
        .filter(meeting_attendees::meeting_id.eq(meeting_id))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn record_attendance(
    State(state): State<Arc<AppState>>,
    Path(attendee_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RecordAttendanceRequest>,
) -> Result<Json<MeetingAttendee>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let attendee: MeetingAttendee = meeting_attendees::table
        .filter(meeting_attendees::id.eq(attendee_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Attendee not found".to_string()))?;
    let meeting: Meeting = meetings::table
        .filter(meetings::id.eq(attendee.meeting_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Meeting not found".to_string()))?;
    meeting_scope(&session, meeting.center_id)?;

    diesel::update(meeting_attendees::table.filter(meeting_attendees::id.eq(attendee_id)))
        .set((
            meeting_attendees::attendance_status.eq(&req.attendance_status),
            meeting_attendees::attended.eq(req.attended),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    let updated: MeetingAttendee = meeting_attendees::table
        .filter(meeting_attendees::id.eq(attendee_id))
        .first(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(updated))
}

pub fn configure_meeting_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/meetings", post(create_meeting))
        .route("/api/meetings/centers/:center_id", get(list_meetings))
        .route(
            "/api/meetings/:meeting_id/attendees",
            get(list_attendees).put(relink_attendees),
        )
        .route("/api/meetings/attendees/:attendee_id", put(record_attendance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(parent: Option<Uuid>) -> ResolvedStudent {
        ResolvedStudent {
            student_id: Uuid::new_v4(),
            parent_user_id: parent,
        }
    }

    fn teacher(user: Option<Uuid>) -> ResolvedTeacher {
        ResolvedTeacher {
            teacher_id: Uuid::new_v4(),
            user_id: user,
        }
    }

    #[test]
    fn students_without_parent_links_are_skipped() {
        let linked = student(Some(Uuid::new_v4()));
        let orphan = student(None);
        let roster = build_roster(MEETING_TYPE_PARENTS, &[linked, orphan], &[]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].student_id, Some(linked.student_id));
        assert_eq!(roster[0].user_id, linked.parent_user_id);
    }

    #[test]
    fn teachers_without_accounts_are_skipped() {
        let with_login = teacher(Some(Uuid::new_v4()));
        let without = teacher(None);
        let roster = build_roster(MEETING_TYPE_TEACHERS, &[], &[with_login, without]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].teacher_id, Some(with_login.teacher_id));
    }

    #[test]
    fn parents_meetings_ignore_teacher_invitees() {
        let roster = build_roster(
            MEETING_TYPE_PARENTS,
            &[student(Some(Uuid::new_v4()))],
            &[teacher(Some(Uuid::new_v4()))],
        );
        assert_eq!(roster.len(), 1);
        assert!(roster[0].teacher_id.is_none());
    }

    #[test]
    fn both_meetings_combine_parent_and_teacher_rows() {
        let roster = build_roster(
            MEETING_TYPE_BOTH,
            &[student(Some(Uuid::new_v4())), student(None)],
            &[teacher(Some(Uuid::new_v4()))],
        );
        assert_eq!(roster.len(), 2);
        assert!(roster.iter().any(|s| s.student_id.is_some()));
        assert!(roster.iter().any(|s| s.teacher_id.is_some()));
    }
}
