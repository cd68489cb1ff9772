//! Parent-center messaging.
//!
//! One conversation per (center, parent, student) triple, kept unique by a
//! pre-insert existence check rather than a database constraint. List items
//! carry an unread count so clients avoid a per-thread query. Mutations
//! publish row-identity change events for subscribers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_session, ActorRole, SessionUser};
use crate::events::{publish, ChangeEvent, ChangeKind};
use crate::shared::schema::{chat_conversations, chat_messages};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = chat_conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub center_id: Uuid,
    pub student_id: Uuid,
    pub parent_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = chat_messages)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_user_id: Uuid,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub center_id: Uuid,
    pub student_id: Uuid,
    pub parent_user_id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    pub center_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EnsureConversationRequest {
    pub center_id: Uuid,
    pub student_id: Uuid,
    /// Defaults to the caller for parent sessions.
    pub parent_user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

fn can_access_conversation(session: &SessionUser, conversation: &Conversation) -> bool {
    match session.role {
        ActorRole::Admin => true,
        ActorRole::Parent => conversation.parent_user_id == session.user_id,
        _ if session.role.is_center_level() => session.center_id == Some(conversation.center_id),
        _ => false,
    }
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConversationListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = chat_conversations::table.into_boxed();
    match session.role {
        ActorRole::Parent => {
            q = q.filter(chat_conversations::parent_user_id.eq(session.user_id));
        }
        ActorRole::Admin => {
            if let Some(center_id) = query.center_id {
                q = q.filter(chat_conversations::center_id.eq(center_id));
            }
        }
        _ if session.role.is_center_level() => {
            let Some(center_id) = session.center_id else {
                return Err((
                    StatusCode::FORBIDDEN,
                    "No center on this account".to_string(),
                ));
            };
            q = q.filter(chat_conversations::center_id.eq(center_id));
        }
        _ => {
            return Err((
                StatusCode::FORBIDDEN,
                "Not authorized for conversations".to_string(),
            ));
        }
    }

    let conversations: Vec<Conversation> = q
        .order(chat_conversations::updated_at.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut summaries = Vec::with_capacity(conversations.len());
    for c in conversations {
        let unread_count: i64 = chat_messages::table
            .filter(chat_messages::conversation_id.eq(c.id))
            .filter(chat_messages::sender_user_id.ne(session.user_id))
            .filter(chat_messages::is_read.eq(false))
            .count()
            .get_result(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        summaries.push(ConversationSummary {
            id: c.id,
            center_id: c.center_id,
            student_id: c.student_id,
            parent_user_id: c.parent_user_id,
            updated_at: c.updated_at,
            unread_count,
        });
    }
    Ok(Json(summaries))
}

/// Find or create the conversation for a (center, parent, student) triple.
pub async fn ensure_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<EnsureConversationRequest>,
) -> Result<Json<Conversation>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let parent_user_id = match session.role {
        ActorRole::Parent => session.user_id,
        _ => req.parent_user_id.ok_or((
            StatusCode::UNPROCESSABLE_ENTITY,
            "parent_user_id is required".to_string(),
        ))?,
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let existing: Option<Conversation> = chat_conversations::table
        .filter(chat_conversations::center_id.eq(req.center_id))
        .filter(chat_conversations::student_id.eq(req.student_id))
        .filter(chat_conversations::parent_user_id.eq(parent_user_id))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if let Some(conversation) = existing {
        if !can_access_conversation(&session, &conversation) {
            return Err((StatusCode::FORBIDDEN, "Not your conversation".to_string()));
        }
        return Ok(Json(conversation));
    }

    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4(),
        center_id: req.center_id,
        student_id: req.student_id,
        parent_user_id,
        created_at: now,
        updated_at: now,
    };
    if !can_access_conversation(&session, &conversation) {
        return Err((StatusCode::FORBIDDEN, "Not your conversation".to_string()));
    }
    diesel::insert_into(chat_conversations::table)
        .values(&conversation)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    publish(
        &state,
        ChangeEvent::new("chat_conversations", ChangeKind::Insert, conversation.id),
    );
    Ok(Json(conversation))
}

fn load_conversation_checked(
    conn: &mut PgConnection,
    session: &SessionUser,
    conversation_id: Uuid,
) -> Result<Conversation, (StatusCode, String)> {
    let conversation: Conversation = chat_conversations::table
        .filter(chat_conversations::id.eq(conversation_id))
        .first(conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Conversation not found".to_string()))?;
    if !can_access_conversation(session, &conversation) {
        return Err((StatusCode::FORBIDDEN, "Not your conversation".to_string()));
    }
    Ok(conversation)
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    load_conversation_checked(&mut conn, &session, conversation_id)?;

    let rows: Vec<ChatMessage> = chat_messages::table
        .filter(chat_messages::conversation_id.eq(conversation_id))
        .order(chat_messages::created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    if req.body.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Message body is required".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    load_conversation_checked(&mut conn, &session, conversation_id)?;

    let now = Utc::now();
    let message = ChatMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender_user_id: session.user_id,
        body: req.body,
        is_read: false,
        created_at: now,
    };

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(chat_messages::table)
            .values(&message)
            .execute(conn)?;
        diesel::update(
            chat_conversations::table.filter(chat_conversations::id.eq(conversation_id)),
        )
        .set(chat_conversations::updated_at.eq(now))
        .execute(conn)?;
        Ok(())
    })
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Send error: {e}")))?;

    publish(
        &state,
        ChangeEvent::new("chat_messages", ChangeKind::Insert, message.id)
            .with_conversation(conversation_id),
    );
    publish(
        &state,
        ChangeEvent::new("chat_conversations", ChangeKind::Update, conversation_id),
    );
    Ok(Json(message))
}

/// Mark every message from the other side of the thread as read.
pub async fn mark_conversation_read(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    load_conversation_checked(&mut conn, &session, conversation_id)?;

    let updated = diesel::update(
        chat_messages::table
            .filter(chat_messages::conversation_id.eq(conversation_id))
            .filter(chat_messages::sender_user_id.ne(session.user_id))
            .filter(chat_messages::is_read.eq(false)),
    )
    .set(chat_messages::is_read.eq(true))
    .execute(&mut conn)
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    if updated > 0 {
        publish(
            &state,
            ChangeEvent::new("chat_conversations", ChangeKind::Update, conversation_id),
        );
    }
    info!("Marked {updated} messages read in conversation {conversation_id}");
    Ok(Json(serde_json::json!({ "success": true, "marked_read": updated })))
}

pub fn configure_chat_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/chat/conversations",
            get(list_conversations).post(ensure_conversation),
        )
        .route(
            "/api/chat/conversations/:conversation_id/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/api/chat/conversations/:conversation_id/read",
            post(mark_conversation_read),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(center: Uuid, parent: Uuid) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            center_id: center,
            student_id: Uuid::new_v4(),
            parent_user_id: parent,
            created_at: now,
            updated_at: now,
        }
    }

    fn session(role: ActorRole, user_id: Uuid, center_id: Option<Uuid>) -> SessionUser {
        SessionUser {
            user_id,
            role,
            center_id,
            student_id: None,
            teacher_id: None,
        }
    }

    #[test]
    fn parents_only_see_their_own_threads() {
        let parent = Uuid::new_v4();
        let conv = conversation(Uuid::new_v4(), parent);
        assert!(can_access_conversation(
            &session(ActorRole::Parent, parent, None),
            &conv
        ));
        assert!(!can_access_conversation(
            &session(ActorRole::Parent, Uuid::new_v4(), None),
            &conv
        ));
    }

    #[test]
    fn center_actors_are_scoped_to_their_center() {
        let center = Uuid::new_v4();
        let conv = conversation(center, Uuid::new_v4());
        assert!(can_access_conversation(
            &session(ActorRole::Center, Uuid::new_v4(), Some(center)),
            &conv
        ));
        assert!(can_access_conversation(
            &session(ActorRole::Principal, Uuid::new_v4(), Some(center)),
            &conv
        ));
        assert!(!can_access_conversation(
            &session(ActorRole::Center, Uuid::new_v4(), Some(Uuid::new_v4())),
            &conv
        ));
    }

    #[test]
    fn admins_see_everything_teachers_nothing() {
        let conv = conversation(Uuid::new_v4(), Uuid::new_v4());
        assert!(can_access_conversation(
            &session(ActorRole::Admin, Uuid::new_v4(), None),
            &conv
        ));
        assert!(!can_access_conversation(
            &session(ActorRole::Teacher, Uuid::new_v4(), None),
            &conv
        ));
    }
}
