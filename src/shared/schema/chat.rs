diesel::table! {
    chat_conversations (id) {
        id -> Uuid,
        center_id -> Uuid,
        student_id -> Uuid,
        parent_user_id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    chat_messages (id) {
        id -> Uuid,
        conversation_id -> Uuid,
        sender_user_id -> Uuid,
        body -> Text,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(chat_messages -> chat_conversations (conversation_id));

diesel::allow_tables_to_appear_in_same_query!(chat_conversations, chat_messages);
