diesel::table! {
    meetings (id) {
        id -> Uuid,
        center_id -> Uuid,
        title -> Varchar,
        agenda -> Nullable<Text>,
        meeting_date -> Date,
        meeting_time -> Varchar,
        meeting_type -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    meeting_attendees (id) {
        id -> Uuid,
        meeting_id -> Uuid,
        student_id -> Nullable<Uuid>,
        teacher_id -> Nullable<Uuid>,
        user_id -> Nullable<Uuid>,
        attendance_status -> Varchar,
        attended -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(meeting_attendees -> meetings (meeting_id));

diesel::allow_tables_to_appear_in_same_query!(meetings, meeting_attendees);
