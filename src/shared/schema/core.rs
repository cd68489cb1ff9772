diesel::table! {
    centers (id) {
        id -> Uuid,
        name -> Varchar,
        code -> Varchar,
        address -> Nullable<Text>,
        phone -> Nullable<Varchar>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Nullable<Varchar>,
        password_hash -> Varchar,
        role -> Varchar,
        display_name -> Nullable<Varchar>,
        center_id -> Nullable<Uuid>,
        student_id -> Nullable<Uuid>,
        teacher_id -> Nullable<Uuid>,
        is_active -> Bool,
        last_login -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    teachers (id) {
        id -> Uuid,
        center_id -> Uuid,
        first_name -> Varchar,
        last_name -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    students (id) {
        id -> Uuid,
        center_id -> Uuid,
        first_name -> Varchar,
        last_name -> Varchar,
        date_of_birth -> Nullable<Date>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    parent_students (id) {
        id -> Uuid,
        parent_user_id -> Uuid,
        student_id -> Uuid,
        relationship -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(users -> centers (center_id));
diesel::joinable!(teachers -> centers (center_id));
diesel::joinable!(students -> centers (center_id));
diesel::joinable!(parent_students -> students (student_id));
diesel::joinable!(parent_students -> users (parent_user_id));

diesel::allow_tables_to_appear_in_same_query!(centers, users, teachers, students, parent_students);
