diesel::table! {
    center_feature_permissions (id) {
        id -> Uuid,
        center_id -> Uuid,
        feature_name -> Varchar,
        is_enabled -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    teacher_feature_permissions (id) {
        id -> Uuid,
        teacher_id -> Uuid,
        feature_name -> Varchar,
        is_enabled -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(center_feature_permissions, teacher_feature_permissions);
