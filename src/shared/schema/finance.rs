diesel::table! {
    fee_structures (id) {
        id -> Uuid,
        center_id -> Uuid,
        name -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    fee_structure_items (id) {
        id -> Uuid,
        fee_structure_id -> Uuid,
        fee_heading -> Varchar,
        amount -> Numeric,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    student_fee_assignments (id) {
        id -> Uuid,
        student_id -> Uuid,
        fee_structure_id -> Uuid,
        is_active -> Bool,
        assigned_on -> Date,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    student_custom_fees (id) {
        id -> Uuid,
        student_id -> Uuid,
        fee_heading -> Varchar,
        amount -> Numeric,
        effective_from -> Date,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    invoices (id) {
        id -> Uuid,
        center_id -> Uuid,
        student_id -> Uuid,
        invoice_number -> Varchar,
        invoice_date -> Date,
        due_date -> Date,
        total_amount -> Numeric,
        paid_amount -> Numeric,
        remaining_amount -> Numeric,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    invoice_items (id) {
        id -> Uuid,
        invoice_id -> Uuid,
        fee_heading -> Varchar,
        amount -> Numeric,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        invoice_id -> Uuid,
        amount -> Numeric,
        payment_date -> Date,
        payment_method -> Varchar,
        reference_number -> Nullable<Varchar>,
        notes -> Nullable<Text>,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ledger_entries (id) {
        id -> Uuid,
        center_id -> Uuid,
        student_id -> Uuid,
        entry_type -> Varchar,
        reference_id -> Uuid,
        reference_table -> Varchar,
        amount -> Numeric,
        entry_date -> Date,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    invoice_generation_logs (id) {
        id -> Uuid,
        center_id -> Uuid,
        month -> Int4,
        year -> Int4,
        invoices_generated -> Int4,
        status -> Varchar,
        error_message -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(fee_structure_items -> fee_structures (fee_structure_id));
diesel::joinable!(student_fee_assignments -> fee_structures (fee_structure_id));
diesel::joinable!(invoice_items -> invoices (invoice_id));
diesel::joinable!(payments -> invoices (invoice_id));

diesel::allow_tables_to_appear_in_same_query!(
    fee_structures,
    fee_structure_items,
    student_fee_assignments,
    student_custom_fees,
    invoices,
    invoice_items,
    payments,
    ledger_entries,
    invoice_generation_logs,
);
