diesel::table! {
    accounts (id) {
        id -> Int8,
        user_id -> Int8,
        balance -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Int8,
        order_id -> Int8,
        user_id -> Int8,
        amount -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(accounts, payments);
