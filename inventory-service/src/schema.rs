diesel::table! {
    reservations (id) {
        id -> Int8,
        order_id -> Int8,
        item_id -> Varchar,
        amount -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    stock (item_id) {
        item_id -> Varchar,
        amount -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(reservations -> stock (item_id));

diesel::allow_tables_to_appear_in_same_query!(
    reservations,
    stock,
);
