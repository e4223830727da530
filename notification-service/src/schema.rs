diesel::table! {
    notifications (id) {
        id -> Int8,
        order_id -> Int8,
        recipient -> Varchar,
        message -> Varchar,
        created_at -> Timestamptz,
    }
}
