diesel::table! {
    orders (id) {
        id -> Int8,
        owner_id -> Int8,
        item -> Varchar,
        price -> Int8,
        status -> Varchar,
        reservation_id -> Nullable<Int8>,
        delivery_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
