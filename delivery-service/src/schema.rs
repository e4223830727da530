diesel::table! {
    couriers (id) {
        id -> Int8,
        name -> Varchar,
        is_on_shift -> Bool,
    }
}

diesel::table! {
    deliveries (id) {
        id -> Int8,
        order_id -> Int8,
        courier_id -> Int8,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(deliveries -> couriers (courier_id));

diesel::allow_tables_to_appear_in_same_query!(
    couriers,
    deliveries,
);
