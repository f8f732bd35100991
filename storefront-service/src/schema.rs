diesel::table! {
    products (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Text,
        price -> Float8,
        size -> Array<Text>,
        category -> Varchar,
        image_url -> Varchar,
        stock -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    carts (user_id) {
        user_id -> Uuid,
        products -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    wishlists (user_id) {
        user_id -> Uuid,
        products -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Uuid,
        products -> Jsonb,
        total_price -> Float8,
        status -> Varchar,
        shipping_address -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    products,
    carts,
    wishlists,
    orders,
);
