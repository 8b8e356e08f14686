// Diesel table definitions; kept in sync with `DieselDbContext::init_schema`.

diesel::table! {
    products (id, site) {
        id -> Text,
        site -> Text,
        name -> Text,
        url -> Text,
        price -> Double,
        first_seen_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    price_history (id) {
        id -> Integer,
        product_id -> Text,
        site -> Text,
        price -> Double,
        recorded_at -> Text,
    }
}

diesel::table! {
    category_links (url) {
        url -> Text,
        site -> Text,
        discovered_at -> Text,
    }
}

diesel::table! {
    page_links (url) {
        url -> Text,
        category_url -> Nullable<Text>,
        site -> Text,
        discovered_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(category_links, page_links, price_history, products,);
