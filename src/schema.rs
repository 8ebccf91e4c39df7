// Table definitions mirrored by `crate::config::ensure_schema`.

diesel::table! {
    routers (name) {
        name -> Text,
        definition -> Text,
        dimension -> Integer,
    }
}

diesel::table! {
    route_references (id) {
        id -> Integer,
        router_name -> Text,
        route_name -> Text,
        reference_hash -> Text,
        reference -> Text,
        embedding -> Binary,
    }
}

diesel::table! {
    messages (id) {
        id -> Integer,
        history_name -> Text,
        session_tag -> Text,
        role -> Text,
        content -> Text,
        intent -> Nullable<Text>,
        score -> Nullable<Double>,
        created_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(routers, route_references, messages,);
