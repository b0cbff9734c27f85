use diesel::{allow_tables_to_appear_in_same_query, table};

table! {
    users (id) {
        id -> BigInt,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        first_name -> Text,
        last_name -> Nullable<Text>,
        user_type -> Text,
        language -> Text,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    platform_bindings (id) {
        id -> BigInt,
        user_id -> BigInt,
        channel -> Text,
        address -> Text,
        username -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    user_preferences (user_id) {
        user_id -> BigInt,
        interests -> Jsonb,
        education_level -> Nullable<Text>,
        field_of_study -> Nullable<Text>,
        location -> Nullable<Text>,
        cadence -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    opportunities (id) {
        id -> BigInt,
        title -> Text,
        description -> Text,
        kind -> Text,
        organization -> Text,
        url -> Nullable<Text>,
        deadline -> Nullable<Timestamptz>,
        location -> Nullable<Text>,
        language -> Text,
        tags -> Jsonb,
        requirements -> Jsonb,
        benefits -> Jsonb,
        status -> Text,
        created_by -> BigInt,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    subscriptions (id) {
        id -> BigInt,
        user_id -> BigInt,
        opportunity_id -> BigInt,
        status -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    deliveries (id) {
        id -> BigInt,
        user_id -> BigInt,
        opportunity_id -> Nullable<BigInt>,
        channel -> Text,
        message -> Text,
        status -> Text,
        read -> Bool,
        sent_at -> Timestamptz,
    }
}

allow_tables_to_appear_in_same_query!(
    users,
    platform_bindings,
    user_preferences,
    opportunities,
    subscriptions,
    deliveries,
);
