diesel::table! {
    payment_intents (id) {
        id -> Integer,
        transaction_id -> Text,
        user_id -> Text,
        amount -> BigInt,
        currency -> Text,
        status -> Text,
        payment_method -> Text,
        external_id -> Nullable<Text>,
        metadata -> Text,
        provider_payload -> Nullable<Text>,
        created_at -> BigInt,
        completed_at -> Nullable<BigInt>,
    }
}

diesel::table! {
    wallet_balances (id) {
        id -> Integer,
        user_id -> Text,
        balance -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(payment_intents, wallet_balances);
