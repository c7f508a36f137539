//! Column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User records, keyed by `user_id`.
    pub const USERS: &str = "users";

    /// Credit ledgers, keyed by owner `user_id`.
    pub const LEDGERS: &str = "ledgers";

    /// Index: lowercase email to `user_id`.
    pub const USERS_BY_EMAIL: &str = "users_by_email";

    /// Index: username to `user_id`.
    pub const USERS_BY_USERNAME: &str = "users_by_username";

    /// Index: Stripe customer ID to `user_id`.
    pub const USERS_BY_STRIPE_CUSTOMER: &str = "users_by_stripe_customer";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::USERS,
        cf::LEDGERS,
        cf::USERS_BY_EMAIL,
        cf::USERS_BY_USERNAME,
        cf::USERS_BY_STRIPE_CUSTOMER,
    ]
}
