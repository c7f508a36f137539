//! Key encoding for the `RocksDB` column families.

use synapse_core::UserId;

/// Key for a user record or ledger.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Key in the email index. Emails compare case-insensitively.
#[must_use]
pub fn email_key(email: &str) -> Vec<u8> {
    email.trim().to_ascii_lowercase().into_bytes()
}

/// Key in the username index.
#[must_use]
pub fn username_key(username: &str) -> Vec<u8> {
    username.as_bytes().to_vec()
}

/// Key in the Stripe customer index.
#[must_use]
pub fn stripe_customer_key(customer_id: &str) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

/// Decode an index value back into a user ID.
///
/// Returns `None` if the value is not 16 bytes.
#[must_use]
pub fn decode_user_id(value: &[u8]) -> Option<UserId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(UserId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}
