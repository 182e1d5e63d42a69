//! Bearer credentials granting a worker access to one job.
//!
//! Tokens are 32 random bytes from the OS RNG, hex encoded, and recorded in
//! the shared `access_tokens` store until revoked.

use chrono::Utc;

use crate::db::{token_repo, Database};
use crate::error::Result;

/// Number of random bytes in a token.
const TOKEN_BYTES: usize = 32;

/// Issues a new token for `user_id` and records it.
pub fn issue(db: &Database, user_id: i64) -> Result<String> {
    let token = hex::encode(random_bytes::<TOKEN_BYTES>()?);
    token_repo::insert(db, &token, user_id, Utc::now().timestamp())?;
    log::debug!(
        "Issued access token {} for user {}",
        crate::sanitize::redact_token(&token),
        user_id
    );
    Ok(token)
}

/// Revokes a token. Returns false if it was not recorded.
pub fn revoke(db: &Database, token: &str) -> Result<bool> {
    Ok(token_repo::delete(db, token)? > 0)
}

/// Checks whether a token is still recorded.
pub fn is_active(db: &Database, token: &str) -> Result<bool> {
    Ok(token_repo::exists(db, token)?)
}

/// Fills `N` bytes from the OS RNG.
pub(crate) fn random_bytes<const N: usize>() -> std::result::Result<[u8; N], getrandom::Error> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)?;
    Ok(bytes)
}
