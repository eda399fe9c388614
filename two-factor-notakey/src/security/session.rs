//! Login flow token generation.
//!
//! A flow token binds status polls to the login flow that created the push
//! request. Tokens are handed to the browser and presented on every poll.
//!
//! ## Format
//!
//! `{prefix}-{timestamp_hex}-{random_hex}`
//!
//! Example: `ntk-18d4f2a3b4c-a7f3e2d1c0b9a8f7a7f3e2d1c0b9a8f7`
//!
//! - `prefix`: identifies the token kind
//! - `timestamp_hex`: nanosecond timestamp, for ordering in logs
//! - `random_hex`: 128 bits of CSPRNG output

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TwoFactorError;

/// Prefix of login flow tokens.
pub const FLOW_TOKEN_PREFIX: &str = "ntk";

const RANDOM_BYTES: usize = 16;

/// Generate an unpredictable login flow token.
///
/// Fails only if the operating system cannot supply secure randomness, in
/// which case no login flow should be started.
pub fn generate_flow_token() -> Result<String, TwoFactorError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut bytes = [0u8; RANDOM_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| {
        TwoFactorError::Configuration(format!("secure random number generation failed: {}", e))
    })?;

    Ok(format!(
        "{}-{:x}-{}",
        FLOW_TOKEN_PREFIX,
        timestamp,
        hex_encode(&bytes)
    ))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Check that a presented token is shaped like one we issue.
pub fn is_valid_flow_token(token: &str) -> bool {
    let parts: Vec<&str> = token.split('-').collect();
    let [prefix, timestamp, random] = parts.as_slice() else {
        return false;
    };

    *prefix == FLOW_TOKEN_PREFIX
        && !timestamp.is_empty()
        && timestamp.chars().all(|c| c.is_ascii_hexdigit())
        && random.len() == RANDOM_BYTES * 2
        && random.chars().all(|c| c.is_ascii_hexdigit())
}
