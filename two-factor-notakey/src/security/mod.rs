//! Security helpers for the login flow.
//!
//! - Flow token generation with cryptographic randomness
//! - Constant-time comparison of caller-supplied identifiers

pub mod session;

pub use session::{generate_flow_token, is_valid_flow_token};

use subtle::ConstantTimeEq;

/// Compare two identifiers without leaking the length of a common prefix.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
