//! Push approval for the second login factor.
//!
//! [`AuthRequestLifecycle`] creates one remote request per login attempt and
//! advances it on every status poll until it reaches a terminal
//! [`AuthState`].

pub mod lifecycle;
pub mod request;

pub use lifecycle::{AuthRequestLifecycle, RequestTemplate};
pub use request::{AuthRequest, AuthState};
