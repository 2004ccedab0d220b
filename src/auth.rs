//! Auth-domain models: credentials, redacted secrets, access tokens, and the token manager.

pub mod credential;
pub mod manager;
pub mod secret;
pub mod token;

pub use credential::*;
pub use manager::*;
pub use secret::*;
pub use token::*;
