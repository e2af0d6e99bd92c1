//! srcadmin core - shared types, error handling, and constants

pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;

pub use crypto::{PlaintextCipher, SecretCipher};
pub use error::{Error, Result};
pub use types::*;
