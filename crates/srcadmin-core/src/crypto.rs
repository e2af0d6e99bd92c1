//! Secret-cipher contract for the admin-channel password
//!
//! Instances persist their admin secret encrypted; the manager unseals it
//! just before argv construction. The actual cipher (OS keyring, DPAPI, ...)
//! is a collaborator concern and injected at daemon startup.

use crate::error::Result;

/// Seals and unseals the per-instance admin secret.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Passthrough cipher: stores secrets as-is.
pub struct PlaintextCipher;

impl SecretCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        Ok(ciphertext.to_string())
    }
}
