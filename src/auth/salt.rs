//! Durable token salt.
//!
//! Tokens are never stored in plaintext; the directory is keyed by
//! HMAC-SHA256(salt, token). The salt is generated once, persisted in
//! storage metadata and reloaded on restart — losing it would make every
//! issued token unresolvable.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::core::errors::VaultError;
use crate::storage::VaultStorageTrait;

type HmacSha256 = Hmac<Sha256>;

const SALT_META_KEY: &str = "token_salt";
const SALT_LEN: usize = 32;

pub struct TokenSalt {
    storage: Arc<dyn VaultStorageTrait>,
    salt: OnceCell<Vec<u8>>,
}

impl TokenSalt {
    pub fn new(storage: Arc<dyn VaultStorageTrait>) -> Self {
        Self { storage, salt: OnceCell::new() }
    }

    /// Lazily load the salt, generating and persisting it on first use.
    async fn salt(&self) -> Result<&[u8], VaultError> {
        self.salt
            .get_or_try_init(|| async {
                if let Some(hex_salt) = self.storage.load_meta(SALT_META_KEY).await? {
                    return hex::decode(&hex_salt).map_err(|e| {
                        VaultError::CorruptState("token_salt".to_string(), e.to_string())
                    });
                }

                let mut salt = vec![0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                self.storage.store_meta(SALT_META_KEY, &hex::encode(&salt)).await?;
                info!("Generated new token salt");
                Ok(salt)
            })
            .await
            .map(|s| s.as_slice())
    }

    /// Salted digest of a token, used as the directory lookup key.
    pub async fn salt_id(&self, token: &str) -> Result<String, VaultError> {
        let salt = self.salt().await?;
        let mut mac = HmacSha256::new_from_slice(salt)
            .map_err(|e| VaultError::Derivation(format!("HMAC initialization failed: {}", e)))?;
        mac.update(token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VaultStorage;

    async fn memory_storage() -> Arc<dyn VaultStorageTrait> {
        Arc::new(VaultStorage::new_with_url("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_salt_id_is_deterministic() {
        let storage = memory_storage().await;
        let salt = TokenSalt::new(storage);

        let a = salt.salt_id("secret-token").await.unwrap();
        let b = salt.salt_id("secret-token").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, salt.salt_id("other-token").await.unwrap());
    }

    #[tokio::test]
    async fn test_digest_does_not_contain_token() {
        let storage = memory_storage().await;
        let salt = TokenSalt::new(storage);

        let id = salt.salt_id("secret-token").await.unwrap();
        assert!(!id.contains("secret-token"));
        assert_eq!(id.len(), 64); // hex SHA-256 output
    }

    #[tokio::test]
    async fn test_salt_survives_restart() {
        let storage = memory_storage().await;

        let first = TokenSalt::new(storage.clone());
        let before = first.salt_id("secret-token").await.unwrap();

        // a fresh instance over the same storage must resolve identically
        let second = TokenSalt::new(storage);
        let after = second.salt_id("secret-token").await.unwrap();
        assert_eq!(before, after);
    }
}
