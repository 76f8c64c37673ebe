//! Token resolution.

use std::sync::Arc;

use crate::auth::salt::TokenSalt;
use crate::core::errors::VaultError;
use crate::storage::VaultStorageTrait;

/// Maps an opaque bearer token to the wallet it authorizes, via the salted
/// token directory. Read-only: resolution never mutates state.
pub struct TokenResolver {
    storage: Arc<dyn VaultStorageTrait>,
    salt: TokenSalt,
}

impl TokenResolver {
    pub fn new(storage: Arc<dyn VaultStorageTrait>) -> Self {
        let salt = TokenSalt::new(storage.clone());
        Self { storage, salt }
    }

    /// Salted digest for a token; used when issuing tokens so only the
    /// digest is ever written to the directory.
    pub async fn salt_id(&self, token: &str) -> Result<String, VaultError> {
        self.salt.salt_id(token).await
    }

    /// Resolve a token to its wallet name. `Ok(None)` means the token is
    /// unknown — a legitimate outcome, distinct from storage failure.
    pub async fn resolve(&self, token: &str) -> Result<Option<String>, VaultError> {
        if token.is_empty() {
            return Err(VaultError::InvalidInput("missing auth token".to_string()));
        }

        let salted_id = self.salt.salt_id(token).await?;
        self.storage.lookup_token(&salted_id).await
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
    async fn test_empty_token_is_invalid_input() {
        let resolver = TokenResolver::new(memory_storage().await);
        let err = resolver.resolve("").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_token_resolves_to_none() {
        let resolver = TokenResolver::new(memory_storage().await);
        assert!(resolver.resolve("no-such-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_issued_token_resolves_to_wallet() {
        let storage = memory_storage().await;
        storage.store_wallet("w1", b"0123456789abcdef").await.unwrap();

        let resolver = TokenResolver::new(storage.clone());
        let salted_id = resolver.salt_id("secret-token").await.unwrap();
        storage.store_token(&salted_id, "w1").await.unwrap();

        assert_eq!(resolver.resolve("secret-token").await.unwrap().as_deref(), Some("w1"));
    }
}
