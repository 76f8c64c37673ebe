//! Address allocation protocol core.
//!
//! Each call consumes exactly one child index for the authorized wallet:
//! authorize the token, read the last allocated index, derive the next
//! address, persist the advanced record, respond. The name is "allocate",
//! not "peek" — a successful call always advances durable state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::auth::TokenResolver;
use crate::core::config::DerivationConfig;
use crate::core::derivation::{derive_receive_address, ReceivePath};
use crate::core::errors::VaultError;
use crate::storage::{AllocationRecord, VaultStorageTrait};

/// A successful allocation: the freshly derived address and the child index
/// it was derived at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub address: String,
    pub child_index: u32,
}

pub struct AddressAllocator {
    storage: Arc<dyn VaultStorageTrait>,
    resolver: TokenResolver,
    derivation: DerivationConfig,
    /// One async mutex per wallet name. Same-wallet allocations serialize on
    /// it for the whole read-derive-write region; different wallets do not
    /// block each other.
    wallet_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AddressAllocator {
    pub fn new(storage: Arc<dyn VaultStorageTrait>, derivation: DerivationConfig) -> Self {
        let resolver = TokenResolver::new(storage.clone());
        Self { storage, resolver, derivation, wallet_locks: Mutex::new(HashMap::new()) }
    }

    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    fn wallet_lock(&self, wallet_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.wallet_locks.lock();
        locks.entry(wallet_name.to_string()).or_default().clone()
    }

    /// Allocate the next receiving address for `wallet_name`.
    ///
    /// The token must resolve to exactly this wallet. On success the
    /// advanced counter record is durable before the address is returned; a
    /// failed persist means the allocation did not happen and the same index
    /// will be handed out on the next successful call.
    pub async fn allocate(
        &self,
        wallet_name: &str,
        token: &str,
    ) -> Result<Allocation, VaultError> {
        // 1. Authenticate. Unknown token and token-for-another-wallet are
        // indistinguishable to the caller.
        let resolved = match self.resolver.resolve(token).await? {
            Some(name) => name,
            None => {
                debug!("allocation rejected: unknown token");
                return Err(VaultError::Unauthorized);
            }
        };
        if resolved != wallet_name {
            warn!(wallet = %wallet_name, "allocation rejected: token is bound to a different wallet");
            return Err(VaultError::Unauthorized);
        }

        // 2. Load master seed. A resolvable token pointing at a missing
        // wallet is a server-side inconsistency, not a caller mistake.
        let seed = match self.storage.load_wallet(wallet_name).await? {
            Some(seed) => seed,
            None => {
                error!(wallet = %wallet_name, "token resolved to a wallet that no longer exists");
                return Err(VaultError::WalletNotFound(wallet_name.to_string()));
            }
        };

        // 3.-5. Read-derive-write is a critical section per wallet name; two
        // concurrent callers must never observe the same prior index.
        let lock = self.wallet_lock(wallet_name);
        let _guard = lock.lock().await;

        let next_index = match self.storage.load_allocation(wallet_name).await? {
            None => 0,
            Some(prior) => prior.child_index.checked_add(1).ok_or_else(|| {
                VaultError::Derivation(format!(
                    "child index space exhausted for wallet {}",
                    wallet_name
                ))
            })?,
        };

        let path = ReceivePath {
            coin_type: self.derivation.coin_type,
            account: self.derivation.account,
            index: next_index,
        };
        let address = derive_receive_address(&seed, &path)?;

        let record = AllocationRecord { child_index: next_index, last_address: address.clone() };
        self.storage.store_allocation(wallet_name, &record).await?;

        debug!(wallet = %wallet_name, child_index = next_index, "allocated receiving address");
        Ok(Allocation { address, child_index: next_index })
    }
}
