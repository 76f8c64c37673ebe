//! HTTP handlers.

use axum::{
    extract::{Path, State},
    response::Json,
};
use bip39::Mnemonic;
use rand::RngCore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::server::VaultServer;
use crate::api::types::*;
use crate::api::validators::validate_wallet_name;
use crate::core::errors::VaultError;

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create a named wallet. Generates a BIP39 mnemonic, persists the derived
/// seed and returns the mnemonic exactly once.
pub async fn create_wallet(
    State(state): State<Arc<VaultServer>>,
    Json(request): Json<CreateWalletRequest>,
) -> Result<Json<WalletResponse>, VaultError> {
    validate_wallet_name(&request.name)?;

    let entropy_len = match request.mnemonic_word_count {
        12 => 16,
        24 => 32,
        other => {
            return Err(VaultError::InvalidInput(format!(
                "mnemonic word count must be 12 or 24, got {}",
                other
            )))
        }
    };

    let mut entropy = vec![0u8; entropy_len];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| VaultError::Derivation(format!("mnemonic generation failed: {}", e)))?;
    let seed = mnemonic.to_seed("");

    state.storage.store_wallet(&request.name, &seed).await?;

    info!(wallet = %request.name, "wallet created");
    Ok(Json(WalletResponse { name: request.name, mnemonic: mnemonic.to_string() }))
}

/// Issue a bearer token for a wallet. The plaintext token is returned once;
/// only its salted digest enters the directory.
pub async fn issue_token(
    State(state): State<Arc<VaultServer>>,
    Path(name): Path<String>,
) -> Result<Json<TokenResponse>, VaultError> {
    validate_wallet_name(&name)?;

    if state.storage.load_wallet(&name).await?.is_none() {
        return Err(VaultError::InvalidInput(format!("unknown wallet '{}'", name)));
    }

    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = hex::encode(raw);

    let salted_id = state.allocator.resolver().salt_id(&token).await?;
    state.storage.store_token(&salted_id, &name).await?;

    info!(wallet = %name, "token issued");
    Ok(Json(TokenResponse { wallet: name, token }))
}

/// Allocate the next receiving address for a wallet. Each successful call
/// advances the wallet's durable counter by exactly one.
pub async fn allocate_address(
    State(state): State<Arc<VaultServer>>,
    Path(name): Path<String>,
    Json(request): Json<AllocateAddressRequest>,
) -> Result<Json<AllocateAddressResponse>, VaultError> {
    validate_wallet_name(&name)?;

    let allocation = state.allocator.allocate(&name, &request.token).await?;
    Ok(Json(AllocateAddressResponse {
        address: allocation.address,
        child_index: allocation.child_index,
    }))
}
