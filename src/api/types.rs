use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreateWalletRequest {
    /// Wallet name (alphanumeric, underscores, hyphens; unique)
    pub name: String,
    /// Mnemonic word count (12 or 24, default 12)
    #[serde(default = "default_mnemonic_word_count")]
    pub mnemonic_word_count: u32,
}

fn default_mnemonic_word_count() -> u32 {
    12
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub name: String,
    /// Returned exactly once at creation; never stored in plaintext form
    /// other than the derived seed, never returned again.
    pub mnemonic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub wallet: String,
    /// Returned exactly once; only its salted digest is persisted.
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AllocateAddressRequest {
    /// Bearer token authorizing allocation for the wallet in the path
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateAddressResponse {
    /// Freshly derived receiving address
    pub address: String,
    /// Child index the address was derived at
    pub child_index: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
