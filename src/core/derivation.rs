//! HD receiving-address derivation
//!
//! BIP32-style child derivation from a master seed, addresses encoded as
//! Bitcoin P2PKH. Derivation is a pure function of (seed, path): no state,
//! no randomness, so a given child index always reproduces the same address.

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, Network, PublicKey as BitcoinPublicKey};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::core::errors::VaultError;

type HmacSha512 = Hmac<Sha512>;

const HARDENED: u32 = 0x8000_0000;

/// Receiving-chain derivation path: m/44'/coin_type'/account'/0/index
#[derive(Debug, Clone)]
pub struct ReceivePath {
    /// Cryptocurrency type (0 = BTC)
    pub coin_type: u32,
    /// Account index
    pub account: u32,
    /// Address index on the external chain
    pub index: u32,
}

impl ReceivePath {
    pub fn to_derivation_path(&self) -> Vec<u32> {
        vec![
            HARDENED | 44,              // purpose (hardened)
            HARDENED | self.coin_type,  // coin_type (hardened)
            HARDENED | self.account,    // account (hardened)
            0,                          // external chain
            self.index,
        ]
    }
}

/// BIP32 key derivation engine
#[derive(Debug)]
pub struct Bip32 {
    chain_code: [u8; 32],
    key: Zeroizing<Vec<u8>>,
}

impl Bip32 {
    /// Create master key from a BIP39 seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, VaultError> {
        if seed.len() < 16 {
            return Err(VaultError::Derivation(
                "seed length must be at least 16 bytes".to_string(),
            ));
        }

        // HMAC-SHA512("Bitcoin seed", seed)
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| VaultError::Derivation(format!("HMAC initialization failed: {}", e)))?;
        mac.update(seed);
        let result = mac.finalize().into_bytes();

        // First 32 bytes are the private key, last 32 bytes the chain code
        let mut key = vec![0u8; 32];
        key.copy_from_slice(&result[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..]);

        Ok(Self { chain_code, key: Zeroizing::new(key) })
    }

    /// Derive one child key
    pub fn derive_child(&self, index: u32) -> Result<Self, VaultError> {
        // 0x00 || private_key || index
        let mut data = Vec::with_capacity(37);
        data.push(0x00);
        data.extend_from_slice(&self.key);
        data.extend_from_slice(&index.to_be_bytes());

        // HMAC-SHA512(chain_code, data)
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| VaultError::Derivation(format!("HMAC initialization failed: {}", e)))?;
        mac.update(&data);
        let result = mac.finalize().into_bytes();

        let mut derived_key = vec![0u8; 32];
        derived_key.copy_from_slice(&result[..32]);
        let mut derived_chain_code = [0u8; 32];
        derived_chain_code.copy_from_slice(&result[32..]);

        Ok(Self { chain_code: derived_chain_code, key: Zeroizing::new(derived_key) })
    }

    /// Derive along a full receiving path
    pub fn derive_path(&self, path: &ReceivePath) -> Result<Self, VaultError> {
        let mut current = Self { chain_code: self.chain_code, key: self.key.clone() };
        for index in path.to_derivation_path() {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }

    /// Private key bytes of this node
    pub fn private_key(&self) -> &[u8] {
        &self.key
    }
}

/// Derive the P2PKH receiving address for `path` from a master seed.
pub fn derive_receive_address(seed: &[u8], path: &ReceivePath) -> Result<String, VaultError> {
    let child = Bip32::from_seed(seed)?.derive_path(path)?;

    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(child.private_key())
        .map_err(|e| VaultError::Derivation(format!("invalid child key: {}", e)))?;
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);

    let address = Address::p2pkh(&BitcoinPublicKey::new(public_key), Network::Bitcoin);
    Ok(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(index: u32) -> ReceivePath {
        ReceivePath { coin_type: 0, account: 0, index }
    }

    #[test]
    fn test_master_key_from_seed() {
        let seed = [1u8; 64];
        let master = Bip32::from_seed(&seed).unwrap();
        assert_eq!(master.private_key().len(), 32);
    }

    #[test]
    fn test_seed_too_short() {
        let result = Bip32::from_seed(&[1u8; 8]);
        assert!(matches!(result.unwrap_err(), VaultError::Derivation(_)));
    }

    #[test]
    fn test_child_differs_from_parent() {
        let master = Bip32::from_seed(&[1u8; 64]).unwrap();
        let child = master.derive_child(HARDENED).unwrap();
        assert_ne!(child.private_key(), master.private_key());
    }

    #[test]
    fn test_receive_path_indices() {
        let indices = path(7).to_derivation_path();
        assert_eq!(indices.len(), 5);
        assert_eq!(indices[0], 0x8000002C); // 44'
        assert_eq!(indices[1], 0x80000000); // 0'
        assert_eq!(indices[2], 0x80000000); // 0'
        assert_eq!(indices[3], 0);
        assert_eq!(indices[4], 7);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = [42u8; 64];
        let a = derive_receive_address(&seed, &path(3)).unwrap();
        let b = derive_receive_address(&seed, &path(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_indices_give_distinct_addresses() {
        let seed = [42u8; 64];
        let mut addresses: Vec<String> =
            (0..5).map(|i| derive_receive_address(&seed, &path(i)).unwrap()).collect();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 5);
    }

    #[test]
    fn test_address_looks_like_p2pkh() {
        let seed = [9u8; 64];
        let address = derive_receive_address(&seed, &path(0)).unwrap();
        assert!(address.starts_with('1'));
    }
}
