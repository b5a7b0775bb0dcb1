//! Deterministic address derivation for the simulated wallet.
//!
//! Addresses are derived by hashing the wallet seed with a pool tag and an index. They have
//! the encodings of real BitcoinZ addresses (Base58Check `t1` and Bech32 `zs`) but no key
//! material behind them.

use bech32::{Bech32, Hrp};
use sha2::{Digest, Sha256};

use bitcoinz_protocol::address::AddressKind;

use crate::error::{Error, Result};

/// The Base58Check version prefix of BitcoinZ mainnet P2PKH addresses.
pub const B58_PUBKEY_ADDRESS_PREFIX: [u8; 2] = [0x1c, 0xb8];

/// The Bech32 HRP of BitcoinZ mainnet Sapling addresses.
pub const HRP_SAPLING_PAYMENT_ADDRESS: &str = "zs";

fn derive(seed: &[u8; 32], tag: &[u8], index: u32, counter: u8) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"BitcoinZ_MemoryWallet");
    hasher.update(seed);
    hasher.update(tag);
    hasher.update(index.to_le_bytes());
    hasher.update([counter]);
    hasher.finalize().into()
}

fn encode_b58(prefix: [u8; 2], data: &[u8]) -> String {
    let mut decoded = Vec::with_capacity(2 + data.len());
    decoded.extend_from_slice(&prefix);
    decoded.extend_from_slice(data);
    bs58::encode(decoded).with_check().into_string()
}

fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| Error::Encoding(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Error::Encoding(e.to_string()))
}

/// Derives the `index`th address of the given kind from `seed`.
pub fn derive_address(seed: &[u8; 32], kind: AddressKind, index: u32) -> Result<String> {
    match kind {
        AddressKind::Transparent => {
            let hash = derive(seed, b"t", index, 0);
            Ok(encode_b58(B58_PUBKEY_ADDRESS_PREFIX, &hash[..20]))
        }
        AddressKind::Shielded => {
            // 11-byte diversifier followed by a 32-byte transmission key.
            let d = derive(seed, b"z", index, 0);
            let pk_d = derive(seed, b"z", index, 1);
            let mut raw = Vec::with_capacity(43);
            raw.extend_from_slice(&d[..11]);
            raw.extend_from_slice(&pk_d);
            encode_bech32(HRP_SAPLING_PAYMENT_ADDRESS, &raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoinz_protocol::address::{is_valid_address, AddressKind};

    use super::derive_address;

    #[test]
    fn derived_addresses_are_recognized() {
        let seed = [7u8; 32];
        for index in 0..20 {
            let t = derive_address(&seed, AddressKind::Transparent, index).unwrap();
            assert!(t.starts_with("t1"), "{t}");
            assert_eq!(AddressKind::detect(&t), Some(AddressKind::Transparent));

            let z = derive_address(&seed, AddressKind::Shielded, index).unwrap();
            assert!(z.starts_with("zs1"), "{z}");
            assert_eq!(z.len(), 78);
            assert!(is_valid_address(&z));
        }
    }

    #[test]
    fn derivation_is_deterministic_and_distinct() {
        let a = derive_address(&[1; 32], AddressKind::Shielded, 0).unwrap();
        assert_eq!(a, derive_address(&[1; 32], AddressKind::Shielded, 0).unwrap());
        assert_ne!(a, derive_address(&[1; 32], AddressKind::Shielded, 1).unwrap());
        assert_ne!(a, derive_address(&[2; 32], AddressKind::Shielded, 0).unwrap());
    }
}
