//! Key derivation per ICAO 9303-11 §9.7.1: `KDF(K, c) = H(K || c)`, with `H`
//! and the output length chosen by the target cipher/key length.

use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::des::set_parity_bits;
use crate::error::{Error, Result};

/// KDF counter values (§4.1).
pub mod counter {
    pub const ENC: u32 = 1;
    pub const MAC: u32 = 2;
    pub const PACE_PASSWORD: u32 = 3;
}

/// Cipher family a derived key will be used with; determines both the
/// digest and the output truncation/parity-fixup rules (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlg {
    /// 3DES, 112-bit effective strength (two-key 3DES), SHA-1-derived.
    Tdes112,
    Aes128,
    Aes192,
    Aes256,
}

impl CipherAlg {
    /// Size in bytes of the key this cipher expects.
    pub fn key_len(self) -> usize {
        match self {
            CipherAlg::Tdes112 => 16,
            CipherAlg::Aes128 => 16,
            CipherAlg::Aes192 => 24,
            CipherAlg::Aes256 => 32,
        }
    }

    /// Block size in bytes for secure-messaging purposes.
    pub fn block_size(self) -> usize {
        match self {
            CipherAlg::Tdes112 => 8,
            CipherAlg::Aes128 | CipherAlg::Aes192 | CipherAlg::Aes256 => 16,
        }
    }
}

/// `KDF(key_seed, counter)` truncated/adjusted for `cipher` per §4.1:
/// SHA-1 for 3DES-112 and PACE-password-from-MRZ; SHA-1 (truncated to 16
/// bytes) for AES-128; SHA-256 for AES-192/256. 3DES output additionally
/// has its parity bits fixed.
pub fn derive(key_seed: &[u8], counter: u32, cipher: CipherAlg) -> Result<Vec<u8>> {
    let out_len = cipher.key_len();
    let digest = match cipher {
        CipherAlg::Tdes112 | CipherAlg::Aes128 => {
            let mut hasher = Sha1::new();
            hasher.update(key_seed);
            hasher.update(counter.to_be_bytes());
            hasher.finalize().to_vec()
        }
        CipherAlg::Aes192 | CipherAlg::Aes256 => {
            let mut hasher = Sha256::new();
            hasher.update(key_seed);
            hasher.update(counter.to_be_bytes());
            hasher.finalize().to_vec()
        }
    };

    if digest.len() < out_len {
        return Err(Error::Crypto(format!(
            "KDF digest ({} bytes) shorter than requested key length ({out_len})",
            digest.len()
        )));
    }
    let mut key = digest[..out_len].to_vec();
    if cipher == CipherAlg::Tdes112 {
        set_parity_bits(&mut key);
    }
    Ok(key)
}

/// Derive the BAC/PACE session `(k_enc, k_mac)` pair from a 16-byte seed,
/// per §4.1/§4.6 step 2.
pub fn derive_session_keys(key_seed: &[u8], cipher: CipherAlg) -> Result<(Vec<u8>, Vec<u8>)> {
    let k_enc = derive(key_seed, counter::ENC, cipher)?;
    let k_mac = derive(key_seed, counter::MAC, cipher)?;
    Ok((k_enc, k_mac))
}

/// Derive the static PACE password key `K_pi = KDF(seed, PACE_CONST)`
/// (§4.1/§4.7).
pub fn derive_pace_key(seed: &[u8], cipher: CipherAlg) -> Result<Vec<u8>> {
    derive(seed, counter::PACE_PASSWORD, cipher)
}
