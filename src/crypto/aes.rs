//! AES-CBC encryption and AES-CMAC, for AES-flavoured PACE/secure-messaging
//! sessions. 3DES sessions use [`crate::crypto::des`] instead.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{
    block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use cipher::BlockEncrypt;
use cmac::{Cmac, Mac};

use crate::error::{Error, Result};

/// AES block size in bytes, and the CBC IV size for all AES key lengths.
pub const BLOCK_SIZE: usize = 16;

macro_rules! aes_variant {
    ($name_enc:ident, $name_dec:ident, $cipher:ty) => {
        fn $name_enc(key: &[u8], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
            cbc::Encryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|e| Error::Crypto(format!("AES-CBC key/iv: {e}")))?
                .encrypt_padded_mut::<NoPadding>(data, data.len())
                .map_err(|e| Error::Crypto(format!("AES-CBC encrypt: {e}")))?;
            Ok(())
        }

        fn $name_dec(key: &[u8], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
            cbc::Decryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|e| Error::Crypto(format!("AES-CBC key/iv: {e}")))?
                .decrypt_padded_mut::<NoPadding>(data)
                .map_err(|e| Error::Crypto(format!("AES-CBC decrypt: {e}")))?;
            Ok(())
        }
    };
}

aes_variant!(enc_cbc_128, dec_cbc_128, Aes128);
aes_variant!(enc_cbc_192, dec_cbc_192, Aes192);
aes_variant!(enc_cbc_256, dec_cbc_256, Aes256);

/// Encrypt `data` in place under AES-CBC with no padding (`data.len()` must
/// already be a multiple of [`BLOCK_SIZE`]). `key` selects AES-128/192/256
/// by its length.
pub fn enc_cbc(key: &[u8], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
    match key.len() {
        16 => enc_cbc_128(key, iv, data),
        24 => enc_cbc_192(key, iv, data),
        32 => enc_cbc_256(key, iv, data),
        n => Err(Error::Crypto(format!("unsupported AES key length {n}"))),
    }
}

/// Decrypt `data` in place under AES-CBC with no padding.
pub fn dec_cbc(key: &[u8], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
    match key.len() {
        16 => dec_cbc_128(key, iv, data),
        24 => dec_cbc_192(key, iv, data),
        32 => dec_cbc_256(key, iv, data),
        n => Err(Error::Crypto(format!("unsupported AES key length {n}"))),
    }
}

/// Encrypt a single 16-byte block under AES-ECB (used to build secure
/// messaging CBC "initial chaining vectors" from the SSC, §4.4).
pub fn encrypt_block(key: &[u8], block: &[u8; 16]) -> Result<[u8; 16]> {
    let mut generic = (*block).into();
    match key.len() {
        16 => Aes128::new_from_slice(key)
            .map_err(|e| Error::Crypto(e.to_string()))?
            .encrypt_block(&mut generic),
        24 => Aes192::new_from_slice(key)
            .map_err(|e| Error::Crypto(e.to_string()))?
            .encrypt_block(&mut generic),
        32 => Aes256::new_from_slice(key)
            .map_err(|e| Error::Crypto(e.to_string()))?
            .encrypt_block(&mut generic),
        n => return Err(Error::Crypto(format!("unsupported AES key length {n}"))),
    }
    Ok(generic.into())
}

/// AES-CMAC over `data`, returning the full 16-byte tag. Callers truncate to
/// 8 bytes for secure-messaging/authentication tokens where §4.1 calls for
/// truncation, and keep all 16 where a full tag is specified.
pub fn cmac_full(key: &[u8], data: &[u8]) -> Result<[u8; 16]> {
    fn run<C: cipher::BlockCipher + cipher::BlockEncrypt + KeyInit>(
        key: &[u8],
        data: &[u8],
    ) -> Result<[u8; 16]> {
        let mut mac = Cmac::<C>::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }
    match key.len() {
        16 => run::<Aes128>(key, data),
        24 => run::<Aes192>(key, data),
        32 => run::<Aes256>(key, data),
        n => Err(Error::Crypto(format!("unsupported AES key length {n}"))),
    }
}

/// AES-CMAC truncated to 8 bytes, as used for secure-messaging DO `0x8E`
/// and PACE authentication tokens (§4.1).
pub fn cmac_trunc8(key: &[u8], data: &[u8]) -> Result<[u8; 8]> {
    let full = cmac_full(key, data)?;
    Ok(full[..8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_cmac_rfc4493_vectors() {
        // NIST/RFC 4493 AES-128-CMAC test vectors.
        let key: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let empty = cmac_full(&key, b"").unwrap();
        assert_eq!(empty, hex!("bb1d6929e95937287fa37d129b756746"));

        let m16: [u8; 16] = hex!("6bc1bee22e409f96e93d7e117393172a");
        let mac16 = cmac_full(&key, &m16).unwrap();
        assert_eq!(mac16, hex!("070a16b46b4d4144f79bdd9dd04a287c"));
    }

    #[test]
    fn test_cbc_roundtrip() {
        let key = [0x11u8; 16];
        let iv = [0u8; 16];
        let mut data = [0x42u8; 32];
        enc_cbc(&key, &iv, &mut data).unwrap();
        dec_cbc(&key, &iv, &mut data).unwrap();
        assert_eq!(data, [0x42u8; 32]);
    }
}
