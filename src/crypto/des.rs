//! 3DES-CBC encryption and the ISO/IEC 9797-1 Algorithm 3 "retail" MAC.
//!
//! Both BAC and 3DES-flavoured PACE/secure-messaging sessions use these two
//! primitives exclusively; AES sessions use [`crate::crypto::aes`] instead.

use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::{
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit},
    Des, TdesEde3,
};

use crate::error::{Error, Result};

type TdesCbcEnc = cbc::Encryptor<TdesEde3>;
type TdesCbcDec = cbc::Decryptor<TdesEde3>;

/// 3DES block size in bytes.
pub const BLOCK_SIZE: usize = 8;

/// Encrypt `data` in place under 3DES-CBC with a zero IV. `data.len()` must
/// be a multiple of [`BLOCK_SIZE`]; callers apply ISO/IEC 7816-4 padding
/// themselves before calling this.
pub fn enc_cbc(key: &[u8; 16], iv: &[u8; 8], data: &mut [u8]) -> Result<()> {
    let key24 = expand_two_key_to_three_key(key);
    TdesCbcEnc::new(&key24.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, data.len())
        .map_err(|e| Error::Crypto(format!("3DES-CBC encrypt: {e}")))?;
    Ok(())
}

/// Decrypt `data` in place under 3DES-CBC with a zero IV.
pub fn dec_cbc(key: &[u8; 16], iv: &[u8; 8], data: &mut [u8]) -> Result<()> {
    let key24 = expand_two_key_to_three_key(key);
    TdesCbcDec::new(&key24.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|e| Error::Crypto(format!("3DES-CBC decrypt: {e}")))?;
    Ok(())
}

/// Encrypt a single 8-byte block under single-DES (used internally by the
/// retail MAC and to build CBC "initial chaining vectors").
fn des_encrypt_block(key: &[u8; 8], block: &mut [u8; 8]) {
    let cipher = Des::new_from_slice(key).expect("8-byte DES key");
    let mut generic = (*block).into();
    cipher.encrypt_block(&mut generic);
    block.copy_from_slice(&generic);
}

fn des_decrypt_block(key: &[u8; 8], block: &mut [u8; 8]) {
    let cipher = Des::new_from_slice(key).expect("8-byte DES key");
    let mut generic = (*block).into();
    cipher.decrypt_block(&mut generic);
    block.copy_from_slice(&generic);
}

/// ISO/IEC 9797-1 Algorithm 3 MAC ("retail MAC"): CBC-MAC with single DES
/// for all but the last block, then a 3DES operation (decrypt-encrypt) on
/// the final block, zero IV, padding method 2 (`0x80 00 …`). Output is the
/// full 8-byte MAC.
///
/// `data` is padded by this function; callers pass the unpadded message.
pub fn retail_mac(key_16: &[u8; 16], data: &[u8]) -> [u8; 8] {
    let k1: [u8; 8] = key_16[0..8].try_into().unwrap();
    let k2: [u8; 8] = key_16[8..16].try_into().unwrap();

    let mut padded = data.to_vec();
    padded.push(0x80);
    while padded.len() % BLOCK_SIZE != 0 {
        padded.push(0x00);
    }

    let mut chain = [0u8; 8];
    for block in padded.chunks_exact(BLOCK_SIZE) {
        for (c, b) in chain.iter_mut().zip(block) {
            *c ^= *b;
        }
        des_encrypt_block(&k1, &mut chain);
    }

    // Final step: 3DES single block = DES-dec(k2) then DES-enc(k1) applied
    // to the last CBC-MAC output (ISO/IEC 9797-1 Algorithm 3, step 2/3).
    des_decrypt_block(&k2, &mut chain);
    des_encrypt_block(&k1, &mut chain);
    chain
}

/// Expand a two-key (16-byte, K1||K2) 3DES key into the three-key form
/// (K1||K2||K1) that the `des` crate's `TdesEde3` expects.
fn expand_two_key_to_three_key(key_16: &[u8; 16]) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[0..16].copy_from_slice(key_16);
    out[16..24].copy_from_slice(&key_16[0..8]);
    out
}

/// Adjust the parity bit (LSB of each byte) of every byte in a DES key so
/// each byte has odd parity, per ISO/IEC 9797 key conventions. KDF output
/// is adjusted this way before use as a 3DES key (§4.1).
pub fn set_parity_bits(key: &mut [u8]) {
    for byte in key.iter_mut() {
        let ones = byte.count_ones();
        if ones % 2 == 0 {
            *byte ^= 0x01;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_parity_bits() {
        let mut key = hex!("239AB9CB282DAF66231DC5A4DF6BFBAE2");
        set_parity_bits(&mut key[..16]);
        for b in &key[..16] {
            assert_eq!(b.count_ones() % 2, 1);
        }
    }

    #[test]
    fn test_retail_mac_example() {
        // ICAO 9303-11 Appendix D.2: MAC over the BAC EXTERNAL AUTHENTICATE
        // cryptogram, key K_mac from the published worked example.
        let kmac: [u8; 16] = hex!("7962D9ECE03D1ACD4C76089DCE131543");
        let e: [u8; 32] = hex!("72C29C2371CC9BDB65B779B8E8D37B29ECC154AA56A8799FAE2F498F76ED92F2");
        // The cryptogram is already an exact multiple of the block size, so
        // retail_mac's internal padder appends a full extra padding block.
        let mac = retail_mac(&kmac, &e);
        assert_eq!(mac, hex!("5F1448EEA8AD90A7"));
    }
}
