//! `TlvCodec`: BER-TLV data objects used as APDU payloads (§4.2).
//!
//! Only the subset of BER-TLV this protocol actually emits/consumes is
//! implemented: 1-3 byte tags (single-byte tags are the only ones this
//! crate constructs, but multi-byte tags are accepted on decode so a
//! chip's `0x7F49`-style constructed tags don't fail to parse), and
//! short/long-form lengths.

use crate::error::{Error, Result};

/// Well-known context-specific tags used throughout secure messaging and
/// PACE/EAC (§4.2, §6).
pub mod tag {
    pub const OID: u8 = 0x80;
    pub const PUBLIC_OR_SECRET_KEY: u8 = 0x83;
    pub const KEY_REFERENCE: u8 = 0x84;
    pub const DYNAMIC_AUTH_DATA: u8 = 0x7C;
    pub const MAPPING_DATA_1: u8 = 0x81;
    pub const MAPPING_DATA_2: u8 = 0x82;
    pub const EPHEMERAL_PUBLIC_KEY_IFD: u8 = 0x83;
    pub const EPHEMERAL_PUBLIC_KEY_ICC: u8 = 0x84;
    pub const AUTH_TOKEN_PCD: u8 = 0x85;
    pub const AUTH_TOKEN_PICC: u8 = 0x86;
    pub const CAM_ENCRYPTED_DATA: u8 = 0x8A;
    pub const SM_ENCRYPTED_DATA_EVEN: u8 = 0x87;
    pub const SM_ENCRYPTED_DATA_ODD: u8 = 0x85;
    pub const SM_LE: u8 = 0x97;
    pub const SM_STATUS_WORD: u8 = 0x99;
    pub const SM_MAC: u8 = 0x8E;
    /// Raw ASN.1 OID tag, used inside the auth-token `SubjectPublicKeyInfo`-
    /// style encoding (§4.1), as opposed to the context-specific `OID` DO
    /// tag used in `MSE: SET AT`.
    pub const ASN1_OID: u8 = 0x06;
    /// `7F49`: `AuthenticationToken`'s public-key data object wrapper.
    pub const GENERIC_PUBLIC_KEY: u32 = 0x7F49;
    /// Chip Authentication's `GENERAL AUTHENTICATE` data object carrying the
    /// terminal's ephemeral public key (§4.8) — numerically the same byte as
    /// `OID` but used in a different context (no MSE template in scope).
    pub const CA_PUBLIC_KEY: u8 = 0x80;
    /// Certificate Holder Reference, used in both `MSE: SET DST` (naming the
    /// CVCA) and `MSE: SET AT` external-authentication mode (naming the
    /// terminal's own certificate, §4.8).
    pub const CERTIFICATE_HOLDER_REFERENCE: u8 = 0x83;
    /// Auxiliary authenticated data (e.g. effective date) carried alongside
    /// `MSE: SET AT` during Terminal Authentication (§4.8).
    pub const AUXILIARY_DATA: u8 = 0x67;
    /// `READ BINARY`'s odd-INS offset data object (ISO/IEC 7816-4 §7.2.3).
    pub const READ_BINARY_OFFSET: u8 = 0x54;
    /// `READ BINARY`'s odd-INS response wrapper (ISO/IEC 7816-4 §7.2.3).
    pub const DISCRETIONARY_DATA: u8 = 0x53;
}

/// A parsed BER-TLV object: tag, its encoded length in bytes (tag + length
/// prefix), and the value slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u32,
    pub value: Vec<u8>,
}

/// Emit the canonical BER-TLV encoding of `(tag, value)`. `tag` is encoded
/// in its minimal form: one byte if `tag <= 0xFF`, otherwise big-endian
/// with no leading zero byte.
pub fn wrap(tag: u32, value: &[u8]) -> Vec<u8> {
    let mut out = encode_tag(tag);
    out.extend(encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

/// Parse a single leading BER-TLV object out of `bytes`, requiring its tag
/// to equal `expected_tag`. Returns the value and the number of bytes
/// consumed (tag + length + value).
pub fn unwrap(expected_tag: u32, bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    let tlv = parse_one(bytes)?;
    if tlv.0.tag != expected_tag {
        return Err(Error::MalformedTlv(format!(
            "expected tag {:X}, got {:X}",
            expected_tag, tlv.0.tag
        )));
    }
    Ok((tlv.0.value, tlv.1))
}

/// Parse every top-level TLV object in `bytes` until exhausted.
pub fn parse_all(mut bytes: &[u8]) -> Result<Vec<Tlv>> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (tlv, consumed) = parse_one(bytes)?;
        out.push(tlv);
        bytes = &bytes[consumed..];
    }
    Ok(out)
}

/// Parse one leading TLV object, returning it along with how many bytes of
/// `bytes` it occupied.
pub fn parse_one(bytes: &[u8]) -> Result<(Tlv, usize)> {
    let (tag, tag_len) = decode_tag(bytes)?;
    let rest = &bytes[tag_len..];
    let (length, len_len) = decode_length(rest)?;
    let value_start = tag_len + len_len;
    let value_end = value_start
        .checked_add(length)
        .ok_or_else(|| Error::MalformedTlv("length overflow".into()))?;
    if value_end > bytes.len() {
        return Err(Error::MalformedTlv(format!(
            "declared length {length} exceeds remaining {} bytes",
            bytes.len() - value_start
        )));
    }
    Ok((
        Tlv {
            tag,
            value: bytes[value_start..value_end].to_vec(),
        },
        value_end,
    ))
}

fn encode_tag(tag: u32) -> Vec<u8> {
    if tag <= 0xFF {
        vec![tag as u8]
    } else if tag <= 0xFFFF {
        vec![(tag >> 8) as u8, tag as u8]
    } else {
        vec![(tag >> 16) as u8, (tag >> 8) as u8, tag as u8]
    }
}

fn decode_tag(bytes: &[u8]) -> Result<(u32, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| Error::MalformedTlv("empty input".into()))?;
    // Low 5 bits all set means the tag continues into further bytes (BER
    // multi-byte tag number encoding).
    if first & 0x1F != 0x1F {
        return Ok((first as u32, 1));
    }
    let mut tag = first as u32;
    let mut len = 1;
    loop {
        let b = *bytes
            .get(len)
            .ok_or_else(|| Error::MalformedTlv("truncated tag".into()))?;
        tag = (tag << 8) | b as u32;
        len += 1;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let bytes = len.to_be_bytes();
        let significant: Vec<u8> = bytes
            .iter()
            .copied()
            .skip_while(|&b| b == 0)
            .collect();
        let mut out = vec![0x80 | significant.len() as u8];
        out.extend(significant);
        out
    }
}

fn decode_length(bytes: &[u8]) -> Result<(usize, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| Error::MalformedTlv("truncated length".into()))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let n = (first & 0x7F) as usize;
    if n == 0 {
        return Err(Error::MalformedTlv("indefinite length not supported".into()));
    }
    let len_bytes = bytes
        .get(1..1 + n)
        .ok_or_else(|| Error::MalformedTlv("truncated long-form length".into()))?;
    let mut length = 0usize;
    for &b in len_bytes {
        length = (length << 8) | b as usize;
    }
    Ok((length, 1 + n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_short_form() {
        let encoded = wrap(0x80, &[0x01, 0x02, 0x03]);
        assert_eq!(encoded, vec![0x80, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_wrap_long_form() {
        let value = vec![0x42; 200];
        let encoded = wrap(0x53, &value);
        assert_eq!(&encoded[..3], &[0x53, 0x81, 200]);
        assert_eq!(encoded.len(), 3 + 200);
    }

    #[test]
    fn test_unwrap_roundtrip() {
        let encoded = wrap(0x7C, &[0xAA, 0xBB]);
        let (value, consumed) = unwrap(0x7C, &encoded).unwrap();
        assert_eq!(value, vec![0xAA, 0xBB]);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_unwrap_wrong_tag_fails() {
        let encoded = wrap(0x80, &[0x01]);
        assert!(unwrap(0x81, &encoded).is_err());
    }

    #[test]
    fn test_parse_all_multiple_dos() {
        let mut bytes = wrap(0x87, &[0x01, 0x02]);
        bytes.extend(wrap(0x99, &[0x90, 0x00]));
        bytes.extend(wrap(0x8E, &[0xAA; 8]));
        let objects = parse_all(&bytes).unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0].tag, 0x87);
        assert_eq!(objects[1].tag, 0x99);
        assert_eq!(objects[2].tag, 0x8E);
        assert_eq!(objects[2].value.len(), 8);
    }
}
