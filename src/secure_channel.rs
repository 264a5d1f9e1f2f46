//! `SecureChannel`: wraps/unwraps APDUs under a BAC or PACE session,
//! maintaining the send-sequence counter (§3, §4.4).

use zeroize::Zeroize;

use crate::{
    apdu::{CLA_SECURE_MESSAGING, CommandApdu, ResponseApdu},
    crypto::{aes, des},
    error::{Error, Result},
    tlv::{self, tag},
};

/// The two cipher families a session can be keyed with (§3, §9: modeled as
/// a tagged variant rather than dynamic dispatch over a wrapper trait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Tdes,
    Aes,
}

impl Cipher {
    fn block_size(self) -> usize {
        match self {
            Cipher::Tdes => 8,
            Cipher::Aes => 16,
        }
    }
}

/// The monotone send-sequence counter bound into every secure-messaging MAC
/// (§3). Always incremented exactly twice per wrap/unwrap round trip: once
/// before wrapping a command, once before unwrapping its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSequenceCounter {
    value: u128,
    width_bytes: usize,
}

impl SendSequenceCounter {
    pub fn new(initial: u128, width_bytes: usize) -> Self {
        Self {
            value: initial,
            width_bytes,
        }
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    fn increment(&mut self) {
        self.value = self.value.wrapping_add(1);
    }

    /// Big-endian encoding of the counter, `width_bytes` long.
    fn to_bytes(self) -> Vec<u8> {
        let full = self.value.to_be_bytes(); // 16 bytes
        full[16 - self.width_bytes..].to_vec()
    }
}

/// An established secure-messaging channel: immutable keys, mutable SSC
/// (§3 invariants). Not reentrant — the caller serializes access to a
/// single physical transport (§5).
#[derive(Debug)]
pub struct SecureChannel {
    cipher: Cipher,
    k_enc: Vec<u8>,
    k_mac: Vec<u8>,
    ssc: SendSequenceCounter,
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        self.k_enc.zeroize();
        self.k_mac.zeroize();
    }
}

impl SecureChannel {
    /// Construct a new channel. `initial_ssc` is BAC's
    /// `last4(rnd_icc) || last4(rnd_ifd)` or PACE's 0/carry-over value
    /// (§3, §4.6 step 10, §4.7 step 7).
    pub fn new(cipher: Cipher, k_enc: Vec<u8>, k_mac: Vec<u8>, initial_ssc: u128) -> Self {
        let width = cipher.block_size();
        Self {
            cipher,
            k_enc,
            k_mac,
            ssc: SendSequenceCounter::new(initial_ssc, width),
        }
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    pub fn ssc(&self) -> u128 {
        self.ssc.value()
    }

    fn encrypt_iv(&self) -> Result<Vec<u8>> {
        match self.cipher {
            Cipher::Tdes => Ok(vec![0u8; 8]),
            Cipher::Aes => {
                // SSC occupies the low-order bytes of the 16-byte input block.
                let mut full = [0u8; 16];
                full[16 - self.ssc.width_bytes..].copy_from_slice(&self.ssc.to_bytes());
                Ok(aes::encrypt_block(&self.k_enc, &full)?.to_vec())
            }
        }
    }

    fn encrypt_data(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.cipher.block_size();
        let mut padded = plaintext.to_vec();
        padded.push(0x80);
        while padded.len() % block_size != 0 {
            padded.push(0x00);
        }
        let iv = self.encrypt_iv()?;
        match self.cipher {
            Cipher::Tdes => {
                let key: [u8; 16] = self.k_enc.clone().try_into().map_err(|_| {
                    Error::Crypto("3DES session key must be 16 bytes".into())
                })?;
                let iv8: [u8; 8] = iv.try_into().unwrap();
                des::enc_cbc(&key, &iv8, &mut padded)?;
            }
            Cipher::Aes => {
                let iv16: [u8; 16] = iv.try_into().unwrap();
                aes::enc_cbc(&self.k_enc, &iv16, &mut padded)?;
            }
        }
        Ok(padded)
    }

    fn decrypt_data(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let iv = self.encrypt_iv()?;
        let mut buf = ciphertext.to_vec();
        match self.cipher {
            Cipher::Tdes => {
                let key: [u8; 16] = self.k_enc.clone().try_into().map_err(|_| {
                    Error::Crypto("3DES session key must be 16 bytes".into())
                })?;
                let iv8: [u8; 8] = iv.try_into().unwrap();
                des::dec_cbc(&key, &iv8, &mut buf)?;
            }
            Cipher::Aes => {
                let iv16: [u8; 16] = iv.try_into().unwrap();
                aes::dec_cbc(&self.k_enc, &iv16, &mut buf)?;
            }
        }
        remove_iso7816_padding(&buf)
    }

    fn mac(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.cipher {
            Cipher::Tdes => {
                let key: [u8; 16] = self
                    .k_mac
                    .clone()
                    .try_into()
                    .map_err(|_| Error::Crypto("3DES MAC key must be 16 bytes".into()))?;
                Ok(des::retail_mac(&key, data).to_vec())
            }
            Cipher::Aes => Ok(aes::cmac_trunc8(&self.k_mac, data)?.to_vec()),
        }
    }

    /// Wrap a plain command APDU for transmission under this session
    /// (§4.4 Wrap).
    pub fn wrap(&mut self, command: &CommandApdu) -> Result<CommandApdu> {
        self.ssc.increment();
        let block_size = self.cipher.block_size();

        let cla = command.cla | CLA_SECURE_MESSAGING;
        let mut header = vec![cla, command.ins, command.p1, command.p2];
        pad_iso7816(&mut header, block_size);

        let mut dos = Vec::new();
        if !command.data.is_empty() {
            let ciphertext = self.encrypt_data(&command.data)?;
            let mut value = vec![0x01];
            value.extend(ciphertext);
            // Odd-INS commands (e.g. the DO'54'-addressed READ BINARY) use
            // DO'85' for their encrypted body instead of DO'87' (§4.4).
            let data_tag = if command.ins & 0x01 == 1 {
                tag::SM_ENCRYPTED_DATA_ODD
            } else {
                tag::SM_ENCRYPTED_DATA_EVEN
            };
            dos.push(tlv::wrap(data_tag as u32, &value));
        }
        if let Some(ne) = command.ne {
            let le_bytes = if ne > 255 {
                ((ne.min(65536)) as u16).to_be_bytes().to_vec()
            } else {
                vec![ne as u8]
            };
            dos.push(tlv::wrap(tag::SM_LE as u32, &le_bytes));
        }

        let mut mac_input = self.ssc.to_bytes();
        mac_input.extend_from_slice(&header);
        for d in &dos {
            mac_input.extend_from_slice(d);
        }
        pad_iso7816(&mut mac_input, block_size);
        let mac = self.mac(&mac_input)?;
        dos.push(tlv::wrap(tag::SM_MAC as u32, &mac));

        let mut data = Vec::new();
        for d in &dos {
            data.extend_from_slice(d);
        }

        let ne = if block_size == 8 { 256 } else { 65536 };
        Ok(CommandApdu {
            cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
            data,
            ne: Some(ne),
            force_extended: command.force_extended,
        })
    }

    /// Unwrap a protected response APDU, verifying the MAC and decrypting
    /// any data (§4.4 Unwrap). A MAC mismatch poisons the channel: the
    /// caller must not reuse it (§7).
    pub fn unwrap(&mut self, response: &ResponseApdu) -> Result<ResponseApdu> {
        self.ssc.increment();
        let block_size = self.cipher.block_size();

        let objects = tlv::parse_all(&response.data)?;
        let mut encrypted_data: Option<Vec<u8>> = None;
        let mut protected_sw: Option<u16> = None;
        let mut mac: Option<Vec<u8>> = None;

        for obj in &objects {
            match obj.tag as u8 {
                t if t == tag::SM_ENCRYPTED_DATA_EVEN || t == tag::SM_ENCRYPTED_DATA_ODD => {
                    encrypted_data = Some(obj.value.clone())
                }
                t if t == tag::SM_STATUS_WORD => {
                    if obj.value.len() != 2 {
                        return Err(Error::MalformedResponse("SW DO must be 2 bytes".into()));
                    }
                    protected_sw = Some(u16::from_be_bytes([obj.value[0], obj.value[1]]));
                }
                t if t == tag::SM_MAC => mac = Some(obj.value.clone()),
                _ => {}
            }
        }
        let mac = mac.ok_or_else(|| Error::MalformedResponse("missing MAC DO (0x8E)".into()))?;

        let mut mac_input = self.ssc.to_bytes();
        for obj in &objects {
            let t = obj.tag as u8;
            if t == tag::SM_ENCRYPTED_DATA_EVEN
                || t == tag::SM_ENCRYPTED_DATA_ODD
                || t == tag::SM_STATUS_WORD
            {
                mac_input.extend(tlv::wrap(obj.tag, &obj.value));
            }
        }
        pad_iso7816(&mut mac_input, block_size);
        let expected_mac = self.mac(&mac_input)?;
        if expected_mac != mac {
            return Err(Error::MacMismatch);
        }

        let data = match encrypted_data {
            Some(payload) => {
                if payload.first() != Some(&0x01) {
                    return Err(Error::MalformedResponse(
                        "expected 0x01 padding-content indicator in encrypted data DO".into(),
                    ));
                }
                self.decrypt_data(&payload[1..])?
            }
            None => Vec::new(),
        };
        let sw = protected_sw.unwrap_or(response.sw);

        Ok(ResponseApdu { data, sw })
    }
}

fn pad_iso7816(data: &mut Vec<u8>, block_size: usize) {
    data.push(0x80);
    while data.len() % block_size != 0 {
        data.push(0x00);
    }
}

pub(crate) fn remove_iso7816_padding(data: &[u8]) -> Result<Vec<u8>> {
    let pos = data
        .iter()
        .rposition(|&b| b != 0x00)
        .ok_or_else(|| Error::MalformedResponse("all-zero padded data".into()))?;
    if data[pos] != 0x80 {
        return Err(Error::MalformedResponse(
            "missing ISO/IEC 7816-4 padding marker".into(),
        ));
    }
    Ok(data[..pos].to_vec())
}
