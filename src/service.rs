//! `ApduService`: the card-command vocabulary built on top of a raw
//! [`CardTransport`], optionally wrapped in a [`SecureChannel`] (§4.5).

use crate::{
    apdu::{CommandApdu, ResponseApdu},
    error::{self, Error, Result},
    secure_channel::SecureChannel,
    transport::CardTransport,
};

/// INS bytes used by this crate (§4.5, §6).
mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const READ_BINARY: u8 = 0xB0;
    pub const READ_BINARY_ODD: u8 = 0xB1;
    pub const GET_CHALLENGE: u8 = 0x84;
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    pub const MSE: u8 = 0x22;
    pub const GENERAL_AUTHENTICATE: u8 = 0x86;
    pub const PSO: u8 = 0x2A;
}

/// MSE (MANAGE SECURITY ENVIRONMENT) P1/P2 combinations this crate uses
/// (§4.7, §4.8).
pub mod mse {
    /// P1/P2 for "Set Authentication Template" (PACE, §4.7 step 1).
    pub const SET_AT: (u8, u8) = (0xC1, 0xA4);
    /// P1/P2 for "Set Digital Signature Template" (Terminal Authentication,
    /// certificate verification).
    pub const SET_DST: (u8, u8) = (0x81, 0xB6);
    /// P1/P2 for "Set Key Agreement Template" (Chip Authentication).
    pub const SET_KAT: (u8, u8) = (0x41, 0xA6);
    /// P1/P2 for "Set Authentication Template, External Authentication"
    /// (Terminal Authentication step 2).
    pub const SET_AT_EXTERNAL: (u8, u8) = (0x81, 0xA4);
    /// P1/P2 for `PERFORM SECURITY OPERATION: VERIFY CERTIFICATE`.
    pub const VERIFY_CERTIFICATE: (u8, u8) = (0x00, 0xBE);
}

/// Max short-APDU data length (§4.3).
const SHORT_MAX: usize = 255;

/// Wraps a [`CardTransport`] and exposes the MRTD command set. Holds an
/// optional [`SecureChannel`]; once one is installed (after BAC/PACE),
/// every command is transparently wrapped/unwrapped (§4.4, §4.5).
pub struct ApduService<T: CardTransport> {
    transport: T,
    channel: Option<SecureChannel>,
}

impl<T: CardTransport> ApduService<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            channel: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn channel(&self) -> Option<&SecureChannel> {
        self.channel.as_ref()
    }

    /// Install a secure channel established by BAC/PACE/CA. Replaces any
    /// previous channel.
    pub fn set_channel(&mut self, channel: SecureChannel) {
        self.channel = Some(channel);
    }

    pub fn clear_channel(&mut self) {
        self.channel = None;
    }

    /// Send a command, transparently applying secure messaging if a
    /// channel is installed (§4.4, §4.5).
    pub fn send(&mut self, command: CommandApdu) -> Result<ResponseApdu> {
        if let Some(channel) = self.channel.as_mut() {
            let wrapped = channel.wrap(&command)?;
            let response = self.transport.transmit(&wrapped)?;
            channel.unwrap(&response)
        } else {
            self.transport.transmit(&command)
        }
    }

    /// Send a command and turn a non-`0x9000` status into an `Err` (§4.5).
    pub fn send_checked(&mut self, command: CommandApdu) -> Result<ResponseApdu> {
        let response = self.send(command)?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(error::apdu_error(response.sw))
        }
    }

    /// `SELECT` a DF/application by AID (§6).
    pub fn select_application(&mut self, aid: &[u8]) -> Result<()> {
        let command = CommandApdu::new(0x00, ins::SELECT, 0x04, 0x0C).with_data(aid.to_vec());
        self.send_checked(command)?;
        Ok(())
    }

    /// `SELECT` an elementary file by its 2-byte file identifier (§6).
    pub fn select_file(&mut self, file_id: u16) -> Result<()> {
        let command = CommandApdu::new(0x00, ins::SELECT, 0x02, 0x0C)
            .with_data(file_id.to_be_bytes().to_vec());
        self.send_checked(command)?;
        Ok(())
    }

    /// `READ BINARY` starting at `offset` (§6). Offsets that fit the 15-bit
    /// P1/P2 field use the short even-INS form; larger offsets fall back to
    /// the odd-INS DO'54' form instead of failing outright (§9).
    pub fn read_binary(&mut self, offset: u16, ne: usize) -> Result<Vec<u8>> {
        if offset > 0x7FFF {
            return self.read_binary_odd(offset, ne);
        }
        let p1 = (offset >> 8) as u8;
        let p2 = offset as u8;
        let command = CommandApdu::new(0x00, ins::READ_BINARY, p1, p2).with_ne(ne);
        let response = self.send_checked(command)?;
        Ok(response.data)
    }

    /// `READ BINARY` by short file identifier (even INS form, §6): P1 = 0x80
    /// | SFID, P2 the one-byte offset into that file.
    pub fn read_binary_by_sfid(&mut self, sfid: u8, offset: u16, ne: usize) -> Result<Vec<u8>> {
        let p1 = 0x80 | (sfid & 0x1F);
        let p2 = offset as u8;
        let command = CommandApdu::new(0x00, ins::READ_BINARY, p1, p2).with_ne(ne);
        let response = self.send_checked(command)?;
        Ok(response.data)
    }

    /// `READ BINARY`, odd INS form (§6): the offset rides in a `DO'54'` data
    /// object in the command body instead of P1/P2, and the card answers
    /// with its data wrapped in a `DO'53'` discretionary-data object.
    pub fn read_binary_odd(&mut self, offset: u16, ne: usize) -> Result<Vec<u8>> {
        let data = crate::tlv::wrap(
            crate::tlv::tag::READ_BINARY_OFFSET as u32,
            &offset.to_be_bytes(),
        );
        let command = CommandApdu::new(0x00, ins::READ_BINARY_ODD, 0x00, 0x00)
            .with_data(data)
            .with_ne(ne);
        let response = self.send_checked(command)?;
        let (value, _) = crate::tlv::unwrap(
            crate::tlv::tag::DISCRETIONARY_DATA as u32,
            &response.data,
        )?;
        Ok(value)
    }

    /// Read an entire elementary file by repeated `READ BINARY`, growing the
    /// read window from the BER-TLV length once it is known (§6).
    pub fn read_elementary_file(&mut self, file_id: u16) -> Result<Vec<u8>> {
        self.select_file(file_id)?;
        // First read enough to contain the tag and a long-form length
        // prefix (1 tag byte + up to 1+4 length bytes).
        let header = self.read_binary(0, 8)?;
        let header_len = ber_tlv_header_length(&header)?;
        let content_len = ber_tlv_declared_length(&header)?;
        let total_len = header_len + content_len;

        let mut data = header;
        while data.len() < total_len {
            let remaining = total_len - data.len();
            let chunk = self.read_binary(data.len() as u16, remaining.min(SHORT_MAX))?;
            if chunk.is_empty() {
                break;
            }
            data.extend(chunk);
        }
        data.truncate(total_len.min(data.len()));
        Ok(data)
    }

    /// `GET CHALLENGE`: ask the card for `len` bytes of randomness (§4.6
    /// step 2).
    pub fn get_challenge(&mut self, len: usize) -> Result<Vec<u8>> {
        let command = CommandApdu::new(0x00, ins::GET_CHALLENGE, 0x00, 0x00).with_ne(len);
        let response = self.send_checked(command)?;
        Ok(response.data)
    }

    /// `EXTERNAL AUTHENTICATE`: send the IFD's cryptogram, expecting the
    /// ICC's own cryptogram back (§4.6 step 6).
    pub fn external_authenticate(&mut self, cryptogram: Vec<u8>, ne: usize) -> Result<Vec<u8>> {
        let command =
            CommandApdu::new(0x00, ins::EXTERNAL_AUTHENTICATE, 0x00, 0x00).with_data(cryptogram).with_ne(ne);
        let response = self.send_checked(command)?;
        Ok(response.data)
    }

    /// `INTERNAL AUTHENTICATE`: Active Authentication / Chip Authentication
    /// challenge-response (§4.8).
    pub fn internal_authenticate(&mut self, challenge: Vec<u8>, ne: usize) -> Result<Vec<u8>> {
        let command =
            CommandApdu::new(0x00, ins::INTERNAL_AUTHENTICATE, 0x00, 0x00).with_data(challenge).with_ne(ne);
        let response = self.send_checked(command)?;
        Ok(response.data)
    }

    /// `MSE: SET` with the given template P1/P2 and data (§4.7 step 1,
    /// §4.8).
    pub fn manage_security_environment(&mut self, p1p2: (u8, u8), data: Vec<u8>) -> Result<()> {
        let command = CommandApdu::new(0x00, ins::MSE, p1p2.0, p1p2.1).with_data(data);
        self.send_checked(command)?;
        Ok(())
    }

    /// `GENERAL AUTHENTICATE` carrying one dynamic authentication data
    /// object (tag `0x7C`), returning the card's own DO `0x7C` body (§4.7
    /// steps 2-6).
    pub fn general_authenticate(&mut self, data: Vec<u8>, is_last: bool) -> Result<Vec<u8>> {
        let cla = if is_last { 0x00 } else { crate::apdu::CLA_CHAIN };
        let command = CommandApdu::new(cla, ins::GENERAL_AUTHENTICATE, 0x00, 0x00)
            .with_data(data)
            .with_ne(0);
        let response = self.send_checked(command)?;
        let (value, _) = crate::tlv::unwrap(crate::tlv::tag::DYNAMIC_AUTH_DATA as u32, &response.data)?;
        Ok(value)
    }

    /// `PERFORM SECURITY OPERATION` in block-chaining mode, used by
    /// Terminal Authentication to present certificates larger than one
    /// short APDU (§4.8).
    pub fn perform_security_operation(&mut self, p1: u8, p2: u8, data: Vec<u8>) -> Result<Vec<u8>> {
        let mut response_data = Vec::new();
        let chunks: Vec<&[u8]> = data.chunks(SHORT_MAX).collect();
        let total = chunks.len().max(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let is_last = i + 1 == total;
            let cla = if is_last { 0x00 } else { crate::apdu::CLA_CHAIN };
            let command = CommandApdu::new(cla, ins::PSO, p1, p2).with_data(chunk.to_vec());
            let response = self.send_checked(command)?;
            response_data.extend(response.data);
        }
        Ok(response_data)
    }
}

/// Total byte length of a BER-TLV's tag+length prefix, derived from the
/// leading bytes already read.
fn ber_tlv_header_length(bytes: &[u8]) -> Result<usize> {
    let first_len_byte = *bytes
        .get(1)
        .ok_or_else(|| Error::MalformedTlv("file too short to contain a TLV header".into()))?;
    Ok(if first_len_byte & 0x80 == 0 {
        2
    } else {
        2 + (first_len_byte & 0x7F) as usize
    })
}

/// Declared content length of the leading BER-TLV object, without
/// requiring the whole value to already be present.
fn ber_tlv_declared_length(bytes: &[u8]) -> Result<usize> {
    let first_len_byte = *bytes
        .get(1)
        .ok_or_else(|| Error::MalformedTlv("file too short to contain a TLV header".into()))?;
    if first_len_byte & 0x80 == 0 {
        return Ok(first_len_byte as usize);
    }
    let n = (first_len_byte & 0x7F) as usize;
    let len_bytes = bytes
        .get(2..2 + n)
        .ok_or_else(|| Error::MalformedTlv("truncated long-form length".into()))?;
    let mut length = 0usize;
    for &b in len_bytes {
        length = (length << 8) | b as usize;
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_select_application_success() {
        let aid = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];
        let transport = MockTransport::new().expect(
            {
                let mut v = vec![0x00, 0xA4, 0x04, 0x0C, 0x07];
                v.extend(aid);
                v
            },
            ResponseApdu {
                data: vec![],
                sw: 0x9000,
            },
        );
        let mut service = ApduService::new(transport);
        service.select_application(&aid).unwrap();
    }

    #[test]
    fn test_select_application_not_found_maps_to_error() {
        let aid = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];
        let transport = MockTransport::new().expect(
            {
                let mut v = vec![0x00, 0xA4, 0x04, 0x0C, 0x07];
                v.extend(aid);
                v
            },
            ResponseApdu {
                data: vec![],
                sw: 0x6A82,
            },
        );
        let mut service = ApduService::new(transport);
        assert!(matches!(
            service.select_application(&aid),
            Err(Error::FileNotFound(0x6A82))
        ));
    }

    #[test]
    fn test_get_challenge_returns_data() {
        let transport = MockTransport::new().expect(
            vec![0x00, 0x84, 0x00, 0x00, 0x08],
            ResponseApdu {
                data: vec![0x11; 8],
                sw: 0x9000,
            },
        );
        let mut service = ApduService::new(transport);
        let challenge = service.get_challenge(8).unwrap();
        assert_eq!(challenge, vec![0x11; 8]);
    }

    #[test]
    fn test_read_binary_odd_wraps_offset_and_unwraps_discretionary_data() {
        let transport = MockTransport::new().expect(
            vec![0x00, 0xB1, 0x00, 0x00, 0x04, 0x54, 0x02, 0x01, 0x00, 0x00],
            ResponseApdu {
                data: vec![0x53, 0x02, 0xAA, 0xBB],
                sw: 0x9000,
            },
        );
        let mut service = ApduService::new(transport);
        let data = service.read_binary_odd(0x0100, 0).unwrap();
        assert_eq!(data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_read_binary_falls_back_to_odd_form_above_0x7fff() {
        let transport = MockTransport::new().expect(
            vec![0x00, 0xB1, 0x00, 0x00, 0x04, 0x54, 0x02, 0x80, 0x00, 0x00],
            ResponseApdu {
                data: vec![0x53, 0x01, 0xCC],
                sw: 0x9000,
            },
        );
        let mut service = ApduService::new(transport);
        let data = service.read_binary(0x8000, 0).unwrap();
        assert_eq!(data, vec![0xCC]);
    }
}
