//! `ApduCodec`: command/response APDU framing (§3, §4.3).

use crate::error::{Error, Result};

/// CLA bit that marks a command as applying secure messaging (§3).
pub const CLA_SECURE_MESSAGING: u8 = 0x0C;
/// CLA bit that marks a command as chained (§3).
pub const CLA_CHAIN: u8 = 0x10;

/// A command APDU, in the abstract (CLA, INS, P1, P2, data, Ne) form. Use
/// [`CommandApdu::to_bytes`] to get the wire encoding.
#[derive(Debug, Clone)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length. `None` means no data is expected (no Le
    /// byte at all). `Some(0)` means "maximum" (encoded as 256/65536 per
    /// the ISO convention, §4.3).
    pub ne: Option<usize>,
    /// Force extended-length encoding even if the command would fit in
    /// short form.
    pub force_extended: bool,
}

impl CommandApdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            ne: None,
            force_extended: false,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_ne(mut self, ne: usize) -> Self {
        self.ne = Some(ne);
        self
    }

    pub fn extended(mut self) -> Self {
        self.force_extended = true;
        self
    }

    /// True if this command needs extended-length encoding: Lc > 255, the
    /// requested Ne > 256, or the caller asked for it explicitly (§4.3).
    fn needs_extended(&self) -> bool {
        self.force_extended
            || self.data.len() > 255
            || matches!(self.ne, Some(ne) if ne > 256)
    }

    /// Encode to the wire command-APDU byte string.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.data.len() > 65535 {
            return Err(Error::MalformedResponse("command data too long".into()));
        }
        let extended = self.needs_extended();
        let mut out = vec![self.cla, self.ins, self.p1, self.p2];

        let lc_present = !self.data.is_empty();
        if extended {
            if lc_present {
                out.push(0x00);
                out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                out.extend_from_slice(&self.data);
            }
            if let Some(ne) = self.ne {
                let encoded = if ne == 0 || ne > 65535 { 0 } else { ne as u16 };
                if !lc_present {
                    out.push(0x00);
                }
                out.extend_from_slice(&encoded.to_be_bytes());
            }
        } else {
            if lc_present {
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
            }
            if let Some(ne) = self.ne {
                let encoded = if ne == 0 || ne > 255 { 0 } else { ne as u8 };
                out.push(encoded);
            }
        }
        Ok(out)
    }
}

/// A response APDU: data payload plus the trailing two-byte status word.
#[derive(Debug, Clone)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub sw: u16,
}

impl ResponseApdu {
    /// Split `bytes` into data and the trailing SW1/SW2.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::MalformedResponse(
                "response shorter than the 2-byte status word".into(),
            ));
        }
        let (data, sw_bytes) = bytes.split_at(bytes.len() - 2);
        let sw = u16::from_be_bytes([sw_bytes[0], sw_bytes[1]]);
        Ok(Self {
            data: data.to_vec(),
            sw,
        })
    }

    pub fn is_success(&self) -> bool {
        self.sw == 0x9000
    }

    /// `0x61XX` ("more data available") is the only SW family that carries
    /// a remaining-length hint rather than a terminal status.
    pub fn data_remaining(&self) -> Option<u8> {
        if self.sw & 0xFF00 == 0x6100 {
            Some((self.sw & 0xFF) as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form_no_data_max_le() {
        let apdu = CommandApdu::new(0x00, 0xB0, 0x80, 0x00).with_ne(0);
        assert_eq!(apdu.to_bytes().unwrap(), vec![0x00, 0xB0, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_short_form_with_data_and_le() {
        let apdu = CommandApdu::new(0x00, 0xA4, 0x02, 0x0C)
            .with_data(vec![0x01, 0x1E])
            .with_ne(0);
        assert_eq!(
            apdu.to_bytes().unwrap(),
            vec![0x00, 0xA4, 0x02, 0x0C, 0x02, 0x01, 0x1E, 0x00]
        );
    }

    #[test]
    fn test_extended_form_forced() {
        let apdu = CommandApdu::new(0x00, 0xB0, 0x00, 0x00)
            .with_ne(65536)
            .extended();
        let bytes = apdu.to_bytes().unwrap();
        assert_eq!(bytes, vec![0x00, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_extended_form_auto_selected_by_large_data() {
        let data = vec![0xAAu8; 300];
        let apdu = CommandApdu::new(0x00, 0xDB, 0x00, 0x00).with_data(data.clone());
        let bytes = apdu.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &[0x00, 0xDB, 0x00, 0x00]);
        assert_eq!(&bytes[4..7], &[0x00, 0x01, 0x2C]); // Lc = 300
        assert_eq!(bytes.len(), 4 + 3 + 300);
    }

    #[test]
    fn test_response_parse() {
        let rsp = ResponseApdu::parse(&[0xDE, 0xAD, 0x90, 0x00]).unwrap();
        assert_eq!(rsp.data, vec![0xDE, 0xAD]);
        assert!(rsp.is_success());
    }

    #[test]
    fn test_response_data_remaining() {
        let rsp = ResponseApdu::parse(&[0x61, 0x0A]).unwrap();
        assert_eq!(rsp.data_remaining(), Some(0x0A));
        assert!(!rsp.is_success());
    }
}
