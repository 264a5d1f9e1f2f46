//! `CardTransport`: the physical/contactless link to the card (§5, §6).
//!
//! The protocol core only ever speaks to a card through this trait, so it
//! works unchanged over a PC/SC reader, a PN53x/Proxmark NFC frontend, or
//! (in tests) an in-memory stub.

use crate::{
    apdu::{CommandApdu, ResponseApdu},
    error::Result,
};

/// AID of the MRTD LDS1 application (§6).
pub const MRTD_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];

/// Elementary file identifiers defined by the logical data structure (§6).
pub mod file_id {
    pub const EF_COM: u16 = 0x011E;
    pub const EF_SOD: u16 = 0x011D;
    pub const EF_CARD_ACCESS: u16 = 0x011C;
    pub const EF_CARD_SECURITY: u16 = 0x011D;
    pub const DG1: u16 = 0x0101;
    pub const DG2: u16 = 0x0102;
    pub const DG3: u16 = 0x0103;
    pub const DG4: u16 = 0x0104;
    pub const DG5: u16 = 0x0105;
    pub const DG6: u16 = 0x0106;
    pub const DG7: u16 = 0x0107;
    pub const DG8: u16 = 0x0108;
    pub const DG9: u16 = 0x0109;
    pub const DG10: u16 = 0x010A;
    pub const DG11: u16 = 0x010B;
    pub const DG12: u16 = 0x010C;
    pub const DG13: u16 = 0x010D;
    pub const DG14: u16 = 0x010E;
    pub const DG15: u16 = 0x010F;
    pub const DG16: u16 = 0x0110;
}

/// Short file identifiers (SFID), used with `SELECT` P2=0x00 "by SFID" or
/// folded into `READ BINARY`'s P1 (§6).
pub mod sfid {
    pub const EF_COM: u8 = 0x1E;
    pub const EF_SOD: u8 = 0x1D;
    pub const DG1: u8 = 0x01;
    pub const DG2: u8 = 0x02;
    pub const DG14: u8 = 0x0E;
    pub const DG15: u8 = 0x0F;
}

/// A live connection to a single card. Implementors own the physical
/// session lifecycle; the protocol layer only calls `transmit`.
pub trait CardTransport {
    /// Establish the physical/RF session (power up the field, activate the
    /// card, run anticollision). A no-op for transports that are always
    /// connected.
    fn open(&mut self) -> Result<()>;

    /// Tear down the physical session.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Answer-to-reset / answer-to-select bytes, if the transport captured
    /// one during `open`.
    fn atr(&self) -> Option<&[u8]>;

    /// Send one command APDU and return the card's response. Implementors
    /// handle link-layer framing (e.g. ISO/IEC 14443-4 block chaining);
    /// callers never see anything but the APDU bytes.
    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu>;
}

/// An in-memory `CardTransport` for tests: pre-programmed request/response
/// pairs checked by exact byte match, in order.
#[cfg(test)]
pub struct MockTransport {
    open: bool,
    expectations: std::collections::VecDeque<(Vec<u8>, ResponseApdu)>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            open: false,
            expectations: std::collections::VecDeque::new(),
        }
    }

    /// Queue a `(command bytes, response)` exchange. Commands are matched
    /// exactly, in FIFO order, against what `transmit` is asked to send.
    pub fn expect(mut self, command_bytes: Vec<u8>, response: ResponseApdu) -> Self {
        self.expectations.push_back((command_bytes, response));
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.expectations.is_empty()
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn atr(&self) -> Option<&[u8]> {
        None
    }

    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        let (expected_bytes, response) = self.expectations.pop_front().ok_or_else(|| {
            crate::error::Error::Transport("MockTransport: no more expectations queued".into())
        })?;
        let actual = command.to_bytes()?;
        if actual != expected_bytes {
            return Err(crate::error::Error::Transport(format!(
                "MockTransport: expected {expected_bytes:02X?}, got {actual:02X?}"
            )));
        }
        Ok(response)
    }
}
