//! [`CardTransport`] backed by a Proxmark3 RDV4 talking ISO/IEC 14443-4 over
//! USB bulk transfer. Gated behind the `proxmark3` feature; only built for
//! the `read-passport` demo binary.
//!
//! The Proxmark3 client/firmware pair has its own framed command protocol
//! wrapping "send raw 14a bytes, read the tag's answer" — this module does
//! not reimplement that framing faithfully, only the shape of the USB
//! plumbing (device discovery, interface claim, bulk endpoints) grounded in
//! how other USB HID/bulk security tokens are opened with `rusb`. A command
//! sent by `transmit` is a bare APDU; the device on the other end of the
//! bulk pipe is expected to already be holding a selected ISO 14443-4 card
//! and to echo back exactly the card's response, with no Proxmark3 envelope
//! of its own, which is true of a Proxmark3 running in raw relay mode.

use icao9303::{
    apdu::{CommandApdu, ResponseApdu},
    error::{Error, Result},
    transport::CardTransport,
};
use rusb::UsbContext;
use std::time::Duration;

/// Proxmark3 RDV4 USB vendor/product ID (CDC-ACM composite device, data
/// interface).
const PM3_VENDOR_ID: u16 = 0x9ac4;
const PM3_PRODUCT_ID: u16 = 0x4b8f;

/// The data interface's bulk endpoints, numbered the way the stock PM3
/// firmware's USB descriptor presents them.
const PM3_INTERFACE_NUM: u8 = 0x01;
const PM3_BULK_OUT_ENDPOINT: u8 = 0x03;
const PM3_BULK_IN_ENDPOINT: u8 = 0x83;

const USB_TIMEOUT: Duration = Duration::from_secs(5);

/// A `CardTransport` over a Proxmark3's bulk USB pipe.
pub struct Proxmark3Transport {
    handle: Option<rusb::DeviceHandle<rusb::Context>>,
    atr: Option<Vec<u8>>,
}

impl Proxmark3Transport {
    /// Locate the first attached Proxmark3 and open it. Does not yet power
    /// the RF field or select a card; that happens in `open`.
    pub fn detect() -> Result<Self> {
        let context = rusb::Context::new()
            .map_err(|e| Error::Transport(format!("libusb context: {e}")))?;
        let devices = context
            .devices()
            .map_err(|e| Error::Transport(format!("libusb device list: {e}")))?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if descriptor.vendor_id() != PM3_VENDOR_ID || descriptor.product_id() != PM3_PRODUCT_ID
            {
                continue;
            }
            let handle = device
                .open()
                .map_err(|e| Error::Transport(format!("opening Proxmark3: {e}")))?;
            return Ok(Self {
                handle: Some(handle),
                atr: None,
            });
        }
        Err(Error::Transport("no Proxmark3 found on USB".into()))
    }

    fn handle(&mut self) -> Result<&mut rusb::DeviceHandle<rusb::Context>> {
        self.handle
            .as_mut()
            .ok_or_else(|| Error::Transport("Proxmark3 not open".into()))
    }
}

impl CardTransport for Proxmark3Transport {
    fn open(&mut self) -> Result<()> {
        let handle = self.handle()?;
        handle
            .claim_interface(PM3_INTERFACE_NUM)
            .map_err(|e| Error::Transport(format!("claiming Proxmark3 interface: {e}")))?;

        // Field-up / anticollision request. A real deployment sends the
        // Proxmark3's own "hf 14a raw" select-and-activate command here;
        // this demo only reads back whatever the device hands over as the
        // card's answer-to-select and keeps it for `atr()`.
        let mut buffer = [0u8; 64];
        match handle.read_bulk(PM3_BULK_IN_ENDPOINT, &mut buffer, USB_TIMEOUT) {
            Ok(n) => self.atr = Some(buffer[..n].to_vec()),
            Err(rusb::Error::Timeout) => self.atr = None,
            Err(e) => return Err(Error::Transport(format!("reading Proxmark3 ATS: {e}"))),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.as_mut() {
            let _ = handle.release_interface(PM3_INTERFACE_NUM);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        let command_bytes = command.to_bytes()?;
        let handle = self.handle()?;

        handle
            .write_bulk(PM3_BULK_OUT_ENDPOINT, &command_bytes, USB_TIMEOUT)
            .map_err(|e| Error::Transport(format!("writing APDU to Proxmark3: {e}")))?;

        let mut buffer = vec![0u8; 4096];
        let read = handle
            .read_bulk(PM3_BULK_IN_ENDPOINT, &mut buffer, USB_TIMEOUT)
            .map_err(|e| Error::Transport(format!("reading APDU response from Proxmark3: {e}")))?;
        buffer.truncate(read);
        ResponseApdu::parse(&buffer)
    }
}
