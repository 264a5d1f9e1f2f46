//! Read-only client core for the ICAO Doc 9303 MRTD (electronic passport)
//! contactless protocol stack: APDU/secure-messaging transport, BAC, PACE,
//! and EAC (Chip/Terminal Authentication), plus the key-derivation and
//! BER-TLV plumbing they all share.
//!
//! This crate never talks to a reader directly; callers supply a
//! [`transport::CardTransport`] and drive the protocol modules
//! ([`bac`], [`pace`], [`eac`]) over an [`service::ApduService`]. Data-group
//! and SOD parsing are out of scope — everything above EF.COM/EF.SOD is
//! handed back to the caller as opaque bytes.

pub mod apdu;
pub mod bac;
pub mod crypto;
pub mod eac;
pub mod error;
pub mod pace;
pub mod secure_channel;
pub mod service;
pub mod tlv;
pub mod transport;

pub use error::{Error, Result};
