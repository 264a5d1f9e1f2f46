//! Extended Access Control: Chip Authentication and Terminal Authentication
//! (§4.8), layered on top of an already-established BAC/PACE channel.
//!
//! Data-group parsing (reading the chip's static public key out of DG14, or
//! a CV certificate chain out of the terminal's store) is out of scope for
//! this crate — both arrive here already decoded, as the rest of the crate
//! treats LDS file contents as opaque bytes (§1 Non-goals).

use log::debug;
use rand::{CryptoRng, RngCore};
use sha1::Digest;
use sha2::Sha256;

use crate::{
    crypto::{
        agreement,
        curves::Domain,
        kdf::{self, CipherAlg},
    },
    error::{Error, Result},
    pace::Agreement,
    secure_channel::{Cipher, SecureChannel},
    service::{mse, ApduService},
    tlv::{self, tag},
    transport::CardTransport,
};

/// A decoded `id-CA-*` OID: which key-agreement kind and cipher the chip
/// advertised for Chip Authentication (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaAlgorithm {
    pub agreement: Agreement,
    pub cipher: CipherAlg,
}

/// Decode an `id-CA-DH-*`/`id-CA-ECDH-*` OID (`0.4.0.127.0.7.2.2.3.*`, §6).
pub fn algorithm_for_oid(oid_bytes: &[u8]) -> Result<CaAlgorithm> {
    const PREFIX: &[u8] = &[0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x03];
    if oid_bytes.len() < PREFIX.len() + 2 || &oid_bytes[..PREFIX.len()] != PREFIX {
        return Err(Error::Unsupported(
            "object identifier is not a recognized id-CA-* arc".into(),
        ));
    }
    let agreement = match oid_bytes[PREFIX.len()] {
        0x01 => Agreement::Dh,
        0x02 => Agreement::Ecdh,
        other => {
            return Err(Error::Unsupported(format!(
                "unrecognized Chip Authentication agreement arc 0x{other:02X}"
            )))
        }
    };
    let cipher = match oid_bytes[PREFIX.len() + 1] {
        0x01 => CipherAlg::Tdes112,
        0x02 => CipherAlg::Aes128,
        0x03 => CipherAlg::Aes192,
        0x04 => CipherAlg::Aes256,
        other => {
            return Err(Error::Unsupported(format!(
                "unrecognized Chip Authentication cipher arc 0x{other:02X}"
            )))
        }
    };
    Ok(CaAlgorithm { agreement, cipher })
}

/// The outcome of a successful Chip Authentication run: the replacement
/// secure channel, and the SHA digest of the terminal's ephemeral public
/// key (needed by Terminal Authentication's signed challenge, and by
/// Passive Authentication to cross-check against DG14's own record).
pub struct ChipAuthenticationResult {
    pub channel: SecureChannel,
    pub pcd_public_key_hash: Vec<u8>,
}

/// Run Chip Authentication (§4.8): `domain`/`chip_public_key` are the static
/// domain parameters and public key read out of DG14 by the caller. On
/// success the existing channel is superseded entirely — SSC resets to 0,
/// per §4.8 (unlike PACE's AES carryover rule, there is no ambiguity here).
pub fn chip_authentication<T: CardTransport, R: RngCore + CryptoRng>(
    service: &mut ApduService<T>,
    oid_bytes: &[u8],
    domain: &Domain,
    chip_public_key: &[u8],
    key_id: Option<u8>,
    rng: &mut R,
) -> Result<ChipAuthenticationResult> {
    let algorithm = algorithm_for_oid(oid_bytes)?;
    match (domain, algorithm.agreement) {
        (Domain::Dh(_), Agreement::Dh) | (Domain::Ec(_), Agreement::Ecdh) => {}
        _ => {
            return Err(Error::EacFailed(
                "domain parameters do not match the Chip Authentication OID's agreement kind"
                    .into(),
            ))
        }
    }

    debug!("CA: selecting protocol via MSE: SET KAT");
    let mut mse_data = tlv::wrap(tag::OID as u32, oid_bytes);
    if let Some(id) = key_id {
        mse_data.extend(tlv::wrap(tag::KEY_REFERENCE as u32, &[id]));
    }
    service.manage_security_environment(mse::SET_KAT, mse_data)?;

    let (shared_secret, own_public_bytes) = match domain {
        Domain::Dh(params) => {
            let sk = params.random_exponent(rng);
            let pk = params.exp(&params.g, &sk);
            let peer_pk = params.decode_element(chip_public_key);
            let shared = params.exp(&peer_pk, &sk);
            (params.encode_element(&shared), params.encode_element(&pk))
        }
        Domain::Ec(curve) => {
            let sk = curve.random_scalar(rng);
            let pk = curve.mul(&sk, &curve.generator());
            let peer_pk = curve.decode_point(chip_public_key)?;
            let shared = agreement::ecdh(curve, &sk, &peer_pk)?;
            (shared, curve.encode_point(&pk)?)
        }
    };

    debug!("CA: sending ephemeral public key via GENERAL AUTHENTICATE");
    let data = tlv::wrap(tag::CA_PUBLIC_KEY as u32, &own_public_bytes);
    let body = tlv::wrap(tag::DYNAMIC_AUTH_DATA as u32, &data);
    service.general_authenticate(body, true)?;

    let (k_enc, k_mac) = kdf::derive_session_keys(&shared_secret, algorithm.cipher)?;
    let cipher = match algorithm.cipher {
        CipherAlg::Tdes112 => Cipher::Tdes,
        _ => Cipher::Aes,
    };

    let pcd_public_key_hash = match algorithm.cipher {
        CipherAlg::Tdes112 | CipherAlg::Aes128 => sha1::Sha1::digest(&own_public_bytes).to_vec(),
        CipherAlg::Aes192 | CipherAlg::Aes256 => Sha256::digest(&own_public_bytes).to_vec(),
    };

    debug!("CA: new secure channel established, replacing the prior channel");
    Ok(ChipAuthenticationResult {
        channel: SecureChannel::new(cipher, k_enc, k_mac, 0),
        pcd_public_key_hash,
    })
}

/// Digest algorithm used for Terminal Authentication's challenge hash
/// (§4.8): tracks the certificate's signature algorithm, which is outside
/// this crate's concern, so the caller states it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaHash {
    Sha1,
    Sha256,
}

/// A terminal's private-key custody is not this crate's concern — callers
/// supply a signer (an HSM session, a file-backed key, whatever the
/// deployment uses) that can produce a signature over the challenge.
pub trait TerminalKey {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Everything Terminal Authentication needs that this crate cannot derive
/// on its own — the certificate chain, the chip identifier, and the
/// ephemeral key hash all come from outside the protocol core (§4.8).
pub struct TerminalAuthenticationRequest<'a> {
    pub cvca_reference: &'a [u8],
    pub certificate_chain: &'a [Vec<u8>],
    pub terminal_certificate_reference: &'a [u8],
    pub auxiliary_data: Option<&'a [u8]>,
    pub id_picc: &'a [u8],
    pub eph_pk_pcd: &'a [u8],
    pub hash: TaHash,
}

/// Run Terminal Authentication (§4.8): present the CVCA-anchored
/// certificate chain, select the terminal's own certificate, and answer
/// the chip's challenge with a signature over
/// `id_picc || rnd_icc || H(eph_pk_pcd)`.
///
/// `eph_pk_pcd` is the terminal's ephemeral public key from the preceding
/// Chip Authentication run; `id_picc` is the chip's identifier as agreed
/// out of band (commonly the Document Security Object's EF.SOD digest, or
/// a CA key hash — again, this crate stays agnostic to where it comes
/// from, per the `Non-goals` on LDS parsing).
pub fn terminal_authentication<T: CardTransport>(
    service: &mut ApduService<T>,
    request: &TerminalAuthenticationRequest<'_>,
    key: &impl TerminalKey,
) -> Result<()> {
    debug!("TA: setting DST to the CVCA reference");
    let dst_data = tlv::wrap(
        tag::CERTIFICATE_HOLDER_REFERENCE as u32,
        request.cvca_reference,
    );
    service.manage_security_environment(mse::SET_DST, dst_data)?;

    debug!("TA: verifying the certificate chain");
    for certificate in request.certificate_chain {
        service.perform_security_operation(
            mse::VERIFY_CERTIFICATE.0,
            mse::VERIFY_CERTIFICATE.1,
            certificate.clone(),
        )?;
    }

    debug!("TA: selecting the terminal's own certificate for external authentication");
    let mut at_data = tlv::wrap(
        tag::CERTIFICATE_HOLDER_REFERENCE as u32,
        request.terminal_certificate_reference,
    );
    if let Some(aux) = request.auxiliary_data {
        at_data.extend(tlv::wrap(tag::AUXILIARY_DATA as u32, aux));
    }
    service.manage_security_environment(mse::SET_AT_EXTERNAL, at_data)?;

    let rnd_icc = service.get_challenge(8)?;

    let eph_pk_hash = match request.hash {
        TaHash::Sha1 => sha1::Sha1::digest(request.eph_pk_pcd).to_vec(),
        TaHash::Sha256 => Sha256::digest(request.eph_pk_pcd).to_vec(),
    };

    let mut message =
        Vec::with_capacity(request.id_picc.len() + rnd_icc.len() + eph_pk_hash.len());
    message.extend_from_slice(request.id_picc);
    message.extend_from_slice(&rnd_icc);
    message.extend_from_slice(&eph_pk_hash);

    let signature = key.sign(&message)?;

    debug!("TA: sending the signature via EXTERNAL AUTHENTICATE");
    service.external_authenticate(signature, 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_for_oid_ca_ecdh_aes128() {
        let oid = [0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x03, 0x02, 0x02];
        let algorithm = algorithm_for_oid(&oid).unwrap();
        assert_eq!(algorithm.agreement, Agreement::Ecdh);
        assert_eq!(algorithm.cipher, CipherAlg::Aes128);
    }

    #[test]
    fn test_algorithm_for_oid_ca_dh_3des() {
        let oid = [0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x03, 0x01, 0x01];
        let algorithm = algorithm_for_oid(&oid).unwrap();
        assert_eq!(algorithm.agreement, Agreement::Dh);
        assert_eq!(algorithm.cipher, CipherAlg::Tdes112);
    }

    #[test]
    fn test_algorithm_for_oid_rejects_unknown_prefix() {
        let oid = [0x01, 0x02, 0x03];
        assert!(algorithm_for_oid(&oid).is_err());
    }

    struct ConstantSigner(Vec<u8>);
    impl TerminalKey for ConstantSigner {
        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_constant_signer_returns_fixed_signature() {
        let signer = ConstantSigner(vec![0xAA; 8]);
        assert_eq!(signer.sign(b"anything").unwrap(), vec![0xAA; 8]);
    }

    /// Always returns the same byte, so `DhParameters::random_exponent`'s
    /// first draw (which is already non-zero mod a small toy prime) is
    /// picked deterministically.
    struct ConstantByteRng(u8);
    impl RngCore for ConstantByteRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }
        fn next_u64(&mut self) -> u64 {
            self.0 as u64
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0);
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }
    impl CryptoRng for ConstantByteRng {}

    #[test]
    fn test_chip_authentication_toy_dh_group() {
        use crate::apdu::ResponseApdu;
        use crate::crypto::agreement::DhParameters;
        use crate::transport::MockTransport;

        // A small safe-prime-like toy group (p=23, g=5), mirroring the one
        // `crypto::agreement`'s own tests use. sk=6 (the rng's constant
        // byte, mod 23) gives pk = 5^6 mod 23 = 8; the peer's static key is
        // fixed at 22 = 5^11 mod 23, whose order-2 subgroup membership
        // (22^2 ≡ 1 mod 23) makes the shared secret 22^6 mod 23 = 1.
        let domain = Domain::Dh(DhParameters {
            p: crate::crypto::agreement::BigUint::from(23u64),
            g: crate::crypto::agreement::BigUint::from(5u64),
            element_size: 1,
        });
        let oid = [0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x03, 0x01, 0x01];
        let chip_public_key = [22u8];

        let mse_data = tlv::wrap(tag::OID as u32, &oid);
        let mse_command = crate::apdu::CommandApdu::new(0x00, 0x22, 0x41, 0xA6)
            .with_data(mse_data)
            .to_bytes()
            .unwrap();

        let own_public_bytes = [8u8];
        let ga_data = tlv::wrap(tag::CA_PUBLIC_KEY as u32, &own_public_bytes);
        let ga_body = tlv::wrap(tag::DYNAMIC_AUTH_DATA as u32, &ga_data);
        let ga_command = crate::apdu::CommandApdu::new(0x00, 0x86, 0x00, 0x00)
            .with_data(ga_body)
            .with_ne(0)
            .to_bytes()
            .unwrap();

        let transport = MockTransport::new()
            .expect(
                mse_command,
                ResponseApdu {
                    data: vec![],
                    sw: 0x9000,
                },
            )
            .expect(
                ga_command,
                ResponseApdu {
                    data: tlv::wrap(tag::DYNAMIC_AUTH_DATA as u32, &[]),
                    sw: 0x9000,
                },
            );
        let mut service = ApduService::new(transport);
        let mut rng = ConstantByteRng(6);

        let result = chip_authentication(
            &mut service,
            &oid,
            &domain,
            &chip_public_key,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.channel.cipher(), Cipher::Tdes);
        assert_eq!(result.channel.ssc(), 0);
        assert_eq!(
            result.pcd_public_key_hash,
            sha1::Sha1::digest(own_public_bytes).to_vec()
        );
    }
}
