//! Basic Access Control (§4.6).
//!
//! BAC is a mutual-authentication protocol run over `GET CHALLENGE` /
//! `EXTERNAL AUTHENTICATE`, yielding a 3DES [`SecureChannel`]. Superseded by
//! PACE on newer documents, but still the fallback most deployed readers
//! exercise first (§4.6 Non-goals: no chip-clock/timing-side-channel handling).

use log::debug;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{
    crypto::{des, kdf, mrz::MrzKey},
    error::{Error, Result},
    secure_channel::{Cipher, SecureChannel},
    service::ApduService,
    transport::CardTransport,
};

/// Run the 11-step BAC mutual-authentication protocol (§4.6) and return the
/// resulting secure channel. `service` must already have the MRTD
/// application selected.
pub fn run<T: CardTransport, R: RngCore + CryptoRng>(
    service: &mut ApduService<T>,
    mrz: &MrzKey,
    rng: &mut R,
) -> Result<SecureChannel> {
    let key_seed = mrz.key_seed();
    let (mut k_enc, mut k_mac) = kdf::derive_session_keys(&key_seed, kdf::CipherAlg::Tdes112)?;
    let k_enc_static: [u8; 16] = k_enc.clone().try_into().unwrap();
    let k_mac_static: [u8; 16] = k_mac.clone().try_into().unwrap();

    debug!("BAC: requesting challenge from the card");
    // Step 2: GET CHALLENGE.
    let rnd_icc: [u8; 8] = service.get_challenge(8)?.try_into().map_err(|_| {
        Error::BacDenied
    })?;

    // Step 3: the IFD picks its own nonce and an ephemeral key.
    let mut rnd_ifd = [0u8; 8];
    rng.fill_bytes(&mut rnd_ifd);
    let mut k_ifd = [0u8; 16];
    rng.fill_bytes(&mut k_ifd);

    // Step 4: S = RND.IFD || RND.ICC || K.IFD, encrypted and MACed.
    let mut s = Vec::with_capacity(32);
    s.extend_from_slice(&rnd_ifd);
    s.extend_from_slice(&rnd_icc);
    s.extend_from_slice(&k_ifd);
    let iv = [0u8; 8];
    des::enc_cbc(&k_enc_static, &iv, &mut s)?;
    let e_ifd = s;
    let mac_ifd = des::retail_mac(&k_mac_static, &e_ifd);

    let mut cryptogram = e_ifd.clone();
    cryptogram.extend_from_slice(&mac_ifd);

    debug!("BAC: sending EXTERNAL AUTHENTICATE");
    // Step 6: EXTERNAL AUTHENTICATE with that cryptogram; the card answers
    // with its own (e_icc || mac_icc) of the same shape. Some cards reject
    // an explicit Le=40 outright and only answer when Le=0 ("no particular
    // length expected"); retry once with Le=0 before giving up (§9).
    let response = match service.external_authenticate(cryptogram.clone(), 40) {
        Ok(response) if response.len() == 40 => response,
        _ => service.external_authenticate(cryptogram, 0)?,
    };
    if response.len() != 40 {
        return Err(Error::BacDenied);
    }
    let (e_icc, mac_icc) = response.split_at(32);

    let expected_mac = des::retail_mac(&k_mac_static, e_icc);
    if expected_mac != mac_icc {
        return Err(Error::BacDenied);
    }

    let mut plaintext = e_icc.to_vec();
    des::dec_cbc(&k_enc_static, &iv, &mut plaintext)?;
    let rnd_icc_echo = &plaintext[0..8];
    let rnd_ifd_echo = &plaintext[8..16];
    let k_icc: [u8; 16] = plaintext[16..32].try_into().unwrap();

    // Step 8: both nonces must match what was exchanged (mutual auth).
    if rnd_icc_echo != rnd_icc || rnd_ifd_echo != rnd_ifd {
        return Err(Error::BacDenied);
    }

    // Step 9/10: session key seed is K.IFD XOR K.ICC; derive session keys
    // and the initial SSC from the low 4 bytes of each nonce.
    let mut session_seed = [0u8; 16];
    for i in 0..16 {
        session_seed[i] = k_ifd[i] ^ k_icc[i];
    }
    let (session_k_enc, session_k_mac) =
        kdf::derive_session_keys(&session_seed, kdf::CipherAlg::Tdes112)?;

    let mut ssc_bytes = [0u8; 8];
    ssc_bytes[0..4].copy_from_slice(&rnd_icc[4..8]);
    ssc_bytes[4..8].copy_from_slice(&rnd_ifd[4..8]);
    let ssc = u64::from_be_bytes(ssc_bytes) as u128;

    debug!("BAC: mutual authentication succeeded, session established");

    k_enc.zeroize();
    k_mac.zeroize();
    session_seed.zeroize();

    Ok(SecureChannel::new(
        Cipher::Tdes,
        session_k_enc,
        session_k_mac,
        ssc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::ResponseApdu;
    use crate::transport::MockTransport;
    use hex_literal::hex;

    /// A deterministic RNG standing in for the IFD's random nonce/key
    /// generation, wired to produce exactly the ICAO 9303-11 Appendix D.2
    /// worked-example values.
    struct FixedRng {
        rnd_ifd: [u8; 8],
        k_ifd: [u8; 16],
        pos: usize,
        buf: Vec<u8>,
    }

    impl FixedRng {
        fn new(rnd_ifd: [u8; 8], k_ifd: [u8; 16]) -> Self {
            let mut buf = rnd_ifd.to_vec();
            buf.extend(k_ifd);
            Self {
                rnd_ifd,
                k_ifd,
                pos: 0,
                buf,
            }
        }
    }

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            let mut b = [0u8; 4];
            self.fill_bytes(&mut b);
            u32::from_le_bytes(b)
        }
        fn next_u64(&mut self) -> u64 {
            let mut b = [0u8; 8];
            self.fill_bytes(&mut b);
            u64::from_le_bytes(b)
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest {
                *b = self.buf[self.pos % self.buf.len()];
                self.pos += 1;
            }
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }
    impl CryptoRng for FixedRng {}

    #[test]
    fn test_bac_full_exchange_matches_worked_example() {
        // ICAO 9303-11 Appendix D.2 nonces/keys; the card's own cryptogram
        // is computed here rather than hardcoded, which exercises the same
        // decrypt/MAC-verify path `run` uses without depending on a second
        // transcribed vector.
        let mrz = MrzKey::new("L898902C<", "690806", "940623").unwrap();
        let rnd_icc: [u8; 8] = hex!("4608F91988702212");
        let rnd_ifd: [u8; 8] = hex!("781723860C06C226");
        let k_ifd: [u8; 16] = hex!("0B795240CB7049B01C19B33E32804F0B");
        let k_icc: [u8; 16] = hex!("0B4F8032323EB3191C19B04970CB4052");

        let k_enc: [u8; 16] = hex!("AB94FDECF2674FDFB9B391F85D7F76F2");
        let k_mac: [u8; 16] = hex!("7962D9ECE03D1ACD4C76089DCE131543");

        let mut s_ifd = Vec::new();
        s_ifd.extend_from_slice(&rnd_ifd);
        s_ifd.extend_from_slice(&rnd_icc);
        s_ifd.extend_from_slice(&k_ifd);
        des::enc_cbc(&k_enc, &[0u8; 8], &mut s_ifd).unwrap();
        let mac_ifd = des::retail_mac(&k_mac, &s_ifd);
        let mut cryptogram = s_ifd.clone();
        cryptogram.extend(mac_ifd);

        let mut s_icc = Vec::new();
        s_icc.extend_from_slice(&rnd_icc);
        s_icc.extend_from_slice(&rnd_ifd);
        s_icc.extend_from_slice(&k_icc);
        des::enc_cbc(&k_enc, &[0u8; 8], &mut s_icc).unwrap();
        let mac_icc = des::retail_mac(&k_mac, &s_icc);
        let mut response_body = s_icc;
        response_body.extend(mac_icc);

        let mut command_bytes = vec![0x00, 0x82, 0x00, 0x00, 0x28];
        command_bytes.extend(&cryptogram);
        command_bytes.push(0x28);

        let transport = MockTransport::new()
            .expect(
                vec![0x00, 0x84, 0x00, 0x00, 0x08],
                ResponseApdu {
                    data: rnd_icc.to_vec(),
                    sw: 0x9000,
                },
            )
            .expect(
                command_bytes,
                ResponseApdu {
                    data: response_body,
                    sw: 0x9000,
                },
            );

        let mut service = ApduService::new(transport);
        let mut rng = FixedRng::new(rnd_ifd, k_ifd);
        let channel = run(&mut service, &mrz, &mut rng).unwrap();
        assert_eq!(channel.cipher(), Cipher::Tdes);
        // Initial SSC = last 4 bytes of RND.ICC || last 4 bytes of RND.IFD,
        // before any wrap/unwrap increments it (those start from here).
        assert_eq!(channel.ssc(), 0x887022120C06C226u128);
    }

    #[test]
    fn test_bac_retries_external_authenticate_with_le_zero() {
        // A card that rejects the explicit Le=40 with a wrong-length status
        // must still succeed once retried with Le=0.
        let mrz = MrzKey::new("L898902C<", "690806", "940623").unwrap();
        let rnd_icc: [u8; 8] = hex!("4608F91988702212");
        let rnd_ifd: [u8; 8] = hex!("781723860C06C226");
        let k_ifd: [u8; 16] = hex!("0B795240CB7049B01C19B33E32804F0B");
        let k_icc: [u8; 16] = hex!("0B4F8032323EB3191C19B04970CB4052");

        let k_enc: [u8; 16] = hex!("AB94FDECF2674FDFB9B391F85D7F76F2");
        let k_mac: [u8; 16] = hex!("7962D9ECE03D1ACD4C76089DCE131543");

        let mut s_ifd = Vec::new();
        s_ifd.extend_from_slice(&rnd_ifd);
        s_ifd.extend_from_slice(&rnd_icc);
        s_ifd.extend_from_slice(&k_ifd);
        des::enc_cbc(&k_enc, &[0u8; 8], &mut s_ifd).unwrap();
        let mac_ifd = des::retail_mac(&k_mac, &s_ifd);
        let mut cryptogram = s_ifd.clone();
        cryptogram.extend(mac_ifd);

        let mut s_icc = Vec::new();
        s_icc.extend_from_slice(&rnd_icc);
        s_icc.extend_from_slice(&rnd_ifd);
        s_icc.extend_from_slice(&k_icc);
        des::enc_cbc(&k_enc, &[0u8; 8], &mut s_icc).unwrap();
        let mac_icc = des::retail_mac(&k_mac, &s_icc);
        let mut response_body = s_icc;
        response_body.extend(mac_icc);

        let mut le40_command = vec![0x00, 0x82, 0x00, 0x00, 0x28];
        le40_command.extend(&cryptogram);
        le40_command.push(0x28);

        let mut le0_command = vec![0x00, 0x82, 0x00, 0x00, 0x28];
        le0_command.extend(&cryptogram);
        le0_command.push(0x00);

        let transport = MockTransport::new()
            .expect(
                vec![0x00, 0x84, 0x00, 0x00, 0x08],
                ResponseApdu {
                    data: rnd_icc.to_vec(),
                    sw: 0x9000,
                },
            )
            .expect(
                le40_command,
                ResponseApdu {
                    data: vec![],
                    sw: 0x6700,
                },
            )
            .expect(
                le0_command,
                ResponseApdu {
                    data: response_body,
                    sw: 0x9000,
                },
            );

        let mut service = ApduService::new(transport);
        let mut rng = FixedRng::new(rnd_ifd, k_ifd);
        let channel = run(&mut service, &mrz, &mut rng).unwrap();
        assert_eq!(channel.cipher(), Cipher::Tdes);
    }
}
