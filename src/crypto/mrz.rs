//! MRZ check digits and the BAC/PACE key seed (§3, §4.1, §4.6 step 1).

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The three MRZ fields a BAC/PACE key seed is derived from.
///
/// `document_number` is normalized by stripping trailing filler characters
/// (`<`) then right-padding back out to 9 characters with `<`, matching the
/// way the MRZ itself pads a short document number (§3).
#[derive(Debug, Clone)]
pub struct MrzKey {
    document_number: String,
    date_of_birth: String,
    date_of_expiry: String,
}

impl MrzKey {
    /// Build an `MrzKey` from raw MRZ field values. `document_number` may be
    /// given either already padded to 9 characters or unpadded; `date_of_birth`
    /// and `date_of_expiry` must each be exactly 6 digits (YYMMDD).
    pub fn new(
        document_number: impl AsRef<str>,
        date_of_birth: impl Into<String>,
        date_of_expiry: impl Into<String>,
    ) -> Result<Self> {
        let document_number = normalize_document_number(document_number.as_ref())?;
        let date_of_birth = date_of_birth.into();
        let date_of_expiry = date_of_expiry.into();
        for (name, field) in [
            ("date_of_birth", &date_of_birth),
            ("date_of_expiry", &date_of_expiry),
        ] {
            if field.len() != 6 || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::Crypto(format!("{name} must be 6 digits (YYMMDD)")));
            }
        }
        Ok(Self {
            document_number,
            date_of_birth,
            date_of_expiry,
        })
    }

    /// Compute the 16-byte BAC/PACE key seed: `SHA1(doc||cd(doc)||dob||cd(dob)||doe||cd(doe))[0..16]`.
    pub fn key_seed(&self) -> [u8; 16] {
        let composite = self.composite_mrz();
        let digest = Sha1::digest(composite.as_bytes());
        digest[0..16].try_into().unwrap()
    }

    /// The concatenated MRZ string the key seed is hashed from, in the
    /// order document_number || check(document_number) || dob || check(dob)
    /// || doe || check(doe) (§4.1, §4.6 step 1).
    pub fn composite_mrz(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.document_number,
            check_digit(&self.document_number),
            self.date_of_birth,
            check_digit(&self.date_of_birth),
            self.date_of_expiry,
            check_digit(&self.date_of_expiry)
        )
    }
}

/// Strip trailing `<` filler, then right-pad with `<` back out to 9
/// characters. Errors if more than 9 significant characters remain.
fn normalize_document_number(raw: &str) -> Result<String> {
    let trimmed = raw.trim_end_matches('<');
    if trimmed.is_empty() || trimmed.len() > 9 {
        return Err(Error::Crypto(
            "document number must have 1-9 significant characters".into(),
        ));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::Crypto(
            "document number must be printable MRZ characters".into(),
        ));
    }
    let mut padded = trimmed.to_string();
    padded.push_str(&"<".repeat(9 - trimmed.len()));
    Ok(padded)
}

/// Value assigned to an MRZ character for check-digit purposes: digits are
/// their own value, letters are `10 + (A=0..Z=25)`, `<` is zero.
fn char_value(c: u8) -> u32 {
    match c {
        b'0'..=b'9' => (c - b'0') as u32,
        b'A'..=b'Z' => (c - b'A') as u32 + 10,
        _ => 0, // '<' and anything else treated as filler
    }
}

/// ICAO 9303-3 §4.9 MRZ check-digit algorithm: weights 7,3,1 cycling over
/// the string, summed mod 10.
pub fn check_digit(field: &str) -> char {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let sum: u32 = field
        .bytes()
        .enumerate()
        .map(|(i, c)| char_value(c) * WEIGHTS[i % 3])
        .sum();
    char::from_digit(sum % 10, 10).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_bac_key_seed_example() {
        // ICAO 9303-11 Appendix D.2 worked example.
        let key = MrzKey::new("L898902C<", "690806", "940623").unwrap();
        assert_eq!(key.composite_mrz(), "L898902C<369080619406236");
        assert_eq!(key.key_seed(), hex!("239AB9CB282DAF66231DC5A4DF6BFBAE"));
    }

    #[test]
    fn test_document_number_padding() {
        // 8 significant characters get re-padded to 9 with a trailing '<'.
        let key = MrzKey::new("L898902C", "690806", "940623").unwrap();
        assert_eq!(key.composite_mrz(), "L898902C<369080619406236");
    }

    #[test]
    fn test_check_digit_examples() {
        assert_eq!(check_digit("L898902C<"), '3');
        assert_eq!(check_digit("690806"), '1');
        assert_eq!(check_digit("940623"), '6');
    }
}
