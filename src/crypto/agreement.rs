//! Generic Diffie-Hellman key agreement over explicit domain parameters.
//!
//! PACE and Chip Authentication are deployed over a mix of NIST and
//! Brainpool elliptic curves and classic MODP groups, selected at runtime
//! by the OID the chip advertises (§4.7, §6). Rather than depend on one
//! named-curve crate per curve family, domain parameters are carried as
//! plain big integers and the arithmetic is generic over a single wide
//! [`ruint::Uint`] type, using `ruint`'s modular-arithmetic primitives
//! (`add_mod`/`mul_mod`/`pow_mod`/`inv_mod`) as the actual math — this
//! module only assembles those primitives into EC point and DH group
//! operations (§9 Design Notes, §4.1).

use rand::{CryptoRng, RngCore};
use ruint::Uint;

use crate::error::{Error, Result};

/// Width used for all field/group arithmetic in this module: wide enough
/// for the largest deployed MODP group (3072 bits) and every NIST/Brainpool
/// curve up to P-521/BrainpoolP512 with headroom for intermediate products.
pub type BigUint = Uint<4096, 64>;

pub(crate) fn from_be_bytes(bytes: &[u8]) -> BigUint {
    let mut acc = BigUint::ZERO;
    for &byte in bytes {
        acc = (acc << 8) | BigUint::from(byte);
    }
    acc
}

/// Encode `value` as `len` big-endian bytes, left-padded with zeros.
/// Panics (via truncating silently) only if `value` does not fit in `len`
/// bytes, which would indicate a domain-parameter mismatch upstream.
pub(crate) fn to_be_bytes_padded(value: &BigUint, len: usize) -> Vec<u8> {
    let mask = BigUint::from(0xFFu64);
    let mut v = *value;
    let mut out = vec![0u8; len];
    for i in (0..len).rev() {
        out[i] = (v & mask).to::<u64>() as u8;
        v >>= 8;
    }
    out
}

/// Explicit short-Weierstrass curve domain parameters: `y^2 = x^3 + a*x + b
/// (mod p)`, base point `(gx, gy)` of prime order `n`. Every PACE/CA
/// elliptic curve (NIST P-256/384/521, Brainpool P-{160,192,224,256,320,384,512}r1)
/// is represented this way rather than via a fixed-curve type.
#[derive(Debug, Clone)]
pub struct EcParameters {
    pub p: BigUint,
    pub a: BigUint,
    pub b: BigUint,
    pub gx: BigUint,
    pub gy: BigUint,
    pub n: BigUint,
    /// Encoded field-element width in bytes (e.g. 32 for P-256).
    pub field_size: usize,
}

/// An affine EC point, or the point at infinity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcPoint {
    Infinity,
    Affine { x: BigUint, y: BigUint },
}

impl EcParameters {
    /// The curve's base point, as an [`EcPoint`].
    pub fn generator(&self) -> EcPoint {
        EcPoint::Affine {
            x: self.gx,
            y: self.gy,
        }
    }

    /// Decode an uncompressed SEC1 point (`0x04 || X || Y`, §4.1).
    pub fn decode_point(&self, bytes: &[u8]) -> Result<EcPoint> {
        if bytes.first() != Some(&0x04) {
            return Err(Error::Crypto(
                "expected uncompressed SEC1 EC point (leading 0x04)".into(),
            ));
        }
        let body = &bytes[1..];
        if body.len() != 2 * self.field_size {
            return Err(Error::Crypto(format!(
                "EC point has wrong length: expected {} bytes, got {}",
                2 * self.field_size,
                body.len()
            )));
        }
        let x = from_be_bytes(&body[..self.field_size]);
        let y = from_be_bytes(&body[self.field_size..]);
        Ok(EcPoint::Affine { x, y })
    }

    /// Encode a point as uncompressed SEC1 (`0x04 || X || Y`, field-size
    /// padded).
    pub fn encode_point(&self, point: &EcPoint) -> Result<Vec<u8>> {
        match point {
            EcPoint::Infinity => Err(Error::Crypto("cannot encode point at infinity".into())),
            EcPoint::Affine { x, y } => {
                let mut out = vec![0x04];
                out.extend(to_be_bytes_padded(x, self.field_size));
                out.extend(to_be_bytes_padded(y, self.field_size));
                Ok(out)
            }
        }
    }

    /// Point addition (handles doubling and the identity).
    pub fn add(&self, p: &EcPoint, q: &EcPoint) -> EcPoint {
        let (EcPoint::Affine { x: x1, y: y1 }, EcPoint::Affine { x: x2, y: y2 }) = (p, q) else {
            return match (p, q) {
                (EcPoint::Infinity, other) | (other, EcPoint::Infinity) => other.clone(),
                _ => EcPoint::Infinity,
            };
        };

        if x1 == x2 {
            let y_sum = y1.add_mod(*y2, self.p);
            if y_sum.is_zero() {
                return EcPoint::Infinity; // P + (-P)
            }
            return self.double(p);
        }

        // lambda = (y2 - y1) / (x2 - x1) mod p
        let num = self.sub_mod(*y2, *y1);
        let den = self.sub_mod(*x2, *x1);
        let lambda = self.div_mod(num, den);
        self.add_with_lambda(*x1, *y1, *x2, lambda)
    }

    /// Point doubling.
    pub fn double(&self, p: &EcPoint) -> EcPoint {
        let EcPoint::Affine { x, y } = p else {
            return EcPoint::Infinity;
        };
        if y.is_zero() {
            return EcPoint::Infinity;
        }
        // lambda = (3x^2 + a) / (2y) mod p
        let three_x2 = x.mul_mod(*x, self.p).mul_mod(BigUint::from(3u64), self.p);
        let num = three_x2.add_mod(self.a, self.p);
        let den = y.mul_mod(BigUint::from(2u64), self.p);
        let lambda = self.div_mod(num, den);
        self.add_with_lambda(*x, *y, *x, lambda)
    }

    fn add_with_lambda(&self, x1: BigUint, y1: BigUint, x2: BigUint, lambda: BigUint) -> EcPoint {
        let lambda2 = lambda.mul_mod(lambda, self.p);
        let x3 = self.sub_mod(self.sub_mod(lambda2, x1), x2);
        let y3 = self.sub_mod(lambda.mul_mod(self.sub_mod(x1, x3), self.p), y1);
        EcPoint::Affine { x: x3, y: y3 }
    }

    /// Scalar multiplication via double-and-add.
    pub fn mul(&self, scalar: &BigUint, point: &EcPoint) -> EcPoint {
        let mut result = EcPoint::Infinity;
        let mut addend = point.clone();
        let bits = scalar.bit_len();
        for i in 0..bits {
            if scalar.bit(i) {
                result = self.add(&result, &addend);
            }
            addend = self.double(&addend);
        }
        result
    }

    /// `a + b (mod p)` shorthand used for non-`add_mod`-shaped subtraction.
    fn sub_mod(&self, a: BigUint, b: BigUint) -> BigUint {
        a.add_mod(self.p - (b % self.p), self.p)
    }

    fn div_mod(&self, num: BigUint, den: BigUint) -> BigUint {
        let inv = den.inv_mod(self.p).expect("non-invertible denominator in EC arithmetic");
        num.mul_mod(inv, self.p)
    }

    /// Generate a uniformly random nonzero scalar in `[1, n)`.
    pub fn random_scalar(&self, rng: &mut (impl CryptoRng + RngCore)) -> BigUint {
        loop {
            let mut bytes = vec![0u8; self.field_size];
            rng.fill_bytes(&mut bytes);
            let candidate = from_be_bytes(&bytes) % self.n;
            if !candidate.is_zero() {
                return candidate;
            }
        }
    }
}

/// Explicit finite-field Diffie-Hellman group parameters: prime modulus `p`
/// and generator `g`.
#[derive(Debug, Clone)]
pub struct DhParameters {
    pub p: BigUint,
    pub g: BigUint,
    /// Byte width used to encode group elements on the wire.
    pub element_size: usize,
}

impl DhParameters {
    /// Decode a big-endian group element.
    pub fn decode_element(&self, bytes: &[u8]) -> BigUint {
        from_be_bytes(bytes)
    }

    /// Encode a group element, big-endian, left-padded to `element_size`.
    pub fn encode_element(&self, value: &BigUint) -> Vec<u8> {
        to_be_bytes_padded(value, self.element_size)
    }

    /// `g^exponent mod p`.
    pub fn exp(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        base.pow_mod(*exponent, self.p)
    }

    /// Generate a random private exponent (full width of `p`; the YubiHSM
    /// pattern of field-width random scalars is mirrored here for DH too).
    pub fn random_exponent(&self, rng: &mut (impl CryptoRng + RngCore)) -> BigUint {
        let mut bytes = vec![0u8; self.element_size];
        loop {
            rng.fill_bytes(&mut bytes);
            let candidate = from_be_bytes(&bytes) % self.p;
            if !candidate.is_zero() {
                return candidate;
            }
        }
    }
}

/// ECDH: compute the shared secret as the raw X-coordinate of
/// `sk * peer_public`, big-endian, field-size padded (§4.1).
pub fn ecdh(curve: &EcParameters, sk: &BigUint, peer_public: &EcPoint) -> Result<Vec<u8>> {
    match curve.mul(sk, peer_public) {
        EcPoint::Infinity => Err(Error::Crypto("ECDH produced point at infinity".into())),
        EcPoint::Affine { x, .. } => Ok(to_be_bytes_padded(&x, curve.field_size)),
    }
}

/// DH: compute the shared secret as `peer_public ^ sk mod p`, big-endian,
/// field-size padded (§4.1).
pub fn dh(group: &DhParameters, sk: &BigUint, peer_public: &BigUint) -> Vec<u8> {
    let shared = group.exp(peer_public, sk);
    group.encode_element(&shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny toy curve (not cryptographically meaningful) used only to
    /// exercise point addition/doubling/scalar-mult against a known-order
    /// group, since the real NIST/Brainpool curves are too large to hand-
    /// verify without a reference implementation.
    fn toy_curve() -> EcParameters {
        // y^2 = x^3 + 2x + 2 (mod 17), a curve of order 19 with generator (5, 1).
        EcParameters {
            p: BigUint::from(17u64),
            a: BigUint::from(2u64),
            b: BigUint::from(2u64),
            gx: BigUint::from(5u64),
            gy: BigUint::from(1u64),
            n: BigUint::from(19u64),
            field_size: 1,
        }
    }

    #[test]
    fn test_toy_curve_order() {
        let curve = toy_curve();
        let g = curve.generator();
        // n * G must be the point at infinity.
        let result = curve.mul(&curve.n, &g);
        assert_eq!(result, EcPoint::Infinity);
    }

    #[test]
    fn test_toy_curve_diffie_hellman_agrees() {
        let curve = toy_curve();
        let g = curve.generator();
        let a = BigUint::from(6u64);
        let b = BigUint::from(11u64);

        let pa = curve.mul(&a, &g);
        let pb = curve.mul(&b, &g);

        let shared_a = ecdh(&curve, &a, &pb).unwrap();
        let shared_b = ecdh(&curve, &b, &pa).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn test_dh_agrees() {
        // A small safe-prime-like toy group, again only to exercise the math.
        let group = DhParameters {
            p: BigUint::from(23u64),
            g: BigUint::from(5u64),
            element_size: 1,
        };
        let a = BigUint::from(6u64);
        let b = BigUint::from(15u64);
        let pa = group.exp(&group.g, &a);
        let pb = group.exp(&group.g, &b);
        assert_eq!(dh(&group, &a, &pb), dh(&group, &b, &pa));
    }

    #[test]
    fn test_point_encode_decode_roundtrip() {
        let curve = EcParameters {
            field_size: 4,
            ..toy_curve()
        };
        let point = EcPoint::Affine {
            x: BigUint::from(5u64),
            y: BigUint::from(1u64),
        };
        let encoded = curve.encode_point(&point).unwrap();
        assert_eq!(encoded.len(), 1 + 2 * 4);
        let decoded = curve.decode_point(&encoded).unwrap();
        assert_eq!(decoded, point);
    }
}
