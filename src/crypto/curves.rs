//! Standardized PACE/Chip-Authentication domain parameters (ICAO 9303-11
//! §9.2, the `standardizedDomainParameters` id a `PACEInfo`/`ChipAuthenticationInfo`
//! can reference instead of carrying explicit domain parameters).
//!
//! Only the curves/groups actually seen on deployed documents are filled
//! in; anything else falls back to [`crate::error::Error::Unsupported`]
//! rather than a wrong answer. Explicit (non-standardized) domain
//! parameters carried inline in a `PACEDomainParameterInfo` are not decoded
//! by this crate (see DESIGN.md).

use hex_literal::hex;

use super::agreement::{from_be_bytes, BigUint, DhParameters, EcParameters};
use crate::error::{Error, Result};

fn big(hex_bytes: &[u8]) -> BigUint {
    from_be_bytes(hex_bytes)
}

/// Look up the domain parameters for a standardized parameter id (§9.2
/// Table 10). Covers the common NIST/Brainpool curves and RFC 3526 MODP
/// groups seen in the field; returns [`Error::Unsupported`] for ids this
/// build does not carry.
pub fn standardized_parameters(id: u8) -> Result<Domain> {
    match id {
        0 => Ok(Domain::Dh(modp_1024())),
        1 => Ok(Domain::Dh(modp_2048_group14())),
        7 => Ok(Domain::Ec(nist_p256())),
        8 => Ok(Domain::Ec(brainpool_p256r1())),
        9 => Ok(Domain::Ec(brainpool_p384r1())),
        11 => Ok(Domain::Ec(nist_p384())),
        13 => Ok(Domain::Ec(brainpool_p512r1())),
        other => Err(Error::Unsupported(format!(
            "standardized domain parameter id {other} is not in this build's curve table"
        ))),
    }
}

/// Either kind of domain parameters a standardized id can resolve to.
#[derive(Debug, Clone)]
pub enum Domain {
    Dh(DhParameters),
    Ec(EcParameters),
}

fn nist_p256() -> EcParameters {
    EcParameters {
        p: big(&hex!("FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFF")),
        a: big(&hex!("FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFC")),
        b: big(&hex!("5AC635D8AA3A93E7B3EBBD55769886BC651D06B0CC53B0F63BCE3C3E27D2604B")),
        gx: big(&hex!("6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296")),
        gy: big(&hex!("4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5")),
        n: big(&hex!("FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551")),
        field_size: 32,
    }
}

fn nist_p384() -> EcParameters {
    EcParameters {
        p: big(&hex!("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF")),
        a: big(&hex!("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFC")),
        b: big(&hex!("B3312FA7E23EE7E4988E056BE3F82D19181D9C6EFE8141120314088F5013875AC656398D8A2ED19D2A85C8EDD3EC2AEF")),
        gx: big(&hex!("AA87CA22BE8B05378EB1C71EF320AD746E1D3B628BA79B9859F741E082542A385502F25DBF55296C3A545E3872760AB7")),
        gy: big(&hex!("3617DE4A96262C6F5D9E98BF9292DC29F8F41DBD289A147CE9DA3113B5F0B8C00A60B1CE1D7E819D7A431D7C90EA0E5F")),
        n: big(&hex!("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFC7634D81F4372DDF581A0DB248B0A77AECEC196ACCC52973")),
        field_size: 48,
    }
}

fn brainpool_p256r1() -> EcParameters {
    EcParameters {
        p: big(&hex!("A9FB57DBA1EEA9BC3E660A909D838D726E3BF623D52620282013481D1F6E5377")),
        a: big(&hex!("7D5A0975FC2C3057EEF67530417AFFE7FB8055C126DC5C6CE94A4B44F330B5D9")),
        b: big(&hex!("26DC5C6CE94A4B44F330B5D9BBD77CBF958416295CF7E1CE6BCCDC18FF8C07B6")),
        gx: big(&hex!("8BD2AEB9CB7E57CB2C4B482FFC81B7AFB9DE27E1E3BD23C23A4453BD9ACE3262")),
        gy: big(&hex!("547EF835C3DAC4FD97F8461A14611DC9C27745132DED8E545C1D54C72F046997")),
        n: big(&hex!("A9FB57DBA1EEA9BC3E660A909D838D718C397AA3B561A6F7901E0E82974856A7")),
        field_size: 32,
    }
}

fn brainpool_p384r1() -> EcParameters {
    EcParameters {
        p: big(&hex!("8CB91E82A3386D280F5D6F7E50E641DF152F7109ED5456B412B1DA197FB71123ACD3A729901D1A71874700133107EC53")),
        a: big(&hex!("7BC382C63D8C150C3C72080ACE05AFA0C2BEA28E4FB22787139165EFBA91F90F8AA5814A503AD4EB04A8C7DD22CE2826")),
        b: big(&hex!("04A8C7DD22CE28268B39B55416F0447C2FB77DE107DCD2A62E880EA53EEB62D57CB4390295DBC9943AB78696FA504C11")),
        gx: big(&hex!("1D1C64F068CF45FFA2A63A81B7C13F6B8847A3E77EF14FE3DB7FCAFE0CBD10E8E826E03436D646AAEF87B2E247D4AF1E")),
        gy: big(&hex!("8ABE1D7520F9C2A45CB1EB8E95CFD55262B70B29FEEC5864E19C054FF99129280E4646217791811142820341263C5315")),
        n: big(&hex!("8CB91E82A3386D280F5D6F7E50E641DF152F7109ED5456B31F166E6CAC0425A7CF3AB6AF6B7FC3103B883202E9046565")),
        field_size: 48,
    }
}

fn brainpool_p512r1() -> EcParameters {
    EcParameters {
        p: big(&hex!("AADD9DB8DBE9C48B3FD4E6AE33C9FC07CB308DB3B3C9D20ED6639CCA703308717D4D9B009BC66842AECDA12AE6A380E62881FF2F2D82C68528AA6056583A48F3")),
        a: big(&hex!("7830A3318B603B89E2327145AC234CC594CBDD8D3DF91610A83441CAEA9863BC2DED5D5AA8253AA10A2EF1C98B9AC8B57F1117A72BF2C7B9E7C1AC4D77FC94CA")),
        b: big(&hex!("3DF91610A83441CAEA9863BC2DED5D5AA8253AA10A2EF1C98B9AC8B57F1117A72BF2C7B9E7C1AC4D77FC94CADC083E67984050B75EBAE5DD2809BD638016F723")),
        gx: big(&hex!("81AEE4BDD82ED9645A21322E9C4C6A9385ED9F70B5D916B99F6C5F4B4EC6E6B9E5D1C0F17C53E78285024EDEA09A5BC19E30D6C4CEDCEA0FEAE5DF7B9A1FAB4E")),
        gy: big(&hex!("7DDE385D566332ECC0EABFA9CF7822FDF209F70024A57B1AA000C55B881F8111B2DCDE494A5F485E5BCA4BD88A2763AED1CA2B2FA8F0540678CD1E0F3AD80892")),
        n: big(&hex!("AADD9DB8DBE9C48B3FD4E6AE33C9FC07CB308DB3B3C9D20ED6639CCA70330870553E5C414CA92619418661197FAC10471DB1D381085DDADDB58796829CA90069")),
        field_size: 64,
    }
}

fn modp_1024() -> DhParameters {
    // RFC 2409 Oakley Group 2.
    DhParameters {
        p: big(&hex!("FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381FFFFFFFFFFFFFFFF")),
        g: BigUint::from(2u64),
        element_size: 128,
    }
}

fn modp_2048_group14() -> DhParameters {
    // RFC 3526 Group 14.
    DhParameters {
        p: big(&hex!("FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF")),
        g: BigUint::from(2u64),
        element_size: 256,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_id_is_explicit_error() {
        assert!(standardized_parameters(99).is_err());
    }

    #[test]
    fn test_nist_p256_generator_is_on_curve() {
        let curve = nist_p256();
        // y^2 = x^3 + a*x + b (mod p)
        let EcParameters { p, a, b, gx, gy, .. } = &curve;
        let lhs = gy.mul_mod(*gy, *p);
        let rhs = gx
            .mul_mod(*gx, *p)
            .mul_mod(*gx, *p)
            .add_mod(a.mul_mod(*gx, *p), *p)
            .add_mod(*b, *p);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_brainpool_p256r1_generator_is_on_curve() {
        let curve = brainpool_p256r1();
        let EcParameters { p, a, b, gx, gy, .. } = &curve;
        let lhs = gy.mul_mod(*gy, *p);
        let rhs = gx
            .mul_mod(*gx, *p)
            .mul_mod(*gx, *p)
            .add_mod(a.mul_mod(*gx, *p), *p)
            .add_mod(*b, *p);
        assert_eq!(lhs, rhs);
    }
}
