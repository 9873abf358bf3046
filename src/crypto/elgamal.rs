//! ElGamal keys and ciphertexts over a [`Group`].
//!
//! Two usages coexist. Plain ElGamal carries arbitrary plaintexts in `Z_p`
//! (the encrypted polynomial shares). Exponential ElGamal encodes a small
//! integer `m` as `g^m`, which makes ciphertext multiplication add the
//! encoded exponents and is how ballots become tallies; decoding the sum
//! needs the bounded discrete-log step in [`crate::crypto::dlog`].

use num::traits::One;
use num::BigUint;
use serde::{Deserialize, Serialize};

use super::group::Group;
use super::random;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("public key out of range: y < 1")]
    PublicTooSmall,
    #[error("public key out of range: y >= p")]
    PublicTooLarge,
    #[error("secret key out of range: x >= q")]
    SecretTooLarge,
    #[error("public key is not g^x for the secret key")]
    Mismatched,
}

/// A public key for encryption and signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "crate::serialize::big_uint")]
    pub y: BigUint,
}

/// A secret key for decryption and signature creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    #[serde(with = "crate::serialize::big_uint")]
    pub x: BigUint,
    #[serde(flatten)]
    pub public: PublicKey,
}

/// The two halves of a key, generated together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    secret: SecretKey,
}

/// An ElGamal ciphertext `(a, b) = (g^r, y^r * m)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    #[serde(with = "crate::serialize::big_uint")]
    pub a: BigUint,
    #[serde(with = "crate::serialize::big_uint")]
    pub b: BigUint,
}

impl PublicKey {
    /// All we can check without the secret: `1 <= y <= p - 1`.
    pub fn validate(&self, group: &Group) -> Result<(), KeyError> {
        if self.y < BigUint::one() {
            return Err(KeyError::PublicTooSmall);
        }
        if self.y >= group.p {
            return Err(KeyError::PublicTooLarge);
        }
        Ok(())
    }

    /// Encrypt a plaintext in `Z_p`. Pass the randomness when a proof over
    /// it will be built afterwards; `None` draws a fresh `r` from `[0, q)`.
    pub fn encrypt(&self, group: &Group, plaintext: &BigUint, r: Option<&BigUint>) -> Ciphertext {
        let fresh;
        let r = match r {
            Some(r) => r,
            None => {
                fresh = random::int_below(&group.q);
                &fresh
            }
        };
        Ciphertext {
            a: group.gen_pow(r),
            b: self.y.modpow(r, &group.p) * plaintext % &group.p,
        }
    }
}

impl SecretKey {
    /// Check the scalar range (`0 <= x <= q - 1`; the magnitude is never
    /// negative) and consistency with the public half.
    pub fn validate(&self, group: &Group) -> Result<(), KeyError> {
        if self.x >= group.q {
            return Err(KeyError::SecretTooLarge);
        }
        self.public.validate(group)?;
        if group.gen_pow(&self.x) != self.public.y {
            return Err(KeyError::Mismatched);
        }
        Ok(())
    }

    /// Single-key decryption: `b * (a^x)^-1 mod p`.
    pub fn decrypt(&self, group: &Group, ct: &Ciphertext) -> BigUint {
        let shared = ct.a.modpow(&self.x, &group.p);
        group.inverse(&shared) * &ct.b % &group.p
    }
}

impl KeyPair {
    /// A fresh random keypair for the group.
    pub fn generate(group: &Group) -> KeyPair {
        KeyPair::from_secret_scalar(group, random::int_below(&group.q))
    }

    pub fn from_secret_scalar(group: &Group, x: BigUint) -> KeyPair {
        let y = group.gen_pow(&x);
        KeyPair {
            secret: SecretKey {
                x,
                public: PublicKey { y },
            },
        }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public(&self) -> &PublicKey {
        &self.secret.public
    }
}

/// Derived signing and encryption keypairs for one actor, reproducible
/// from a single master secret.
#[derive(Debug, Clone)]
pub struct DerivedKeys {
    pub sig: KeyPair,
    pub enc: KeyPair,
}

impl DerivedKeys {
    /// Derive both keypairs from the master secret through the random
    /// oracle, keyed on the group modulus and the key kind.
    pub fn derive(group: &Group, secret: &BigUint) -> DerivedKeys {
        DerivedKeys {
            sig: derive_key(group, secret, "sig"),
            enc: derive_key(group, secret, "enc"),
        }
    }

    /// Fresh random master secret, then derive.
    pub fn generate(group: &Group) -> DerivedKeys {
        DerivedKeys::derive(group, &random::int_below(&group.p))
    }
}

fn derive_key(group: &Group, secret: &BigUint, kind: &str) -> KeyPair {
    let input = format!(
        "dk|{}|{}|{}",
        super::hex_uint(&group.p),
        super::hex_uint(secret),
        kind
    );
    KeyPair::from_secret_scalar(group, random::oracle(input.as_bytes(), &group.q))
}

impl Ciphertext {
    /// Component-wise product mod `p`; adds the exponents under
    /// exponential encoding.
    pub fn mul(&self, group: &Group, other: &Ciphertext) -> Ciphertext {
        Ciphertext {
            a: &self.a * &other.a % &group.p,
            b: &self.b * &other.b % &group.p,
        }
    }
}

/// Homomorphic accumulator over ciphertexts.
///
/// The identity for the ciphertext product is not a group element, so the
/// empty accumulator is a distinguished state that the first operand
/// promotes.
#[derive(Debug, Clone, Default)]
pub struct Product(Option<Ciphertext>);

impl Product {
    pub fn new() -> Product {
        Product(None)
    }

    pub fn mul(&mut self, group: &Group, ct: &Ciphertext) {
        self.0 = Some(match self.0.take() {
            None => ct.clone(),
            Some(acc) => acc.mul(group, ct),
        });
    }

    /// The accumulated ciphertext, or `None` if nothing was multiplied in.
    pub fn into_ciphertext(self) -> Option<Ciphertext> {
        self.0
    }

    pub fn as_ciphertext(&self) -> Option<&Ciphertext> {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::group;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let group = group::eight_bit();
        let keys = KeyPair::generate(&group);
        for m in [1_u32, 2, 42, 226] {
            let pt = BigUint::from(m);
            let ct = keys.public().encrypt(&group, &pt, None);
            assert_eq!(keys.secret().decrypt(&group, &ct), pt);
        }
    }

    #[test]
    fn decrypt_with_fixed_randomness() {
        let group = group::eight_bit();
        let keys = KeyPair::generate(&group);
        let pt = BigUint::from(99_u32);
        let r = BigUint::from(7_u32);
        let ct = keys.public().encrypt(&group, &pt, Some(&r));
        assert_eq!(keys.secret().decrypt(&group, &ct), pt);
    }

    #[test]
    fn product_is_homomorphic() {
        let group = group::eight_bit();
        let keys = KeyPair::generate(&group);
        let m1 = BigUint::from(3_u32);
        let m2 = BigUint::from(5_u32);
        let ct1 = keys.public().encrypt(&group, &m1, None);
        let ct2 = keys.public().encrypt(&group, &m2, None);
        let combined = ct1.mul(&group, &ct2);
        assert_eq!(
            keys.secret().decrypt(&group, &combined),
            m1 * m2 % &group.p
        );
    }

    #[test]
    fn exponential_encoding_adds() {
        let group = group::eight_bit();
        let keys = KeyPair::generate(&group);
        // g^2 * g^3 should decrypt to g^5.
        let ct1 = keys
            .public()
            .encrypt(&group, &group.gen_pow(&BigUint::from(2_u8)), None);
        let ct2 = keys
            .public()
            .encrypt(&group, &group.gen_pow(&BigUint::from(3_u8)), None);
        let sum = ct1.mul(&group, &ct2);
        assert_eq!(
            keys.secret().decrypt(&group, &sum),
            group.gen_pow(&BigUint::from(5_u8))
        );
    }

    #[test]
    fn empty_product_adopts_first_operand() {
        let group = group::eight_bit();
        let keys = KeyPair::generate(&group);
        let ct = keys.public().encrypt(&group, &BigUint::from(17_u32), None);
        let mut acc = Product::new();
        assert!(acc.as_ciphertext().is_none());
        acc.mul(&group, &ct);
        assert_eq!(acc.into_ciphertext(), Some(ct));
    }

    #[test]
    fn derived_keys_are_deterministic() {
        let group = group::eight_bit();
        let secret = BigUint::from(1234_u32);
        let a = DerivedKeys::derive(&group, &secret);
        let b = DerivedKeys::derive(&group, &secret);
        assert_eq!(a.sig.public(), b.sig.public());
        assert_eq!(a.enc.public(), b.enc.public());
        assert_ne!(a.sig.public(), a.enc.public());
    }

    #[test]
    fn secret_key_range_boundaries() {
        let group = group::eight_bit();
        // x = q - 1 is the top of the range
        let top = KeyPair::from_secret_scalar(&group, &group.q - BigUint::one());
        top.secret().validate(&group).expect("x = q - 1 is in range");
        // x = 0 is a valid secret, pairing with y = g^0 = 1
        let zero = KeyPair::from_secret_scalar(&group, BigUint::from(0_u8));
        zero.secret().validate(&group).expect("x = 0 is in range");
        assert_eq!(zero.public().y, BigUint::one());
        // x = q is out of range, checked before anything else
        let mut sk = top.secret().clone();
        sk.x = group.q.clone();
        sk.public.y = group.gen_pow(&sk.x);
        assert_eq!(sk.validate(&group), Err(KeyError::SecretTooLarge));
    }

    #[test]
    fn public_key_range_boundaries() {
        let group = group::eight_bit();
        let ok = PublicKey {
            y: &group.p - BigUint::one(),
        };
        ok.validate(&group).expect("y = p - 1 is in range");
        let modulus = PublicKey { y: group.p.clone() };
        assert_eq!(modulus.validate(&group), Err(KeyError::PublicTooLarge));
        let zero = PublicKey {
            y: BigUint::from(0_u8),
        };
        assert_eq!(zero.validate(&group), Err(KeyError::PublicTooSmall));
    }

    #[test]
    fn secret_key_validation_catches_mismatch() {
        let group = group::eight_bit();
        let keys = KeyPair::from_secret_scalar(&group, BigUint::from(19_u32));
        let mut sk = keys.secret().clone();
        sk.public.y = (&sk.public.y % &group.p) + BigUint::one();
        assert!(matches!(
            sk.validate(&group),
            Err(KeyError::Mismatched) | Err(KeyError::PublicTooLarge)
        ));
    }
}
