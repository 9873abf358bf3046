//! The (t+1, l) threshold decryption scheme.
//!
//! Every trustee derives a degree-`t` polynomial from its secret and
//! publishes `g` raised to each coefficient. The zero-index commitments
//! multiply into the election public key; evaluations of the polynomial at
//! the other trustees' indices, encrypted to them, give each trustee an
//! additive piece of a shard secret key. Any `t+1` shard holders can then
//! jointly decrypt through Lagrange interpolation in the exponent, and
//! nobody ever has to reconstruct the election secret key itself.

use std::collections::BTreeMap;

use num::traits::One;
use num::BigUint;
use serde::{Deserialize, Serialize};

use super::elgamal::{Ciphertext, DerivedKeys, KeyPair, PublicKey};
use super::group::Group;
use super::{hex_uint, random};

/// The shared parameters: `t + 1` of `l` trustees required to decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSystem {
    #[serde(flatten)]
    pub group: Group,
    pub t: usize,
    pub l: usize,
}

impl ThresholdSystem {
    pub fn new(group: Group, trustees_required: usize, total: usize) -> ThresholdSystem {
        ThresholdSystem {
            group,
            t: trustees_required - 1,
            l: total,
        }
    }

    pub fn trustees_required(&self) -> usize {
        self.t + 1
    }

    /// Recompute trustee `index`'s shard public key from every trustee's
    /// exponent commitments: `Y_i = prod_j prod_k E_{j,k}^(i^k) mod p`.
    pub fn shard_public_key(
        &self,
        index: usize,
        exponents: &BTreeMap<usize, Vec<BigUint>>,
    ) -> PublicKey {
        let mut y = BigUint::one();
        for exps in exponents.values() {
            let mut power = BigUint::one(); // index^k
            for e in exps {
                y = y * e.modpow(&power, &self.group.p) % &self.group.p;
                power *= index;
            }
        }
        PublicKey { y }
    }

    /// The Lagrange coefficient for `index` within the subset `indices`,
    /// evaluated at zero: `prod_{k != index} k * (k - index)^-1 mod q`.
    pub fn lagrange(&self, indices: &[usize], index: usize) -> BigUint {
        let q = &self.group.q;
        let mut r = BigUint::one();
        for &k in indices {
            if k == index {
                continue;
            }
            let diff = self
                .group
                .sub_exponent(&BigUint::from(k), &BigUint::from(index));
            r = r * BigUint::from(k) % q * self.group.inverse_exponent(&diff) % q;
        }
        r
    }

    /// Combine partial decryption factors from a subset of trustees into
    /// the plaintext: `ct.b * (prod_i f_i^lambda_i)^-1 mod p`.
    ///
    /// `partials` maps trustee index to factor; every entry is used, so the
    /// caller picks the subset (it must have at least `t + 1` members for
    /// the interpolation to be meaningful).
    pub fn combine(&self, ct: &Ciphertext, partials: &BTreeMap<usize, BigUint>) -> BigUint {
        let indices: Vec<usize> = partials.keys().copied().collect();
        let mut m = BigUint::one();
        for (&i, factor) in partials {
            let lambda = self.lagrange(&indices, i);
            m = m * factor.modpow(&lambda, &self.group.p) % &self.group.p;
        }
        &ct.b * self.group.inverse(&m) % &self.group.p
    }
}

/// Derive the `t + 1` polynomial coefficients for a trustee from its
/// master secret, each reduced into `Z_q`.
pub fn derive_coefficients(group: &Group, secret: &BigUint, t: usize) -> Vec<BigUint> {
    (0..=t)
        .map(|k| {
            let input = format!(
                "coef|{}|{:x}|{}|{:x}",
                hex_uint(&group.p),
                t,
                hex_uint(secret),
                k
            );
            random::oracle(input.as_bytes(), &group.q)
        })
        .collect()
}

/// Does `g^share` match the sender's exponent commitments evaluated at the
/// recipient index?
pub fn check_share(
    group: &Group,
    sender_exponents: &[BigUint],
    recipient: usize,
    share: &BigUint,
) -> bool {
    let mut expected = BigUint::one();
    let mut power = BigUint::one();
    for e in sender_exponents {
        expected = expected * e.modpow(&power, &group.p) % &group.p;
        power *= recipient;
    }
    group.gen_pow(share) == expected
}

/// The prover side of the scheme: one trustee's private material and the
/// operations it performs across the protocol phases. The on-chain
/// validator never needs this; simulators and the integration suite do.
#[derive(Debug, Clone)]
pub struct Trustee {
    pub index: usize, // 1-based
    pub system: ThresholdSystem,
    pub keys: DerivedKeys,
    coefficients: Vec<BigUint>,
    shard: Option<KeyPair>,
}

impl Trustee {
    /// Derive all private material from one secret.
    pub fn create(system: ThresholdSystem, index: usize, secret: &BigUint) -> Trustee {
        let keys = DerivedKeys::derive(&system.group, secret);
        let coefficients = derive_coefficients(&system.group, secret, system.t);
        Trustee {
            index,
            system,
            keys,
            coefficients,
            shard: None,
        }
    }

    /// A trustee with a fresh random secret.
    pub fn generate(system: ThresholdSystem, index: usize) -> Trustee {
        let secret = random::int_below(&system.group.p);
        Trustee::create(system, index, &secret)
    }

    /// `g` raised to each polynomial coefficient; the public commitment.
    pub fn public_exponents(&self) -> Vec<BigUint> {
        self.coefficients
            .iter()
            .map(|c| self.system.group.gen_pow(c))
            .collect()
    }

    /// Evaluate the polynomial at trustee index `j` (Horner, mod q).
    pub fn share_for(&self, j: usize) -> BigUint {
        let q = &self.system.group.q;
        let mut s = BigUint::from(0_u8);
        for c in self.coefficients.iter().rev() {
            s = (s * j + c) % q;
        }
        s
    }

    /// Decrypted shares from every trustee (own index included) sum into
    /// the shard secret key. Returns the shard keypair now held.
    pub fn assemble_shard(&mut self, shares: &BTreeMap<usize, BigUint>) -> &KeyPair {
        let q = &self.system.group.q;
        let mut x = BigUint::from(0_u8);
        for share in shares.values() {
            x = (x + share) % q;
        }
        self.shard = Some(KeyPair::from_secret_scalar(&self.system.group, x));
        self.shard.as_ref().unwrap()
    }

    pub fn shard(&self) -> Option<&KeyPair> {
        self.shard.as_ref()
    }

    /// Decrypt a share addressed to this trustee and check it against the
    /// sender's exponent commitments. A share that fails the check is
    /// grounds for a complaint against the sender.
    pub fn receive_share(
        &self,
        sender_exponents: &[BigUint],
        point: &Ciphertext,
    ) -> Option<BigUint> {
        let share = self.keys.enc.secret().decrypt(&self.system.group, point);
        check_share(&self.system.group, sender_exponents, self.index, &share).then_some(share)
    }

    /// The partial decryption factor `ct.a^x_i mod p`.
    pub fn partial_decrypt(&self, ct: &Ciphertext) -> BigUint {
        let shard = self.shard.as_ref().expect("shard key not assembled yet");
        ct.a.modpow(&shard.secret().x, &self.system.group.p)
    }
}
