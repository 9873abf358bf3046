//! The six payload kinds a block can carry, their canonical JSON shapes
//! and their signature byte messages.
//!
//! Wire shape matters here: field names and the exact byte messages are
//! protocol, so they are spelled out rather than derived from anything.
//! Integers inside payloads are unpadded base64url strings; `hex(x)` in a
//! signature message is the minimal lowercase hexadecimal.

use num::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::block::Block;
use crate::crypto::chaum_pedersen::disj::{prove_encryption, DisjProof, PlaintextOptionsCache};
use crate::crypto::chaum_pedersen::Zkp;
use crate::crypto::elgamal::{Ciphertext, KeyPair, Product, PublicKey, SecretKey};
use crate::crypto::group::Group;
use crate::crypto::schnorr::{ProofOfKnowledge, Signable, Signature};
use crate::crypto::threshold::Trustee;
use crate::crypto::{hex_uint, random};
use crate::election::timing::TimingInfo;
use crate::serialize::canonical;

/// The protocol version a setup payload must carry.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Work level assumed until the genesis block supplies the real one.
pub const DEFAULT_WORK_LEVEL: u32 = 16;

/// The payload kind discriminator carried in every block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadHint {
    ElectionSetup = 1,
    TrusteeShares = 2,
    TrusteePublic = 3,
    VoterReg = 4,
    Ballot = 5,
    PartialTally = 6,
}

impl PayloadHint {
    pub fn from_u8(value: u8) -> Option<PayloadHint> {
        Some(match value {
            1 => PayloadHint::ElectionSetup,
            2 => PayloadHint::TrusteeShares,
            3 => PayloadHint::TrusteePublic,
            4 => PayloadHint::VoterReg,
            5 => PayloadHint::Ballot,
            6 => PayloadHint::PartialTally,
            _ => return None,
        })
    }
}

/// The closed sum of payloads, discriminated by [`PayloadHint`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Setup(ElectionSetup),
    Shares(PayloadTrusteeShares),
    TrusteePublic(PayloadTrusteePublic),
    VoterReg(PayloadVoterRegistration),
    Ballot(PayloadCastVote),
    PartialTally(PayloadPartialTally),
}

impl Payload {
    pub fn hint(&self) -> PayloadHint {
        match self {
            Payload::Setup(_) => PayloadHint::ElectionSetup,
            Payload::Shares(_) => PayloadHint::TrusteeShares,
            Payload::TrusteePublic(_) => PayloadHint::TrusteePublic,
            Payload::VoterReg(_) => PayloadHint::VoterReg,
            Payload::Ballot(_) => PayloadHint::Ballot,
            Payload::PartialTally(_) => PayloadHint::PartialTally,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Payload::Setup(p) => canonical::encode(p),
            Payload::Shares(p) => canonical::encode(p),
            Payload::TrusteePublic(p) => canonical::encode(p),
            Payload::VoterReg(p) => canonical::encode(p),
            Payload::Ballot(p) => canonical::encode(p),
            Payload::PartialTally(p) => canonical::encode(p),
        }
    }

    /// A block carrying this payload, hash and hint filled in; linkage
    /// and proof of work are the chain's job.
    pub fn to_block(&self) -> Result<Block, serde_json::Error> {
        Ok(Block::base(self.hint() as u8, self.encode()?))
    }
}

/// The lowercase hex SHA-256 of a raw voter id, the identity used in
/// state and in every signed message.
pub fn voter_hash(voter_id: &str) -> String {
    hex::encode(Sha256::digest(voter_id.as_bytes()))
}

// ---------------------------------------------------------------------------
// Genesis: election setup

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionSetup {
    #[serde(rename = "protocolVersion")]
    pub version: String,
    pub name: String,
    #[serde(rename = "blockDifficulty")]
    pub difficulty: u32,
    #[serde(rename = "encryptionSharedParams")]
    pub params: Group,
    #[serde(rename = "trusteesRequired")]
    pub trustees_required: usize,
    pub candidates: Vec<String>,
    #[serde(rename = "maxChoices")]
    pub max_choices: usize,
    pub trustees: Vec<TrusteeSetup>,
    pub registrar: RegistrarSetup,
    pub timing: TimingInfo,
}

/// One trustee's entry in the setup payload. The 1-based index is the
/// position in the trustees array, not part of the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrusteeSetup {
    #[serde(skip)]
    pub index: usize,
    pub name: String,
    #[serde(rename = "verificationKey")]
    pub sig_key: PublicKey,
    #[serde(rename = "encryptionKey")]
    pub enc_key: PublicKey,
    #[serde(rename = "encryptionProof")]
    pub enc_proof: ProofOfKnowledge,
    #[serde(rename = "publicExponents", with = "crate::serialize::big_uint::vec")]
    pub exponents: Vec<BigUint>,
    pub signature: Signature,
}

impl Signable for TrusteeSetup {
    fn signature_message(&self) -> Vec<u8> {
        let mut m = format!(
            "trustee:{}:{}:{}",
            self.index,
            self.name,
            hex_uint(&self.enc_key.y)
        );
        for e in &self.exponents {
            m.push(':');
            m.push_str(&hex_uint(e));
        }
        m.into_bytes()
    }
}

impl TrusteeSetup {
    /// Build and self-sign a trustee's setup entry.
    pub fn create(trustee: &Trustee, name: &str) -> TrusteeSetup {
        let group = &trustee.system.group;
        let mut setup = TrusteeSetup {
            index: trustee.index,
            name: name.to_string(),
            sig_key: trustee.keys.sig.public().clone(),
            enc_key: trustee.keys.enc.public().clone(),
            enc_proof: trustee.keys.enc.secret().proof_of_knowledge(group),
            exponents: trustee.public_exponents(),
            signature: Signature {
                challenge: BigUint::from(0_u8),
                response: BigUint::from(0_u8),
            },
        };
        setup.signature = trustee.keys.sig.secret().sign(group, &setup);
        setup
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrarSetup {
    pub name: String,
    #[serde(rename = "verificationKey")]
    pub sig_key: PublicKey,
    #[serde(rename = "registrationURL")]
    pub registration_url: String,
    pub signature: Signature,
}

impl Signable for RegistrarSetup {
    // The registrar self-signature covers the empty message (a protocol
    // 1.0 quirk that the chain format is stuck with).
    fn signature_message(&self) -> Vec<u8> {
        Vec::new()
    }
}

impl RegistrarSetup {
    pub fn create(group: &Group, keys: &KeyPair, name: &str, url: &str) -> RegistrarSetup {
        let mut registrar = RegistrarSetup {
            name: name.to_string(),
            sig_key: keys.public().clone(),
            registration_url: url.to_string(),
            signature: Signature {
                challenge: BigUint::from(0_u8),
                response: BigUint::from(0_u8),
            },
        };
        registrar.signature = keys.secret().sign(group, &registrar);
        registrar
    }
}

// ---------------------------------------------------------------------------
// Phase 1: trustee shares and shard keys

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadTrusteeShares {
    #[serde(rename = "trusteeIndex")]
    pub index: usize,
    pub shares: Vec<EncryptedShare>,
}

/// One polynomial evaluation, encrypted to its recipient. The sender is
/// implied by the enclosing payload and re-attached before any check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedShare {
    #[serde(skip)]
    pub sender: usize,
    pub recipient: usize,
    pub point: Ciphertext,
    pub signature: Signature,
}

impl Signable for EncryptedShare {
    fn signature_message(&self) -> Vec<u8> {
        format!(
            "share:{}:{}:{}:{}",
            self.sender,
            self.recipient,
            hex_uint(&self.point.a),
            hex_uint(&self.point.b)
        )
        .into_bytes()
    }
}

impl PayloadTrusteeShares {
    /// Encrypt this trustee's polynomial evaluation at every other
    /// trustee's index under that trustee's encryption key, signing each.
    pub fn create(trustee: &Trustee, setups: &[TrusteeSetup]) -> PayloadTrusteeShares {
        let group = &trustee.system.group;
        let mut shares = Vec::with_capacity(setups.len().saturating_sub(1));
        for setup in setups {
            if setup.index == trustee.index {
                continue;
            }
            let point = setup
                .enc_key
                .encrypt(group, &trustee.share_for(setup.index), None);
            let mut share = EncryptedShare {
                sender: trustee.index,
                recipient: setup.index,
                point,
                signature: Signature {
                    challenge: BigUint::from(0_u8),
                    response: BigUint::from(0_u8),
                },
            };
            share.signature = trustee.keys.sig.secret().sign(group, &share);
            shares.push(share);
        }
        PayloadTrusteeShares {
            index: trustee.index,
            shares,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadTrusteePublic {
    #[serde(rename = "trusteeIndex")]
    pub index: usize,
    #[serde(rename = "shardKey")]
    pub shard_key: PublicKey,
    #[serde(rename = "shardPoK")]
    pub shard_proof: ProofOfKnowledge,
    pub signature: Signature,
}

impl Signable for PayloadTrusteePublic {
    fn signature_message(&self) -> Vec<u8> {
        format!("shard:{}:{}", self.index, hex_uint(&self.shard_key.y)).into_bytes()
    }
}

impl PayloadTrusteePublic {
    /// Publish the shard key this trustee assembled from its shares.
    pub fn create(trustee: &Trustee) -> PayloadTrusteePublic {
        let group = &trustee.system.group;
        let shard = trustee.shard().expect("shard key not assembled yet");
        let mut payload = PayloadTrusteePublic {
            index: trustee.index,
            shard_key: shard.public().clone(),
            shard_proof: shard.secret().proof_of_knowledge(group),
            signature: Signature {
                challenge: BigUint::from(0_u8),
                response: BigUint::from(0_u8),
            },
        };
        payload.signature = trustee.keys.sig.secret().sign(group, &payload);
        payload
    }
}

// ---------------------------------------------------------------------------
// Phase 2: voter registration

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadVoterRegistration {
    #[serde(rename = "voterId")]
    pub voter_id: String,
    #[serde(rename = "verificationKey")]
    pub signing_key: PublicKey,
    #[serde(rename = "registrarSig")]
    pub registrar_sig: Signature,
    #[serde(rename = "voterSig")]
    pub voter_sig: Signature,
}

impl PayloadVoterRegistration {
    pub fn voter_hash(&self) -> String {
        voter_hash(&self.voter_id)
    }

    /// What the registrar signs: the voter hash bound to the voter's key.
    pub fn registrar_message(&self) -> Vec<u8> {
        format!(
            "voter:r:{}:{}",
            self.voter_hash(),
            hex_uint(&self.signing_key.y)
        )
        .into_bytes()
    }

    /// What the voter signs: the voter hash bound to the registrar's
    /// signature response, chaining the two endorsements together.
    pub fn voter_message(&self) -> Vec<u8> {
        format!(
            "voter:v:{}:{}",
            self.voter_hash(),
            hex_uint(&self.registrar_sig.response)
        )
        .into_bytes()
    }

    /// Enrol a voter: registrar signs first, the voter countersigns.
    pub fn create(
        group: &Group,
        registrar: &SecretKey,
        voter_keys: &KeyPair,
        voter_id: &str,
    ) -> PayloadVoterRegistration {
        let zero = Signature {
            challenge: BigUint::from(0_u8),
            response: BigUint::from(0_u8),
        };
        let mut payload = PayloadVoterRegistration {
            voter_id: voter_id.to_string(),
            signing_key: voter_keys.public().clone(),
            registrar_sig: zero.clone(),
            voter_sig: zero,
        };
        payload.registrar_sig = registrar.sign_message(group, &payload.registrar_message());
        payload.voter_sig = voter_keys
            .secret()
            .sign_message(group, &payload.voter_message());
        payload
    }
}

// ---------------------------------------------------------------------------
// Phase 3: cast votes

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadCastVote {
    #[serde(rename = "voterId")]
    pub voter_id: String,
    /// One exponential ElGamal ciphertext per candidate, each of 0 or 1.
    pub votes: Vec<Ciphertext>,
    /// Per-candidate proofs of encrypting one of {g^0, g^1}.
    pub proofs: Vec<DisjProof>,
    /// Proof that the homomorphic sum encrypts one of {g^0 .. g^max}.
    pub proof: DisjProof,
    pub signature: Signature,
}

impl PayloadCastVote {
    pub fn voter_hash(&self) -> String {
        voter_hash(&self.voter_id)
    }
}

impl Signable for PayloadCastVote {
    fn signature_message(&self) -> Vec<u8> {
        let mut m = format!("ballot:{}", self.voter_hash());
        for v in &self.votes {
            m.push('|');
            m.push_str(&hex_uint(&v.a));
            m.push(':');
            m.push_str(&hex_uint(&v.b));
        }
        m.into_bytes()
    }
}

impl PayloadCastVote {
    /// Encrypt a ballot and build all of its proofs.
    ///
    /// `choices[c]` is true for each selected candidate; at most
    /// `max_choices` may be set. Each candidate ciphertext gets a 0/1
    /// disjunctive proof, and the homomorphic sum (whose randomness is the
    /// sum of the per-candidate randomness) gets the bounding proof.
    pub fn create(
        group: &Group,
        election_key: &PublicKey,
        voter_keys: &KeyPair,
        voter_id: &str,
        choices: &[bool],
        max_choices: usize,
        options: &mut PlaintextOptionsCache,
    ) -> PayloadCastVote {
        let hash = voter_hash(voter_id);
        let zero_or_one = options.get_options(1).to_vec();

        let mut votes = Vec::with_capacity(choices.len());
        let mut proofs = Vec::with_capacity(choices.len());
        let mut sum = Product::new();
        let mut randomness_sum = BigUint::from(0_u8);
        let mut total = 0_usize;

        for &chosen in choices {
            let value = usize::from(chosen);
            total += value;
            let r = random::int_below(&group.q);
            let ct = election_key.encrypt(group, &zero_or_one[value], Some(&r));
            proofs.push(prove_encryption(
                group,
                election_key,
                &ct,
                &zero_or_one,
                value,
                &r,
                hash.as_bytes(),
            ));
            sum.mul(group, &ct);
            randomness_sum = (randomness_sum + r) % &group.q;
            votes.push(ct);
        }

        let sum = sum.into_ciphertext().expect("at least one candidate");
        let sum_options = options.get_options(max_choices).to_vec();
        let proof = prove_encryption(
            group,
            election_key,
            &sum,
            &sum_options,
            total,
            &randomness_sum,
            hash.as_bytes(),
        );

        let mut payload = PayloadCastVote {
            voter_id: voter_id.to_string(),
            votes,
            proofs,
            proof,
            signature: Signature {
                challenge: BigUint::from(0_u8),
                response: BigUint::from(0_u8),
            },
        };
        payload.signature = voter_keys.secret().sign(group, &payload);
        payload
    }
}

// ---------------------------------------------------------------------------
// Phase 4: partial tallies

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadPartialTally {
    #[serde(rename = "trusteeIndex")]
    pub index: usize,
    /// The encrypted per-candidate sums this trustee decrypted against.
    pub tallies: Vec<Ciphertext>,
    /// The partial decryption factors, in candidate order.
    #[serde(with = "crate::serialize::big_uint::vec")]
    pub decrypted: Vec<BigUint>,
    /// Chaum-Pedersen proof per factor.
    pub proofs: Vec<Zkp>,
    pub signature: Signature,
}

impl Signable for PayloadPartialTally {
    fn signature_message(&self) -> Vec<u8> {
        let mut m = format!("tally:{}", self.index);
        for t in &self.tallies {
            m.push(':');
            m.push_str(&hex_uint(&t.a));
            m.push('|');
            m.push_str(&hex_uint(&t.b));
        }
        for d in &self.decrypted {
            m.push(':');
            m.push_str(&hex_uint(d));
        }
        m.into_bytes()
    }
}

impl PayloadPartialTally {
    /// Partially decrypt every candidate tally and prove each factor.
    pub fn create(trustee: &Trustee, tallies: &[Ciphertext]) -> PayloadPartialTally {
        let group = &trustee.system.group;
        let shard = trustee.shard().expect("shard key not assembled yet");
        let mut decrypted = Vec::with_capacity(tallies.len());
        let mut proofs = Vec::with_capacity(tallies.len());
        for ct in tallies {
            decrypted.push(trustee.partial_decrypt(ct));
            proofs.push(crate::crypto::chaum_pedersen::prove_decryption(
                shard.secret(),
                group,
                ct,
            ));
        }
        let mut payload = PayloadPartialTally {
            index: trustee.index,
            tallies: tallies.to_vec(),
            decrypted,
            proofs,
            signature: Signature {
                challenge: BigUint::from(0_u8),
                response: BigUint::from(0_u8),
            },
        };
        payload.signature = trustee.keys.sig.secret().sign(group, &payload);
        payload
    }
}
