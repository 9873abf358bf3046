//! Serde representation for `BigUint` fields: unpadded base64url of the
//! big-endian magnitude bytes. Zero is the empty string (no magnitude
//! bytes), matching the natural byte representation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num::traits::Zero;
use num::BigUint;
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn to_string(value: &BigUint) -> String {
    if value.is_zero() {
        return String::new();
    }
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

pub fn from_str(s: &str) -> Result<BigUint, base64::DecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(s)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_string(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    from_str(&s).map_err(|_| {
        de::Error::custom(format!(
            "expecting unpadded base64url encoded data, got: {}",
            s
        ))
    })
}

/// The same representation for `Vec<BigUint>` fields.
pub mod vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(values: &[BigUint], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&super::to_string(v))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<BigUint>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| {
                super::from_str(s).map_err(|_| {
                    de::Error::custom(format!(
                        "expecting unpadded base64url encoded data, got: {}",
                        s
                    ))
                })
            })
            .collect()
    }
}
