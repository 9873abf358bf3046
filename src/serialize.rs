//! Wire representations: big integers as unpadded base64url, and the
//! canonical JSON encoding every payload hash is computed over.

pub mod big_uint;
pub mod canonical;
