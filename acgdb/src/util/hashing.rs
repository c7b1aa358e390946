use crate::error::Result;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Computes the hex SHA-256 digest of the record's JSON serialization.
///
/// Struct fields serialize in declaration order, so equal content always gives an equal hash.
pub fn hash_of<T: Serialize>(record: &T) -> Result<String> {
    let encoded = serde_json::to_vec(record)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}
