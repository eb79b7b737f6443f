use crate::constants::BATCH_ID_NAMESPACE;
use crate::domain::SchemaType;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Hex sha256 of an uploaded file. Identical bytes are the same batch.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Batch ids are derived from the content hash, so a re-submitted file maps to the same id.
pub fn batch_id_for(content_hash: &str) -> Uuid {
    Uuid::new_v5(&BATCH_ID_NAMESPACE, content_hash.as_bytes())
}

/// Identity of a Bronze row within its schema type.
pub fn source_row_hash(
    schema: SchemaType,
    batch_id: &Uuid,
    source_row: u64,
    fields: &BTreeMap<String, String>,
) -> String {
    // Simple canonical string; fields are already in key order
    let mut s = String::new();
    s.push_str(schema.as_str());
    s.push('|');
    s.push_str(&batch_id.to_string());
    s.push('|');
    s.push_str(&source_row.to_string());
    for (k, v) in fields {
        s.push('|');
        s.push_str(k);
        s.push('=');
        s.push_str(v);
    }

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_id_is_stable_for_same_content() {
        let a = batch_id_for(&content_hash(b"date,state\n"));
        let b = batch_id_for(&content_hash(b"date,state\n"));
        let c = batch_id_for(&content_hash(b"date,state,district\n"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_row_hash_depends_on_row_number() {
        let id = batch_id_for("abc");
        let mut fields = BTreeMap::new();
        fields.insert("pincode".to_string(), "560001".to_string());
        let first = source_row_hash(SchemaType::Enrolment, &id, 2, &fields);
        let second = source_row_hash(SchemaType::Enrolment, &id, 3, &fields);
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
    }
}
