//! Point-ID derivation for the persistent vector store, grounded on
//! `codeprysm-search::schema::CodePoint::generate_id`.

use std::hash::{Hash, Hasher};

pub fn point_id(chunk_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    chunk_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_deterministic() {
        assert_eq!(point_id("abc123"), point_id("abc123"));
    }
}
