//! Identifier Hasher
//!
//! User-chosen collection and field names may contain characters that
//! are illegal in SQL identifiers, or collide after case-folding. The
//! physical name of every relation and column is therefore a digest of
//! the user name, never the name itself; the metadata relations keep
//! the mapping from human name to digest.
//!
//! The digest function is pure and versioned: the version byte is part
//! of the emitted identifier, so a future migration can detect and
//! upgrade old digests.

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Current digest version, embedded in every physical identifier
pub const DIGEST_VERSION: u8 = 1;

/// Separator between the collection and field parts of a qualified
/// digest input, so `("ab", "c")` and `("a", "bc")` cannot collide
const QUALIFIER: char = '\u{1f}';

/// Physical table name for a collection
pub fn table_name(collection: &str) -> String {
    digest(collection)
}

/// Physical column name for a field, qualified by its collection
pub fn column_name(collection: &str, field: &str) -> String {
    digest(&format!("{collection}{QUALIFIER}{field}"))
}

/// Fixed-length, engine-legal identifier: a version tag followed by
/// 128 bits of SHA-256 in lowercase hex. Always starts with a letter.
fn digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(36);
    out.push('i');
    out.push(char::from(b'0' + DIGEST_VERSION));
    out.push('_');
    for byte in &hash[..16] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_and_fixed_length() {
        let a = table_name("subjects");
        let b = table_name("subjects");
        assert_eq!(a, b);
        assert_eq!(a.len(), 35);
        assert!(a.starts_with("i1_"));
    }

    #[test]
    fn test_distinct_names_distinct_digests() {
        assert_ne!(table_name("a"), table_name("b"));
        assert_ne!(column_name("c", "f1"), column_name("c", "f2"));
        assert_ne!(column_name("c1", "f"), column_name("c2", "f"));
    }

    #[test]
    fn test_qualified_digest_has_no_concat_collisions() {
        assert_ne!(column_name("ab", "c"), column_name("a", "bc"));
    }

    #[test]
    fn test_awkward_names_become_legal_identifiers() {
        for name in ["has spaces", "semi;colon", "42starts_with_digit", "émoji☂"] {
            let physical = table_name(name);
            assert!(physical.chars().next().unwrap().is_ascii_alphabetic());
            assert!(physical
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }
}
