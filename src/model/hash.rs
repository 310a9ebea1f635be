use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

pub const HASH_LEN: usize = 20;

/// A 20-byte content hash naming an immutable backing-store object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHash(pub [u8; HASH_LEN]);

impl ObjectHash {
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn sha1_of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_vector() {
        // sha1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        let hash = ObjectHash::sha1_of(b"abc");
        assert_eq!(
            hash.to_string(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_distinct_content_distinct_hash() {
        assert_ne!(ObjectHash::sha1_of(b"a"), ObjectHash::sha1_of(b"b"));
        assert_eq!(ObjectHash::sha1_of(b"a"), ObjectHash::sha1_of(b"a"));
    }
}
