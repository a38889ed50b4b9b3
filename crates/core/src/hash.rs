//! Content digests over file chunks.

use std::fmt;

/// An MD5 digest of a stored file's contents, 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Digest a single buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Create an incremental hasher, fed one chunk at a time.
    pub fn hasher() -> Md5Hasher {
        Md5Hasher(md5::Context::new())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 32 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 32 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string, the form persisted in the `md5` field.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Digest({})", self.to_hex())
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental MD5 hasher.
pub struct Md5Hasher(md5::Context);

impl Md5Hasher {
    pub fn update(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    pub fn finalize(self) -> Md5Digest {
        Md5Digest(self.0.compute().0)
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Md5Digest::hasher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        let digest = Md5Digest::compute(b"hello world");
        assert_eq!(digest.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Md5Digest::hasher();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), Md5Digest::compute(b"hello world"));
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Md5Digest::from_hex("abcd").is_err());
        let digest = Md5Digest::compute(b"x");
        assert_eq!(Md5Digest::from_hex(&digest.to_hex()).unwrap(), digest);
    }
}
