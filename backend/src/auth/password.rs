use sha2::{Digest, Sha256};

/// SHA-256 hex digest, matching the scheme the account database was
/// originally populated with.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    hash_password(password) == stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn verify_accepts_only_the_right_password() {
        let stored = hash_password("rahasia123");
        assert!(verify_password("rahasia123", &stored));
        assert!(!verify_password("rahasia124", &stored));
        assert!(!verify_password("", &stored));
    }
}
