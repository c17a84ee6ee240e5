use rand::{distributions::Alphanumeric, Rng};

use crate::config;

pub fn hash_password(plain: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plain, config::config().security.bcrypt_cost)
}

/// Constant-time bcrypt comparison; malformed hashes never match.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    bcrypt::verify(plain, hashed).unwrap_or(false)
}

/// Random alphanumeric string used for client secrets, reset tokens and
/// passwords of accounts created through social login or import.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = bcrypt::hash("password", 4).unwrap();
        assert!(verify_password("password", &hashed));
        assert!(!verify_password("Password", &hashed));
    }

    #[test]
    fn garbage_hash_does_not_match() {
        assert!(!verify_password("password", "not-a-bcrypt-hash"));
    }

    #[test]
    fn random_string_has_requested_length() {
        let s = random_string(40);
        assert_eq!(s.len(), 40);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, random_string(40));
    }
}
