use std::time::{SystemTime, UNIX_EPOCH};

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::rngs::OsRng;

use super::RepositoryError;

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Argon2id hash in PHC string form, ready for `sys_users.password_hash`.
pub fn hash_password(password: &str) -> Result<String, RepositoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RepositoryError::Hash(e.to_string()))
}

/// Check `password` against a stored hash.
///
/// `Ok(false)` is a wrong password; an unparsable stored hash is a corrupt
/// record, not a failed login.
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, RepositoryError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| RepositoryError::Corrupt(format!("password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Usernames are 3-64 chars of alphanumerics, `_`, `-` or `.`.
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    if !(3..=64).contains(&len) {
        return false;
    }

    username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Trim and drop NUL bytes.
pub fn sanitize_string(input: &str) -> String {
    input.replace('\0', "").trim().to_string()
}
