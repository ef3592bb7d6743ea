use crate::error::{AppError, Result};

/// The longest user name or password accepted at sign in.
const MAX_CREDENTIAL_LEN: usize = 128;

/// Validates a username.
///
/// # Arguments
///
/// * `username` - The username to validate, typically an email address.
///
/// # Returns
///
/// A `Result<()>` indicating whether the username is valid.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }

    if username.chars().count() > MAX_CREDENTIAL_LEN {
        return Err(AppError::Validation(
            "Username must be at most 128 characters".to_string(),
        ));
    }

    if username.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(
            "Username cannot contain whitespace".to_string(),
        ));
    }

    Ok(())
}

/// Validates a password.
///
/// # Arguments
///
/// * `password` - The password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is valid.
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    if password.chars().count() > MAX_CREDENTIAL_LEN {
        return Err(AppError::Validation(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("jesse@example.org").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("jesse caulfield").is_err());
        assert!(validate_username(&"a".repeat(128)).is_ok());
        assert!(validate_username(&"a".repeat(129)).is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_password("x").is_ok());
        assert!(validate_password("correct horse battery staple").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"é".repeat(128)).is_ok());
        assert!(validate_password(&"é".repeat(129)).is_err());
    }
}
