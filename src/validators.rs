//! Input validation utilities for the identity bridge
use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

// Compile regex patterns once at startup
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Hardcoded and validated; a compile-time constant in practice
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]{5,19}$")
        .expect("hardcoded phone regex is invalid - fix source code")
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Validate phone number shape (digits with optional +, spaces, dashes)
pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

/// validator crate compatible custom validator for phone shape
pub fn validate_phone_shape(phone: &str) -> Result<(), ValidationError> {
    if validate_phone(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

/// Validate one-time code shape: fixed-length numeric
pub fn validate_code_shape(code: &str, expected_len: usize) -> bool {
    code.len() == expected_len && code.chars().all(|c| c.is_ascii_digit())
}

/// Minimum password shape accepted before the provider sees it
///
/// Strength scoring is the provider's concern; this only rejects inputs that
/// would never be accepted anywhere.
pub fn validate_password_shape(password: &str) -> bool {
    password.len() >= 8 && password.len() <= 128
}

/// Mask an email address for log output
pub fn mask_email(email: &str) -> String {
    if let Some(at_pos) = email.find('@') {
        let local = &email[..at_pos];
        let domain = &email[at_pos..];
        if local.len() <= 2 {
            format!("**{}", domain)
        } else {
            format!("{}***{}", &local[..1], domain)
        }
    } else {
        "***@***".to_string()
    }
}
