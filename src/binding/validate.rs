//! Token name validation
//!
//! Template tokens name a binding data entry, optionally followed by a path:
//! - Start with an ASCII letter or underscore
//! - Continue with letters, digits, `_`, `-`, `.`, `[` and `]`
//!
//! Manual single-pass check, no allocations on success.

use crate::error::BindError;

/// Validate a `{token}` body. `position` is the token's offset in its template.
pub fn validate_token_name(token: &str, position: usize) -> Result<(), BindError> {
    let invalid = |reason: &str| BindError::TemplateParse {
        position,
        details: format!("invalid token '{{{token}}}': {reason}"),
    };

    let Some(&first) = token.as_bytes().first() else {
        return Err(invalid("token cannot be empty"));
    };

    if !first.is_ascii_alphabetic() && first != b'_' {
        return Err(invalid("must start with a letter or underscore"));
    }

    for &byte in &token.as_bytes()[1..] {
        if !byte.is_ascii_alphanumeric() && !matches!(byte, b'_' | b'-' | b'.' | b'[' | b']') {
            return Err(invalid(
                "only letters, digits, '_', '-', '.', '[' and ']' are allowed",
            ));
        }
    }

    Ok(())
}
