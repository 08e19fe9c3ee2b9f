//! Credential storage that stays out of logs.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Password or token held by the client configuration.
///
/// `Debug` and `Display` print `[REDACTED]`; the buffer is zeroed on drop.
/// [`expose`](Self::expose) is the only way to read the value and is used
/// when the `Authorization` header is rendered.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn formatting_never_shows_password() {
        let secret = SecretString::new("hunter2");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_stored_token() {
        let secret = SecretString::from("tok123");
        assert_eq!(secret.expose(), "tok123");
    }

    #[test]
    fn zeroize_empties_buffer() {
        let mut secret = SecretString::new("sensitive");
        secret.zeroize();
        assert!(secret.expose().is_empty());
    }
}
