//! Credential verification

/// Compares a stored password with the one supplied at login
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, stored: &str, provided: &str) -> bool;
}

/// Exact string comparison against the stored value
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextVerifier;

impl CredentialVerifier for PlainTextVerifier {
    fn verify(&self, stored: &str, provided: &str) -> bool {
        stored == provided
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_exact() {
        let verifier = PlainTextVerifier;
        assert!(verifier.verify("s3cret", "s3cret"));
        assert!(!verifier.verify("s3cret", "S3cret"));
        assert!(!verifier.verify("s3cret", "s3cret "));
    }
}
