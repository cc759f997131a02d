use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::threadrand::SecureRng;

pub const TOKEN_BYTES: usize = 32;
pub const SUFFIX_LENGTH: usize = 6;

/// A freshly-generated bearer token. Only `digest` and `suffix` are ever
/// persisted; the token itself is returned to the client once and then
/// discarded.
pub struct SessionToken {
    pub token: String,
    pub digest: Vec<u8>,
    pub suffix: String,
}

impl SessionToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        SecureRng.fill_bytes(&mut bytes);

        let token = b64.encode(bytes);
        let digest = digest_token(&token);
        let suffix = String::from(token_suffix(&token));

        Self {
            token,
            digest,
            suffix,
        }
    }
}

pub fn digest_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

pub fn token_suffix(token: &str) -> &str {
    if token.len() > SUFFIX_LENGTH {
        &token[token.len() - SUFFIX_LENGTH..]
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let token = SessionToken::generate();

        assert_eq!(token.digest, digest_token(&token.token));
        assert_eq!(token.suffix, token_suffix(&token.token));
        assert_eq!(token.suffix.len(), SUFFIX_LENGTH);

        // 32 bytes of standard base64
        assert_eq!(token.token.len(), 44);
    }

    #[test]
    fn test_tokens_are_unique() {
        let first = SessionToken::generate();
        let second = SessionToken::generate();

        assert_ne!(first.token, second.token);
        assert_ne!(first.digest, second.digest);
    }

    #[test]
    fn test_digest_is_not_reversible_prefix() {
        let token = SessionToken::generate();

        // The digest must not leak any part of the token itself
        assert!(!token.token.as_bytes().starts_with(&token.digest[..4]));
        assert_eq!(token.digest.len(), 32);
    }

    #[test]
    fn test_short_token_suffix() {
        assert_eq!(token_suffix("abc"), "abc");
        assert_eq!(token_suffix("abcdefgh"), "cdefgh");
    }
}
