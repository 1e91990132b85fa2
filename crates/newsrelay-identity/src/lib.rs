//! Identity primitives for the newsrelay bridge.
//!
//! Every registered feed gets its own keypair, derived deterministically from
//! the bridge secret and the concrete feed URL. Nothing about the key is
//! stored beyond the entity record, so re-deriving with the same inputs must
//! always produce the same key.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

mod signer;

pub use signer::{event_id, finalize, EventSigner, Secp256k1Signer};

type HmacSha256 = Hmac<Sha256>;

/// Errors produced while deriving keys or signing events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The private key is not valid hex or not a valid curve scalar.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    /// The event could not be serialized into its canonical form.
    #[error("event serialization failed: {0}")]
    Serialization(String),
}

/// Derives the hex private key for a feed.
///
/// Formula: `privateKeyHex = hex(HMAC-SHA256(key = secret, msg = feed_url))`
///
/// Pure and infallible: empty inputs still yield a key. Whether the result is
/// usable as a curve scalar is checked by [`EventSigner::public_key_for`].
pub fn derive_private_key(secret: &[u8], feed_url: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key length is valid");
    mac.update(feed_url.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_for_same_input() {
        let first = derive_private_key(b"bridge-secret", "https://example.com/feed.xml");
        let second = derive_private_key(b"bridge-secret", "https://example.com/feed.xml");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn key_changes_across_secrets_and_urls() {
        let base = derive_private_key(b"bridge-secret", "https://example.com/feed.xml");

        assert_ne!(
            base,
            derive_private_key(b"other-secret", "https://example.com/feed.xml")
        );
        assert_ne!(
            base,
            derive_private_key(b"bridge-secret", "https://example.com/atom.xml")
        );
    }

    #[test]
    fn empty_inputs_still_produce_a_key() {
        let key = derive_private_key(b"", "");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn matches_rfc4231_vector() {
        // RFC 4231 test case 2.
        let key = derive_private_key(b"Jefe", "what do ya want for nothing?");
        assert_eq!(
            key,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
