//! Event ids and signatures.

use crate::SigningError;
use newsrelay_types::Event;
use secp256k1::{Keypair, Message, SECP256K1};
use sha2::{Digest, Sha256};

/// Signs events on behalf of derived feed identities.
///
/// The bridge only depends on this trait, so a host that already owns a
/// signing implementation can plug it in.
pub trait EventSigner: Send + Sync {
    /// Returns the hex public key for a hex private key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidPrivateKey`] if the key is unusable.
    fn public_key_for(&self, private_key_hex: &str) -> Result<String, SigningError>;

    /// Signs an event whose `id` has already been computed and returns the
    /// hex signature.
    fn sign(&self, event: &Event, private_key_hex: &str) -> Result<String, SigningError>;
}

/// Computes the event id: hex SHA-256 of
/// `[0, pubkey, created_at, kind, tags, content]` serialized as compact JSON.
pub fn event_id(event: &Event) -> Result<String, SigningError> {
    let canonical = serde_json::to_string(&(
        0u8,
        &event.pubkey,
        event.created_at,
        event.kind.as_u32(),
        &event.tags,
        &event.content,
    ))
    .map_err(|e| SigningError::Serialization(e.to_string()))?;

    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Fills in `id` and `sig` for an event built by the synthesizer.
pub fn finalize(
    signer: &dyn EventSigner,
    mut event: Event,
    private_key_hex: &str,
) -> Result<Event, SigningError> {
    event.id = event_id(&event)?;
    event.sig = signer.sign(&event, private_key_hex)?;
    Ok(event)
}

/// BIP-340 Schnorr signer over secp256k1 with x-only public keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Signer;

impl Secp256k1Signer {
    fn keypair(private_key_hex: &str) -> Result<Keypair, SigningError> {
        Keypair::from_seckey_str(SECP256K1, private_key_hex)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))
    }
}

impl EventSigner for Secp256k1Signer {
    fn public_key_for(&self, private_key_hex: &str) -> Result<String, SigningError> {
        let keypair = Self::keypair(private_key_hex)?;
        Ok(keypair.x_only_public_key().0.to_string())
    }

    fn sign(&self, event: &Event, private_key_hex: &str) -> Result<String, SigningError> {
        let keypair = Self::keypair(private_key_hex)?;

        let mut digest = [0u8; 32];
        hex::decode_to_slice(&event.id, &mut digest)
            .map_err(|e| SigningError::Serialization(format!("event id: {e}")))?;

        let signature = SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(digest), &keypair);
        Ok(signature.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive_private_key;
    use newsrelay_types::EventKind;
    use secp256k1::schnorr::Signature;
    use secp256k1::XOnlyPublicKey;
    use std::str::FromStr;

    fn signed_note(content: &str) -> (Event, String) {
        let signer = Secp256k1Signer;
        let sk = derive_private_key(b"test-secret", "https://example.com/feed.xml");
        let pubkey = signer.public_key_for(&sk).expect("derived key should be valid");
        let event = Event::unsigned(pubkey, 1_700_000_000, EventKind::TextNote, content);
        (finalize(&signer, event, &sk).expect("signing should succeed"), sk)
    }

    #[test]
    fn event_id_matches_canonical_serialization() {
        let event = Event::unsigned("ab", 1, EventKind::TextNote, "line\n\"quoted\"");
        let expected = Sha256::digest(br#"[0,"ab",1,1,[],"line\n\"quoted\""]"#);

        assert_eq!(event_id(&event).unwrap(), hex::encode(expected));
    }

    #[test]
    fn signature_verifies_against_x_only_key() {
        let (event, _) = signed_note("**Hello**\n\nworld");

        assert_eq!(event.id.len(), 64);
        assert_eq!(event.sig.len(), 128);

        let signature = Signature::from_str(&event.sig).expect("signature hex");
        let pubkey = XOnlyPublicKey::from_str(&event.pubkey).expect("pubkey hex");
        let mut digest = [0u8; 32];
        hex::decode_to_slice(&event.id, &mut digest).unwrap();

        SECP256K1
            .verify_schnorr(&signature, &Message::from_digest(digest), &pubkey)
            .expect("signature should verify");
    }

    #[test]
    fn signing_is_deterministic() {
        let (first, _) = signed_note("same");
        let (second, _) = signed_note("same");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_invalid_private_keys() {
        let signer = Secp256k1Signer;
        assert!(matches!(
            signer.public_key_for("not-hex"),
            Err(SigningError::InvalidPrivateKey(_))
        ));
        // Zero is not a valid scalar.
        assert!(signer.public_key_for(&"0".repeat(64)).is_err());
    }
}
