//! Signing identity: login from `nsec`/hex, persistence, NIP-19 display and
//! Schnorr signing of events.

use std::fmt;

use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::{
    error::{Error, Result},
    event::{event_hash, Event, UnsignedEvent},
    state::{self, StateStore},
};

static HRP_NSEC: bech32::Hrp = bech32::Hrp::parse_unchecked("nsec");
static HRP_NPUB: bech32::Hrp = bech32::Hrp::parse_unchecked("npub");

/// A secret key together with the public key derived from it.
///
/// The secret bytes are wiped when the identity is dropped and never appear in
/// `Debug` output.
pub struct SigningIdentity {
    secret: [u8; 32],
    pubkey_hex: String,
}

impl SigningIdentity {
    /// Validate `secret` as a secp256k1 key and derive its x-only public key.
    pub fn from_secret(secret: [u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let kp = Keypair::from_seckey_slice(&secp, &secret)?;
        let pubkey_hex = hex::encode(kp.x_only_public_key().0.serialize());
        Ok(Self { secret, pubkey_hex })
    }

    pub fn pubkey_hex(&self) -> &str {
        &self.pubkey_hex
    }

    /// User-facing `npub1...` form of the public key.
    pub fn npub(&self) -> Result<String> {
        display_identity(&self.pubkey_hex)
    }

    /// Exportable `nsec1...` form of the secret key.
    pub fn nsec(&self) -> Result<String> {
        encode_secret(&self.secret)
    }

    pub(crate) fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }
}

impl Drop for SigningIdentity {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("pubkey_hex", &self.pubkey_hex)
            .field("secret", &"<hidden>")
            .finish()
    }
}

/// Loads, stores and clears the signing key in the state store.
#[derive(Debug, Clone)]
pub struct KeyManager {
    state: StateStore,
}

impl KeyManager {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Parse `input` as an `nsec1...` or 64 character hex key and persist it.
    ///
    /// Nothing is written unless the key parses, so a failed login leaves any
    /// previously stored key in place.
    pub fn login(&self, input: &str) -> Result<SigningIdentity> {
        let mut secret = parse_secret(input)?;
        let identity = SigningIdentity::from_secret(secret);
        let stored = secret.to_vec();
        secret.zeroize();
        let identity = identity.map_err(|_| Error::InvalidKeyFormat)?;
        self.state.set(state::SECRET_KEY, &stored)?;
        info!(pubkey = identity.pubkey_hex(), "logged in");
        Ok(identity)
    }

    pub fn logout(&self) -> Result<()> {
        self.state.remove(&[state::SECRET_KEY])?;
        info!("logged out");
        Ok(())
    }

    /// Reload the persisted key, if any. A corrupt stored key counts as absent.
    pub fn restore(&self) -> Result<Option<SigningIdentity>> {
        let Some(bytes) = self.state.get::<Vec<u8>>(state::SECRET_KEY)? else {
            return Ok(None);
        };
        let secret: [u8; 32] = match bytes.as_slice().try_into() {
            Ok(secret) => secret,
            Err(_) => {
                warn!(len = bytes.len(), "stored secret key has the wrong length");
                return Ok(None);
            }
        };
        match SigningIdentity::from_secret(secret) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!("stored secret key is invalid: {e}");
                Ok(None)
            }
        }
    }
}

/// Decode user input into raw secret key bytes.
pub fn parse_secret(input: &str) -> Result<[u8; 32]> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidKeyFormat);
    }
    let bytes = if input.starts_with("nsec1") {
        let (kind, data) = decode_nip19(input)?;
        if kind != HRP_NSEC.to_string() {
            return Err(Error::InvalidKeyFormat);
        }
        data
    } else {
        hex::decode(input)?
    };
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidKeyFormat)
}

/// Decode a bech32 NIP-19 string into its prefix and payload.
pub fn decode_nip19(encoded: &str) -> Result<(String, Vec<u8>)> {
    let (hrp, data) = bech32::decode(encoded)?;
    Ok((hrp.to_string(), data))
}

/// Encode raw secret key bytes as `nsec1...`.
pub fn encode_secret(secret: &[u8; 32]) -> Result<String> {
    bech32::encode::<bech32::Bech32>(HRP_NSEC, secret).map_err(|_| Error::InvalidKeyFormat)
}

/// Encode a hex public key as `npub1...`.
pub fn display_identity(pubkey_hex: &str) -> Result<String> {
    let bytes: [u8; 32] = hex::decode(pubkey_hex)?
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidKeyFormat)?;
    bech32::encode::<bech32::Bech32>(HRP_NPUB, &bytes).map_err(|_| Error::InvalidKeyFormat)
}

/// Hash and sign `unsigned` with `identity`.
///
/// No auxiliary randomness is mixed in, so the same fields and key always give
/// the same `id` and `sig`.
pub fn sign(unsigned: UnsignedEvent, identity: &SigningIdentity) -> Result<Event> {
    let secp = Secp256k1::new();
    let kp = Keypair::from_seckey_slice(&secp, identity.secret_bytes())?;
    let hash = event_hash(
        identity.pubkey_hex(),
        unsigned.created_at,
        unsigned.kind,
        &unsigned.tags,
        &unsigned.content,
    )?;
    let msg = Message::from_digest(hash);
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
    Ok(Event {
        id: hex::encode(hash),
        pubkey: identity.pubkey_hex().to_string(),
        kind: unsigned.kind,
        created_at: unsigned.created_at,
        tags: unsigned.tags,
        content: unsigned.content,
        sig: hex::encode(sig.serialize()),
    })
}

/// Verify an event's ID and Schnorr signature.
pub fn verify(ev: &Event) -> Result<()> {
    let hash = event_hash(&ev.pubkey, ev.created_at, ev.kind, &ev.tags, &ev.content)?;
    if hex::encode(hash) != ev.id {
        return Err(Error::IdMismatch);
    }
    let sig_bytes = hex::decode(&ev.sig).map_err(|_| Error::InvalidSignature)?;
    let pk_bytes = hex::decode(&ev.pubkey).map_err(|_| Error::InvalidSignature)?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| Error::InvalidSignature)?;
    let pk = XOnlyPublicKey::from_slice(&pk_bytes).map_err(|_| Error::InvalidSignature)?;
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&sig, &Message::from_digest(hash), &pk)
        .map_err(|_| Error::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Tag, KIND_LONG_FORM};
    use tempfile::TempDir;

    const ONE_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const ONE_PUB: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn manager(dir: &TempDir) -> KeyManager {
        KeyManager::new(StateStore::new(dir.path().to_path_buf()))
    }

    fn unsigned() -> UnsignedEvent {
        UnsignedEvent {
            kind: KIND_LONG_FORM,
            created_at: 1_700_000_000,
            tags: vec![Tag::pair("title", "Hello")],
            content: "body".into(),
        }
    }

    #[test]
    fn hex_login_derives_pubkey_and_persists() {
        let dir = TempDir::new().unwrap();
        let keys = manager(&dir);
        let id = keys.login(&format!("  {ONE_HEX}\n")).unwrap();
        assert_eq!(id.pubkey_hex(), ONE_PUB);

        let restored = keys.restore().unwrap().unwrap();
        assert_eq!(restored.pubkey_hex(), ONE_PUB);
    }

    #[test]
    fn nsec_login_round_trips() {
        let dir = TempDir::new().unwrap();
        let secret = [7u8; 32];
        let nsec = encode_secret(&secret).unwrap();
        assert!(nsec.starts_with("nsec1"));
        let (kind, data) = decode_nip19(&nsec).unwrap();
        assert_eq!(kind, "nsec");
        assert_eq!(data, secret.to_vec());

        let id = manager(&dir).login(&nsec).unwrap();
        assert_eq!(id.secret_bytes(), &secret);
    }

    #[test]
    fn rejects_wrong_length_and_garbage() {
        let dir = TempDir::new().unwrap();
        let keys = manager(&dir);
        assert!(matches!(keys.login(""), Err(Error::InvalidKeyFormat)));
        assert!(matches!(keys.login("abcd"), Err(Error::InvalidKeyFormat)));
        assert!(matches!(keys.login("zz"), Err(Error::InvalidKeyFormat)));
        assert!(matches!(keys.login("nsec1qqqq"), Err(Error::InvalidKeyFormat)));
        // zero is not a valid secp256k1 secret key
        assert!(matches!(keys.login(&"00".repeat(32)), Err(Error::InvalidKeyFormat)));
        assert!(keys.restore().unwrap().is_none());
    }

    #[test]
    fn wrong_nip19_type_keeps_stored_key() {
        let dir = TempDir::new().unwrap();
        let keys = manager(&dir);
        keys.login(ONE_HEX).unwrap();

        // Starts with "nsec1" but decodes to a different prefix.
        let hrp = bech32::Hrp::parse("nsec1pub").unwrap();
        let bogus = bech32::encode::<bech32::Bech32>(hrp, &[9u8; 32]).unwrap();
        assert!(bogus.starts_with("nsec1"));
        assert!(matches!(keys.login(&bogus), Err(Error::InvalidKeyFormat)));

        assert_eq!(keys.restore().unwrap().unwrap().pubkey_hex(), ONE_PUB);
    }

    #[test]
    fn logout_clears_key() {
        let dir = TempDir::new().unwrap();
        let keys = manager(&dir);
        keys.login(ONE_HEX).unwrap();
        keys.logout().unwrap();
        assert!(keys.restore().unwrap().is_none());
        // logging out twice is harmless
        keys.logout().unwrap();
    }

    #[test]
    fn corrupt_stored_key_is_ignored() {
        let dir = TempDir::new().unwrap();
        let state = StateStore::new(dir.path().to_path_buf());
        state.set(state::SECRET_KEY, &vec![1u8, 2, 3]).unwrap();
        assert!(KeyManager::new(state).restore().unwrap().is_none());
    }

    #[test]
    fn display_identity_is_stable() {
        let a = display_identity(ONE_PUB).unwrap();
        let b = display_identity(ONE_PUB).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("npub1"));
        let (kind, data) = decode_nip19(&a).unwrap();
        assert_eq!(kind, "npub");
        assert_eq!(hex::encode(data), ONE_PUB);
        assert!(display_identity("abcd").is_err());
    }

    #[test]
    fn signing_is_deterministic_and_verifiable() {
        let id = SigningIdentity::from_secret([1u8; 32]).unwrap();
        let a = sign(unsigned(), &id).unwrap();
        let b = sign(unsigned(), &id).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.pubkey, id.pubkey_hex());
        verify(&a).unwrap();
    }

    #[test]
    fn mutation_after_signing_fails_verification() {
        let id = SigningIdentity::from_secret([1u8; 32]).unwrap();
        let mut ev = sign(unsigned(), &id).unwrap();
        ev.content.push('!');
        assert!(matches!(verify(&ev), Err(Error::IdMismatch)));

        let mut ev = sign(unsigned(), &id).unwrap();
        ev.sig = "00".repeat(64);
        assert!(matches!(verify(&ev), Err(Error::InvalidSignature)));
    }

    #[test]
    fn debug_hides_secret() {
        let id = SigningIdentity::from_secret([1u8; 32]).unwrap();
        let shown = format!("{id:?}");
        assert!(shown.contains("<hidden>"));
        assert!(!shown.contains(&hex::encode([1u8; 32])));
    }
}
