//! Credential Store (component B, spec §2, §3).
//!
//! Supplies SNMP v1/v2c/v3 credentials per device. Decryption happens at
//! use, is authenticated (fails closed on tamper), and never logs secret
//! material — [`DecryptedCredential`]'s `Debug` impl is hand-written to
//! redact, on purpose.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::error::CredentialError;
use crate::types::{CredentialSecret, SnmpCredential, SnmpVersion};

/// Plaintext SNMP credential, held only as long as a single probe call
/// needs it. Never serialized, never logged.
pub enum DecryptedCredential {
    Community {
        version: SnmpVersion,
        community: String,
    },
    V3 {
        user: String,
        auth_key: Vec<u8>,
        priv_key: Vec<u8>,
    },
}

impl fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptedCredential::Community { version, .. } => f
                .debug_struct("DecryptedCredential::Community")
                .field("version", version)
                .field("community", &"<redacted>")
                .finish(),
            DecryptedCredential::V3 { user, .. } => f
                .debug_struct("DecryptedCredential::V3")
                .field("user", user)
                .field("auth_key", &"<redacted>")
                .field("priv_key", &"<redacted>")
                .finish(),
        }
    }
}

/// Decrypts and serves SNMP credentials. One process-wide instance,
/// initialized once at startup (spec §5, "Singletons").
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential_for_device(
        &self,
        device_id: &str,
    ) -> Result<DecryptedCredential, CredentialError>;

    async fn default_credential(&self) -> Result<DecryptedCredential, CredentialError>;
}

/// AES-256-GCM authenticated decryption. A 12-byte nonce is prepended to
/// each ciphertext blob; tampering (or a wrong key) fails the AEAD tag
/// check and decryption returns `Err` — fail closed, never fall back to
/// treating the blob as plaintext.
fn decrypt(key: &Key<Aes256Gcm>, blob: &[u8]) -> Result<Vec<u8>, CredentialError> {
    const NONCE_LEN: usize = 12;
    if blob.len() < NONCE_LEN {
        return Err(CredentialError::DecryptionFailed);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CredentialError::DecryptionFailed)
}

fn decrypt_credential(
    key: &Key<Aes256Gcm>,
    cred: &SnmpCredential,
) -> Result<DecryptedCredential, CredentialError> {
    match &cred.secret {
        CredentialSecret::Community { ciphertext } => {
            let plain = decrypt(key, ciphertext)?;
            let community = String::from_utf8(plain).map_err(|_| CredentialError::DecryptionFailed)?;
            Ok(DecryptedCredential::Community {
                version: cred.version,
                community,
            })
        }
        CredentialSecret::V3(params) => {
            let auth_key = decrypt(key, &params.auth_key_ciphertext)?;
            let priv_key = decrypt(key, &params.priv_key_ciphertext)?;
            Ok(DecryptedCredential::V3 {
                user: params.user.clone(),
                auth_key,
                priv_key,
            })
        }
    }
}

/// In-memory credential store: keyed by device id, with one designated
/// default. Backs both tests and small deployments; a relational-backed
/// store would load rows lazily behind the same trait.
pub struct InMemoryCredentialStore {
    key: Key<Aes256Gcm>,
    by_device: RwLock<HashMap<String, SnmpCredential>>,
    default: RwLock<Option<SnmpCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self {
            key: *Key::<Aes256Gcm>::from_slice(&master_key),
            by_device: RwLock::new(HashMap::new()),
            default: RwLock::new(None),
        }
    }

    /// Register a credential. At most one `is_default` may be registered —
    /// a second attempt is rejected (spec §3 invariant).
    pub fn register_for_device(
        &self,
        device_id: &str,
        cred: SnmpCredential,
    ) -> Result<(), CredentialError> {
        if cred.is_default {
            let mut default = self.default.write().expect("lock poisoned");
            if default.is_some() {
                return Err(CredentialError::MultipleDefaults);
            }
            *default = Some(cred.clone());
        }
        self.by_device
            .write()
            .expect("lock poisoned")
            .insert(device_id.to_string(), cred);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credential_for_device(
        &self,
        device_id: &str,
    ) -> Result<DecryptedCredential, CredentialError> {
        let cred = self
            .by_device
            .read()
            .expect("lock poisoned")
            .get(device_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(device_id.to_string()))?;
        decrypt_credential(&self.key, &cred)
    }

    async fn default_credential(&self) -> Result<DecryptedCredential, CredentialError> {
        let cred = self
            .default
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| CredentialError::NotFound("<no default>".to_string()))?;
        decrypt_credential(&self.key, &cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::OsRng;
    use aes_gcm::AeadCore;

    fn seal(key: &Key<Aes256Gcm>, plaintext: &[u8]) -> Vec<u8> {
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext).expect("encrypt");
        [nonce.as_slice(), &ciphertext].concat()
    }

    #[tokio::test]
    async fn round_trips_community_secret() {
        let key_bytes = [7u8; 32];
        let key = *Key::<Aes256Gcm>::from_slice(&key_bytes);
        let store = InMemoryCredentialStore::new(key_bytes);

        let cred = SnmpCredential {
            id: "c1".into(),
            version: SnmpVersion::V2c,
            secret: CredentialSecret::Community {
                ciphertext: seal(&key, b"public"),
            },
            priority: 0,
            is_default: false,
        };
        store.register_for_device("d1", cred).unwrap();

        let decrypted = store.credential_for_device("d1").await.unwrap();
        match decrypted {
            DecryptedCredential::Community { community, .. } => assert_eq!(community, "public"),
            DecryptedCredential::V3 { .. } => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_closed() {
        let key_bytes = [9u8; 32];
        let key = *Key::<Aes256Gcm>::from_slice(&key_bytes);
        let store = InMemoryCredentialStore::new(key_bytes);

        let mut ciphertext = seal(&key, b"public");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let cred = SnmpCredential {
            id: "c1".into(),
            version: SnmpVersion::V2c,
            secret: CredentialSecret::Community { ciphertext },
            priority: 0,
            is_default: false,
        };
        store.register_for_device("d1", cred).unwrap();

        let result = store.credential_for_device("d1").await;
        assert!(matches!(result, Err(CredentialError::DecryptionFailed)));
    }

    #[test]
    fn rejects_second_default() {
        let store = InMemoryCredentialStore::new([1u8; 32]);
        let key = *Key::<Aes256Gcm>::from_slice(&[1u8; 32]);
        let make = |is_default| SnmpCredential {
            id: "c".into(),
            version: SnmpVersion::V1,
            secret: CredentialSecret::Community {
                ciphertext: seal(&key, b"x"),
            },
            priority: 0,
            is_default,
        };
        store.register_for_device("d1", make(true)).unwrap();
        let err = store.register_for_device("d2", make(true)).unwrap_err();
        assert!(matches!(err, CredentialError::MultipleDefaults));
    }

    #[test]
    fn debug_impl_never_prints_secret() {
        let cred = DecryptedCredential::Community {
            version: SnmpVersion::V2c,
            community: "super-secret".to_string(),
        };
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
