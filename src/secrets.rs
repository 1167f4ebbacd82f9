//! At-rest encryption for the pending queue and the stored SMTP password.
//!
//! The key is scoped to the current user account: it lives in the OS credential
//! store where one is available, otherwise in an owner-only file in the data dir.

use std::{
    fs,
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use log::info;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

const KEYRING_SERVICE: &str = "SimpleAccountability";
const KEYRING_USER: &str = "queue-key";

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("key store unavailable: {0}")]
    KeyStore(String),
    #[error("stored key is malformed")]
    MalformedKey,
    #[error("encryption failed")]
    Seal,
    #[error("decryption failed")]
    Open,
    #[error("sealed payload too short")]
    Truncated,
}

/// Source of the user-scoped 256-bit key.
pub trait KeyStore: Send + Sync {
    fn load_or_create(&self) -> Result<[u8; KEY_LEN], SecretError>;
}

fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], SecretError> {
    let raw = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| SecretError::MalformedKey)?;
    raw.try_into().map_err(|_| SecretError::MalformedKey)
}

/// Key kept in the platform credential store (Keychain, Credential Manager).
pub struct KeyringKeyStore {
    service: String,
    user: String,
}

impl KeyringKeyStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.into(),
            user: KEYRING_USER.into(),
        }
    }
}

impl Default for KeyringKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for KeyringKeyStore {
    fn load_or_create(&self) -> Result<[u8; KEY_LEN], SecretError> {
        let entry = keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| SecretError::KeyStore(e.to_string()))?;

        match entry.get_password() {
            Ok(encoded) => decode_key(&encoded),
            Err(keyring::Error::NoEntry) => {
                let key = generate_key();
                entry
                    .set_password(&general_purpose::STANDARD.encode(key))
                    .map_err(|e| SecretError::KeyStore(e.to_string()))?;
                info!("Created new queue key in the system credential store");
                Ok(key)
            }
            Err(err) => Err(SecretError::KeyStore(err.to_string())),
        }
    }
}

/// Key kept in an owner-only file.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl KeyStore for FileKeyStore {
    fn load_or_create(&self) -> Result<[u8; KEY_LEN], SecretError> {
        if self.path.exists() {
            let encoded = fs::read_to_string(&self.path)
                .map_err(|e| SecretError::KeyStore(e.to_string()))?;
            return decode_key(&encoded);
        }

        let key = generate_key();
        write_private(&self.path, general_purpose::STANDARD.encode(key).as_bytes())
            .map_err(|e| SecretError::KeyStore(e.to_string()))?;
        info!("Created new queue key at {}", self.path.display());
        Ok(key)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

/// The key store appropriate for this platform.
pub fn default_key_store(data_dir: &Path) -> Box<dyn KeyStore> {
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        Box::new(KeyringKeyStore::new())
    } else {
        Box::new(FileKeyStore::new(data_dir.join(".queue.key")))
    }
}

/// AES-256-GCM with a random nonce prefixed to every sealed blob.
#[derive(Clone)]
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    pub fn from_store(store: &dyn KeyStore) -> Result<Self, SecretError> {
        Ok(Self::new(store.load_or_create()?))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SecretError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SecretError> {
        if sealed.len() < NONCE_LEN {
            return Err(SecretError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Open)
    }

    /// Seal a string and base64 it for embedding in JSON.
    pub fn seal_text(&self, text: &str) -> Result<String, SecretError> {
        Ok(general_purpose::STANDARD.encode(self.seal(text.as_bytes())?))
    }

    pub fn open_text(&self, encoded: &str) -> Result<String, SecretError> {
        let sealed = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| SecretError::Open)?;
        String::from_utf8(self.open(&sealed)?).map_err(|_| SecretError::Open)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) struct MemoryKeyStore(pub [u8; KEY_LEN]);

    impl KeyStore for MemoryKeyStore {
        fn load_or_create(&self) -> Result<[u8; KEY_LEN], SecretError> {
            Ok(self.0)
        }
    }

    pub(crate) fn test_sealer() -> Sealer {
        Sealer::new([7u8; KEY_LEN])
    }

    #[test]
    fn sealed_payload_is_not_plaintext_and_opens() {
        let sealer = test_sealer();
        let sealed = sealer.seal(b"jpeg bytes").unwrap();

        assert!(!sealed.windows(10).any(|w| w == b"jpeg bytes"));
        assert_eq!(sealer.open(&sealed).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn other_key_cannot_open() {
        let sealed = test_sealer().seal(b"secret").unwrap();
        let other = Sealer::new([8u8; KEY_LEN]);

        assert!(matches!(other.open(&sealed), Err(SecretError::Open)));
        assert!(matches!(other.open(&sealed[..4]), Err(SecretError::Truncated)));
    }

    #[test]
    fn file_key_store_is_stable_across_loads() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join(".queue.key"));

        let first = store.load_or_create().unwrap();
        let second = store.load_or_create().unwrap();
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join(".queue.key"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn corrupt_key_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".queue.key");
        fs::write(&path, "not base64 at all!").unwrap();

        let store = FileKeyStore::new(path);
        assert!(matches!(store.load_or_create(), Err(SecretError::MalformedKey)));
    }

    #[test]
    fn text_round_trip_through_memory_store() {
        let sealer = Sealer::from_store(&MemoryKeyStore([1u8; KEY_LEN])).unwrap();
        let encoded = sealer.seal_text("app-password").unwrap();
        assert_eq!(sealer.open_text(&encoded).unwrap(), "app-password");
    }
}
