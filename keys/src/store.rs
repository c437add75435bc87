//! Persisted state layout (§6): one directory per beacon id holding the
//! long-term keypair, the group descriptor, the share, and (via `store`)
//! the chain database. One file per artifact, since each has its own
//! permission requirements and independent lifecycle.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crypto::{GroupDescriptor, IdentityKeyPair, Share};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::perm::{set_private_dir_perm, set_private_file_perm};

const IDENTITY_PRIVATE_FILE: &str = "identity.private";
const IDENTITY_PUBLIC_FILE: &str = "identity.public";
const GROUP_FILE: &str = "group.json";
const SHARE_FILE: &str = "share.json";
pub const CHAIN_DB_DIR: &str = "chain_db";

/// One beacon id's on-disk footprint, rooted at `base_dir/<beacon_id>/`.
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// Opens (creating if absent) the store directory for `beacon_id`
    /// under `base_dir`, with directory mode `0700` (§6.1).
    pub fn open(base_dir: impl AsRef<Path>, beacon_id: &str) -> Result<Self> {
        let dir = base_dir.as_ref().join(beacon_id);
        fs::create_dir_all(&dir).map_err(|source| Error::Io {
            path: dir.display().to_string(),
            source,
        })?;
        set_private_dir_perm(&dir).map_err(|source| Error::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(KeyStore { dir })
    }

    pub fn chain_db_path(&self) -> PathBuf {
        self.dir.join(CHAIN_DB_DIR)
    }

    fn write_private(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        let mut file = File::create(&path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        set_private_file_perm(&file).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        file.write_all(bytes).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn write_public(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, bytes).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.dir.join(name);
        match File::open(&path) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).map_err(|source| Error::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(Some(buf))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Persists a freshly generated (or restored) identity keypair.
    /// `identity.private` gets mode `0600`; `identity.public` is world
    /// readable, matching a node's self-signature being meant to be shared.
    pub fn save_identity(&self, keypair: &IdentityKeyPair) -> Result<()> {
        self.write_private(IDENTITY_PRIVATE_FILE, &keypair.secret_bytes())?;
        self.write_public(IDENTITY_PUBLIC_FILE, &keypair.public_key())?;
        info!(dir = %self.dir.display(), "persisted long-term node identity");
        Ok(())
    }

    pub fn load_identity(&self) -> Result<IdentityKeyPair> {
        let secret = self
            .read(IDENTITY_PRIVATE_FILE)?
            .ok_or_else(|| Error::IdentityNotFound(self.dir.display().to_string()))?;
        Ok(IdentityKeyPair::from_secret_bytes(&secret)?)
    }

    pub fn identity_exists(&self) -> bool {
        self.dir.join(IDENTITY_PRIVATE_FILE).exists()
    }

    /// Persists the group descriptor (public; no restrictive permissions
    /// needed beyond the enclosing `0700` directory).
    pub fn save_group(&self, group: &GroupDescriptor) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(group).expect("GroupDescriptor is serializable");
        self.write_public(GROUP_FILE, &bytes)?;
        debug!(hash = ?group.hash(), "persisted group descriptor");
        Ok(())
    }

    pub fn load_group(&self) -> Result<GroupDescriptor> {
        let bytes = self
            .read(GROUP_FILE)?
            .ok_or_else(|| Error::GroupNotFound(self.dir.display().to_string()))?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Malformed {
            path: self.dir.join(GROUP_FILE).display().to_string(),
            source,
        })
    }

    /// Persists this node's threshold share, mode `0600` — the single most
    /// sensitive artifact in the store.
    pub fn save_share(&self, share: &Share) -> Result<()> {
        let bytes = serde_json::to_vec(share).expect("Share is serializable");
        self.write_private(SHARE_FILE, &bytes)?;
        info!(index = share.index, "persisted threshold share");
        Ok(())
    }

    pub fn load_share(&self) -> Result<Share> {
        let bytes = self
            .read(SHARE_FILE)?
            .ok_or_else(|| Error::ShareNotFound(self.dir.display().to_string()))?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Malformed {
            path: self.dir.join(SHARE_FILE).display().to_string(),
            source,
        })
    }

    pub fn share_exists(&self) -> bool {
        self.dir.join(SHARE_FILE).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn identity_roundtrips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::open(tmp.path(), "default").unwrap();
        let kp = IdentityKeyPair::generate(ChaCha20Rng::seed_from_u64(11));
        store.save_identity(&kp).unwrap();

        let loaded = store.load_identity().unwrap();
        assert_eq!(kp.public_key(), loaded.public_key());
    }

    #[test]
    fn missing_identity_reports_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::open(tmp.path(), "default").unwrap();
        assert!(!store.identity_exists());
        assert!(matches!(
            store.load_identity(),
            Err(Error::IdentityNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn private_files_get_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::open(tmp.path(), "default").unwrap();
        let kp = IdentityKeyPair::generate(ChaCha20Rng::seed_from_u64(12));
        store.save_identity(&kp).unwrap();

        let meta = std::fs::metadata(tmp.path().join("default").join(IDENTITY_PRIVATE_FILE)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        let dir_meta = std::fs::metadata(tmp.path().join("default")).unwrap();
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }
}
