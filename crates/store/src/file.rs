//! File-backed configuration store.
//!
//! Lays the shared state out under a single root directory:
//!
//! ```text
//! <root>/cluster.toml    the membership document
//! <root>/authkey         shared secret key material
//! <root>/locks/<name>    one lock file per cluster-wide named lock
//! ```
//!
//! On a real deployment the root sits on the replicated filesystem the
//! cluster shares, so the OS file locks under `locks/` are cluster-wide.
//! Document writes go through a temporary file and rename, so readers never
//! observe a torn document.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use clusterd_types::{ClusterConfigDocument, Digest, StoreError};
use fs2::FileExt;
use tracing::{debug, info};

use crate::client::{ConfigStore, StoreLock, note_stale_write, poll_with_deadline};

/// File name of the membership document under the store root.
pub const DOCUMENT_FILE: &str = "cluster.toml";

/// File name of the shared authkey under the store root.
pub const AUTHKEY_FILE: &str = "authkey";

/// Directory holding named lock files.
const LOCK_DIR: &str = "locks";

/// Poll interval while waiting on a contended lock file.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// File-backed [`ConfigStore`].
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io { path: root.clone(), source })?;
        Ok(Self { root })
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self) -> PathBuf {
        self.root.join(DOCUMENT_FILE)
    }

    fn authkey_path(&self) -> PathBuf {
        self.root.join(AUTHKEY_FILE)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(LOCK_DIR).join(format!("{name}.lck"))
    }

    fn read_raw(&self) -> Result<String, StoreError> {
        let path = self.document_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::DocumentMissing),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

impl ConfigStore for FileStore {
    fn exists(&self) -> bool {
        self.document_path().exists()
    }

    fn read(&self) -> Result<ClusterConfigDocument, StoreError> {
        let text = self.read_raw()?;
        let mut doc: ClusterConfigDocument = toml::from_str(&text)
            .map_err(|source| StoreError::Parse { path: self.document_path(), source })?;
        doc.digest = Some(Digest::of_bytes(text.as_bytes()));
        Ok(doc)
    }

    fn write(
        &self,
        doc: &ClusterConfigDocument,
        expected: Option<&Digest>,
    ) -> Result<Digest, StoreError> {
        let current = self.read_raw().ok().map(|text| Digest::of_bytes(text.as_bytes()));
        note_stale_write(current.as_ref(), expected);

        let text = toml::to_string(doc).map_err(|source| StoreError::Serialize { source })?;
        let digest = Digest::of_bytes(text.as_bytes());

        // Write-then-rename keeps the document atomic for concurrent readers.
        let path = self.document_path();
        let staging = self.root.join(format!("{DOCUMENT_FILE}.new"));
        let io_err = |p: &Path| {
            let p = p.to_path_buf();
            move |source| StoreError::Io { path: p, source }
        };
        let mut f = File::create(&staging).map_err(io_err(&staging))?;
        f.write_all(text.as_bytes()).map_err(io_err(&staging))?;
        f.sync_all().map_err(io_err(&staging))?;
        fs::rename(&staging, &path).map_err(io_err(&path))?;

        debug!(path = %path.display(), digest = %digest, "Wrote configuration document");
        Ok(digest)
    }

    fn lock(&self, name: &str, timeout: Duration) -> Result<StoreLock, StoreError> {
        let path = self.lock_path(name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;

        let acquired = poll_with_deadline(timeout, LOCK_POLL_INTERVAL, || {
            file.try_lock_exclusive().is_ok().then_some(())
        });
        if acquired.is_none() {
            return Err(StoreError::LockTimeout { name: name.to_string(), timeout });
        }

        info!(name, path = %path.display(), "Acquired cluster-wide lock");
        let lock_name = name.to_string();
        Ok(StoreLock::new(name, move || {
            let _ = FileExt::unlock(&file);
            debug!(name = %lock_name, "Released cluster-wide lock");
        }))
    }

    fn read_authkey(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.authkey_path();
        match fs::read(&path) {
            Ok(key) => Ok(key),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { what: "authkey".to_string() })
            },
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn authkey_exists(&self) -> bool {
        self.authkey_path().exists()
    }

    fn write_authkey(&self, key: &[u8]) -> Result<(), StoreError> {
        let path = self.authkey_path();
        fs::write(&path, key).map_err(|source| StoreError::Io { path, source })
    }
}
