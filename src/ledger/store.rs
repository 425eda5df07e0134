use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

/// A single account as it is stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub password: String,
    pub balance: u64,
}

/// account id -> record, kept sorted so the document is stable between writes
pub type Document = BTreeMap<String, AccountRecord>;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read the ledger at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Serialize(#[from] serde_json::Error),

    #[error("account {0} is missing from the persisted ledger")]
    UnknownAccount(String),
}

/// The durable side of the ledger.
///
/// Holds the image of what was last written to disk, every commit
/// goes through the image lock so only one writer touches the file at a time.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    image: Mutex<Document>,
}

impl Store {
    /// Loads the document at `path`
    ///
    /// a missing or unparseable document results in an empty ledger,
    /// any other read failure is returned as an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();

        let document = match fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<Document>(&raw) {
                Ok(document) => document,
                Err(err) => {
                    tracing::warn!(
                        "ledger at {} is not well-formed, starting empty: {}",
                        path.display(),
                        err
                    );
                    Document::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!("no ledger at {}, starting empty", path.display());
                Document::new()
            }
            Err(source) => return Err(LoadError::Io { path, source }),
        };

        Ok(Self::new(path, document))
    }

    /// Creates a store around an existing document without touching the disk
    pub fn new(path: impl Into<PathBuf>, document: Document) -> Self {
        Self {
            path: path.into(),
            image: Mutex::new(document),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the last durably written document
    pub async fn snapshot(&self) -> Document {
        self.image.lock().await.clone()
    }

    /// Durably records a new balance for `id`
    ///
    /// returns only once the whole document has been atomically replaced on disk.
    /// on failure the image is left exactly as it was before the call.
    pub async fn commit_balance(&self, id: &str, balance: u64) -> Result<(), PersistError> {
        let mut image = self.image.lock().await;

        let previous = match image.get_mut(id) {
            Some(record) => std::mem::replace(&mut record.balance, balance),
            None => return Err(PersistError::UnknownAccount(id.to_owned())),
        };

        if let Err(err) = write_document(&self.path, &image).await {
            if let Some(record) = image.get_mut(id) {
                record.balance = previous;
            }

            return Err(err);
        }

        Ok(())
    }
}

// serialize the document into a sibling temp file, then swap it into place
async fn write_document(path: &Path, document: &Document) -> Result<(), PersistError> {
    let raw = serde_json::to_vec_pretty(document)?;
    let temp_path = temp_path_for(path);

    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&raw).await?;
        // tokio only reports a failed write back through flush, sync_all won't
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(err) = written {
        // best effort, the target itself was never touched
        let _ = fs::remove_file(&temp_path).await;
        return Err(err.into());
    }

    // the new document is already in place, reporting a failure here would
    // roll back a balance that is visible on disk
    if let Err(err) = sync_parent_dir(path).await {
        tracing::warn!("failed to sync the directory of {}: {}", path.display(), err);
    }

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// make the rename itself durable
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::File::open(parent).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AccountRecord, Document, Store};

    fn document() -> Document {
        let mut document = Document::new();
        document.insert(
            "1001".into(),
            AccountRecord {
                password: "123456".into(),
                balance: 500,
            },
        );
        document.insert(
            "1002".into(),
            AccountRecord {
                password: "654321".into(),
                balance: 20,
            },
        );
        document
    }

    #[tokio::test]
    async fn missing_document_is_an_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(dir.path().join("users.json")).await.unwrap();

        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_document_is_an_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "{\"1001\": {\"password\": ").unwrap();

        let store = Store::load(&path).await.unwrap();
        assert!(store.snapshot().await.is_empty());

        // the broken document is left alone
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"1001\": {\"password\": "
        );
    }

    #[tokio::test]
    async fn loads_the_plain_users_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{
                "1001": {"password": "123456", "balance": 500},
                "1002": {"password": "654321", "balance": 20}
            }"#,
        )
        .unwrap();

        let store = Store::load(&path).await.unwrap();
        assert_eq!(store.snapshot().await, document());
    }

    #[tokio::test]
    async fn commit_replaces_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = Store::new(&path, document());

        store.commit_balance("1001", 300).await.unwrap();

        let reloaded = Store::load(&path).await.unwrap().snapshot().await;
        assert_eq!(reloaded["1001"].balance, 300);
        assert_eq!(reloaded["1002"].balance, 20);
        assert_eq!(reloaded["1001"].password, "123456");

        // no leftovers from the swap
        assert!(!dir.path().join("users.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_commit_keeps_the_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("users.json");
        let store = Store::new(&path, document());

        assert!(store.commit_balance("1001", 100).await.is_err());
        assert_eq!(store.snapshot().await["1001"].balance, 500);
        assert!(!path.exists());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failed_write_keeps_the_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = Store::new(&path, document());
        store.commit_balance("1001", 400).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        // every write into the temp file runs out of space
        std::os::unix::fs::symlink("/dev/full", dir.path().join("users.json.tmp")).unwrap();

        assert!(store.commit_balance("1001", 100).await.is_err());
        assert_eq!(store.snapshot().await["1001"].balance, 400);
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("users.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_swap_keeps_the_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        // a non-empty directory in the way, the temp file is written but can't be renamed over it
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "untouched").unwrap();

        let store = Store::new(&path, document());
        assert!(store.commit_balance("1001", 100).await.is_err());

        assert_eq!(store.snapshot().await["1001"].balance, 500);
        assert_eq!(
            std::fs::read_to_string(path.join("keep")).unwrap(),
            "untouched"
        );
        assert!(!dir.path().join("users.json.tmp").exists());
    }

    #[tokio::test]
    async fn commit_for_unknown_account_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("users.json"), document());

        assert!(store.commit_balance("9999", 1).await.is_err());
        assert_eq!(store.snapshot().await, document());
    }
}
