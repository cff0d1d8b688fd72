//! Object-store abstraction used for welcome images and delivered documents.

use std::{fmt, path::Component, path::Path};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::{domain::AssetRef, errors::Error, Result};

pub mod fs;

pub use fs::FsObjectStore;

pub type ObjectReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Streamed object contents. Dropping the body releases the underlying handle.
pub struct ObjectBody {
    pub reader: ObjectReader,
    pub size: u64,
}

impl ObjectBody {
    pub fn new(reader: ObjectReader, size: u64) -> Self {
        Self { reader, size }
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Object store port. Implementations must be safe to share across workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for reading. Missing keys yield [`Error::NotFound`].
    async fn get(&self, key: &str) -> Result<ObjectBody>;

    /// List objects directly under `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<AssetRef>>;
}

/// Reject keys that could escape the store root.
///
/// Keys are `/`-separated relative paths; empty segments and `.` are tolerated,
/// absolute keys and `..` are not.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.trim().is_empty() {
        return Err(invalid("empty key"));
    }
    if key.contains('\0') {
        return Err(invalid("NUL byte"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(invalid("absolute key"));
    }
    for c in Path::new(key).components() {
        match c {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("parent directory reference")),
            Component::RootDir | Component::Prefix(_) => return Err(invalid("absolute key")),
        }
    }
    Ok(())
}
