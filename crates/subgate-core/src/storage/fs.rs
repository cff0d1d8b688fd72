use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;

use crate::{
    domain::AssetRef,
    errors::Error,
    storage::{validate_key, ObjectBody, ObjectStore},
    Result,
};

/// Object store backed by a local directory.
///
/// Key `guide/docs/a.pdf` lives at `<root>/guide/docs/a.pdf`. Prefixes are
/// directories; listing is not recursive.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<ObjectBody> {
        let path = self.resolve(key)?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(key.to_string()))
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(Error::NotFound(key.to_string()));
        }

        Ok(ObjectBody::new(Box::new(file), meta.len()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<AssetRef>> {
        let dir = self.resolve(prefix)?;
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Storage(format!("list {prefix}: {e}"))),
        };

        let mut assets = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 object name");
                continue;
            };
            assets.push(AssetRef {
                key: format!("{prefix}{name}"),
                size: meta.len(),
            });
        }

        assets.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(assets)
    }
}
