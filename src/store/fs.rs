//! Blob store backed by a local directory tree.
//!
//! Each bucket is a directory under the root and keys are relative paths
//! with `/` separators; the bucket `.` is the root itself. Content types
//! are not persisted.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::store::BlobStore;
use crate::util::{CdsError, CdsResult};

/// Filesystem-backed [`BlobStore`].
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, bucket: &str, key: &str) -> CdsResult<PathBuf> {
        if !is_plain(key) {
            return Err(CdsError::InvalidInput("blob keys must be plain relative paths"));
        }
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn bucket_dir(&self, bucket: &str) -> CdsResult<PathBuf> {
        if bucket == "." {
            Ok(self.root.clone())
        } else if is_plain(bucket) {
            Ok(self.root.join(bucket))
        } else {
            Err(CdsError::InvalidInput("bucket names must be plain relative paths"))
        }
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, bucket: &str, key: &str) -> CdsResult<Vec<u8>> {
        let path = self.path_of(bucket, key)?;
        fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CdsError::NotFound {
                what: format!("{bucket}/{key}"),
            },
            _ => CdsError::store(err),
        })
    }

    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, _content_type: &str) -> CdsResult<()> {
        let path = self.path_of(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CdsError::store)?;
        }
        fs::write(&path, bytes).map_err(CdsError::store)
    }

    fn head_exists(&self, bucket: &str, key: &str) -> CdsResult<bool> {
        Ok(self.path_of(bucket, key)?.is_file())
    }

    fn list_keys(&self, bucket: &str, prefix: &str) -> CdsResult<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        if dir.is_dir() {
            collect_keys(&dir, "", &mut keys).map_err(CdsError::store)?;
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, bucket: &str, prefix: &str) -> CdsResult<usize> {
        let keys = self.list_keys(bucket, prefix)?;
        for key in &keys {
            fs::remove_file(self.path_of(bucket, key)?).map_err(CdsError::store)?;
        }
        Ok(keys.len())
    }
}

fn is_plain(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let kind = entry.file_type()?;
        if kind.is_dir() {
            collect_keys(&entry.path(), &key, out)?;
        } else if kind.is_file() {
            out.push(key);
        }
    }
    Ok(())
}
