//! Where a session's dump lands on local disk.
//!
//! ```text
//! <root>/<session>/s3_bucket_dump_file_names.txt
//! <root>/<session>/s3_buckets.json
//! <root>/<session>/<bucket>/<key>
//! ```
//!
//! The session files carry underscores, which bucket names cannot, so they
//! never collide with a bucket directory.

use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

pub const NAMES_FILE: &str = "s3_bucket_dump_file_names.txt";
pub const BUCKET_CACHE_FILE: &str = "s3_buckets.json";

#[derive(Debug, Clone)]
pub struct Layout {
    session_dir: PathBuf,
}

impl Layout {
    pub fn new(root: impl AsRef<Path>, session: &str) -> Self {
        Self {
            session_dir: root.as_ref().join(session),
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn names_file(&self) -> PathBuf {
        self.session_dir.join(NAMES_FILE)
    }

    pub fn bucket_cache_file(&self) -> PathBuf {
        self.session_dir.join(BUCKET_CACHE_FILE)
    }

    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.session_dir.join(bucket)
    }

    /// Local path mirroring `key` inside the bucket directory.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.bucket_dir(bucket).join(relative_key_path(key)?))
    }
}

/// Turn a slash-delimited key into a relative path that stays below its base.
pub fn relative_key_path(key: &str) -> Result<PathBuf, StoreError> {
    let mut path = PathBuf::new();
    for segment in key.split('/').filter(|s| !s.is_empty() && *s != ".") {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => return Err(StoreError::UnsafeKey(key.to_string())),
        }
    }
    if path.as_os_str().is_empty() {
        return Err(StoreError::UnsafeKey(key.to_string()));
    }
    Ok(path)
}
