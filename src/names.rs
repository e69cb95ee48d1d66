//! The `key@bucket` names file, written by names-only runs and read by `--dl-names`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::DumpError;

pub const SEPARATOR: char = '@';

/// One `key@bucket` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub key: String,
    pub bucket: String,
}

impl NameRecord {
    pub fn new(key: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            bucket: bucket.into(),
        }
    }

    /// Parse a line, splitting on the last separator since bucket names cannot contain one.
    /// Returns `None` for lines without a separator or with an empty half.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\r');
        let (key, bucket) = line.rsplit_once(SEPARATOR)?;
        if key.is_empty() || bucket.is_empty() {
            return None;
        }
        Some(Self::new(key, bucket))
    }
}

impl fmt::Display for NameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, SEPARATOR, self.bucket)
    }
}

/// The parsed contents of a names file, in file order.
#[derive(Debug, Clone, Default)]
pub struct NamesList {
    records: Vec<NameRecord>,
}

impl NamesList {
    pub fn parse(contents: &str) -> Self {
        Self {
            records: contents.lines().filter_map(NameRecord::parse).collect(),
        }
    }

    pub async fn read(path: &Path) -> Result<Self, DumpError> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| DumpError::NamesFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::parse(&contents))
    }

    /// Distinct bucket names mentioned in the file.
    pub fn buckets(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.bucket.clone()).collect()
    }

    /// Keys recorded for exactly this bucket, in file order.
    pub fn keys_for(&self, bucket: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.bucket == bucket)
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Writer for the per-run names file.
///
/// The file is truncated once by [`NamesFile::create`]; each bucket's records
/// are then appended, so a run leaves a cumulative list.
#[derive(Debug, Clone)]
pub struct NamesFile {
    path: PathBuf,
}

impl NamesFile {
    pub async fn create(path: PathBuf) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::File::create(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, bucket: &str, keys: &[String]) -> std::io::Result<()> {
        let mut contents = String::new();
        for key in keys {
            contents.push_str(&NameRecord::new(key.as_str(), bucket).to_string());
            contents.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }
}
