//! Error types for the dump run.
//!
//! - [`DumpError`] ends the whole run
//! - [`BucketSkip`] ends work on one bucket, the run moves on
//! - [`StoreError`] is the outcome of a single storage call, including
//!   per-file download failures
//!
//! Messages describe only their own level; [`error_chain`] renders a value
//! together with its causes.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the whole run.
#[derive(Error, Debug)]
pub enum DumpError {
    /// More than one of `--dl-all`, `--names-only` and `--dl-names` was given.
    #[error("Only zero or one options of --dl-all, --names-only, and --dl-names may be specified")]
    InvalidArgumentCombination,

    /// The live bucket listing failed.
    #[error("Failed to list buckets")]
    BucketDiscovery(#[source] StoreError),

    /// The names file given to `--dl-names` could not be read.
    #[error("Failed to read names file {}", .path.display())]
    NamesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a single storage call.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ListBuckets failed: {0}")]
    ListBuckets(String),

    #[error("ListObjectsV2 on bucket {bucket} failed: {message}")]
    ListObjects { bucket: String, message: String },

    #[error("GetObject {key} from bucket {bucket} failed: {message}")]
    GetObject {
        bucket: String,
        key: String,
        message: String,
    },

    /// Reading the object body from the service failed mid-transfer.
    #[error("Transfer of {key} from bucket {bucket} was interrupted")]
    Transfer {
        bucket: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a downloaded body to disk failed.
    #[error("Failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating a local directory failed.
    #[error("Failed to create directory {}", .path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The key cannot be mapped to a path inside the bucket directory.
    #[error("Refusing to map key {0:?} to a local path")]
    UnsafeKey(String),
}

/// Why a bucket was skipped.
#[derive(Error, Debug)]
pub enum BucketSkip {
    #[error("You do not have permission to view files in this bucket")]
    NoReadAccess(#[source] StoreError),

    #[error("Download of this bucket was declined")]
    Declined,

    #[error("Test file has failed to be downloaded and read")]
    SampleDownloadFailure(#[source] SampleError),

    #[error("Failed to collect all available files")]
    EnumerationFailure(#[source] StoreError),
}

impl BucketSkip {
    /// Short label used in logs and the run summary.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoReadAccess(_) => "no-read-access",
            Self::Declined => "declined",
            Self::SampleDownloadFailure(_) => "sample-download-failure",
            Self::EnumerationFailure(_) => "enumeration-failure",
        }
    }
}

/// Errors from the test download done before committing to a bucket.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("the first page of the bucket holds no downloadable object")]
    NoDownloadableObject,

    #[error(transparent)]
    Download(#[from] StoreError),

    /// The temporary directory for the test file could not be created.
    #[error("Failed to create a temporary directory for the test file")]
    Scratch(#[source] std::io::Error),

    #[error("Failed to read back {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render `err` and every error in its `source()` chain, separated by `: `.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    std::iter::successors(Some(err), |&err| err.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn chain_names_each_cause_once() {
        let skip = BucketSkip::EnumerationFailure(StoreError::Local {
            path: PathBuf::from("/dump/sess/bucket"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        });

        assert_eq!(
            error_chain(&skip),
            "Failed to collect all available files: \
             Failed to create directory /dump/sess/bucket: permission denied"
        );
    }

    #[test]
    fn transparent_sample_error_is_not_repeated() {
        let skip = BucketSkip::SampleDownloadFailure(SampleError::Download(StoreError::UnsafeKey(
            "../x".into(),
        )));

        let rendered = error_chain(&skip);
        assert_eq!(
            rendered,
            "Test file has failed to be downloaded and read: Refusing to map key \"../x\" to a local path"
        );
    }

    #[test]
    fn anyhow_report_lists_each_cause_once() {
        let err = anyhow::Error::new(DumpError::BucketDiscovery(StoreError::ListBuckets(
            "AccessDenied".into(),
        )));

        let report = format!("{err:#}");
        assert_eq!(report, "Failed to list buckets: ListBuckets failed: AccessDenied");
    }
}
