//! Bucket discovery, permission probing, enumeration and download.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::console::Console;
use crate::error::{error_chain, BucketSkip, DumpError, SampleError, StoreError};
use crate::layout::{relative_key_path, Layout};
use crate::mode::Mode;
use crate::names::{NamesFile, NamesList};
use crate::pager::KeyIter;
use crate::store::{BucketInfo, ObjectPage, ObjectStore};

/// Page size of the read-permission probe.
pub const PROBE_PAGE_SIZE: i32 = 10;
/// Page size of the full enumeration.
pub const LIST_PAGE_SIZE: i32 = 100;
/// Consecutive download failures after which the user is asked whether to go on.
pub const FAILURE_STREAK_LIMIT: u32 = 5;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub buckets_found: usize,
    /// Skipped buckets by [`BucketSkip::reason`].
    pub buckets_skipped: BTreeMap<&'static str, usize>,
    pub keys_listed: usize,
    pub files_downloaded: usize,
    pub downloads_failed: usize,
    pub downloads_abandoned: usize,
}

impl RunSummary {
    pub fn skipped(&self, reason: &str) -> usize {
        self.buckets_skipped.get(reason).copied().unwrap_or(0)
    }

    fn add(&mut self, report: &BucketReport) {
        self.keys_listed += report.keys_listed;
        self.files_downloaded += report.downloaded;
        self.downloads_failed += report.failed;
        self.downloads_abandoned += report.abandoned;
    }
}

#[derive(Debug, Default)]
struct BucketReport {
    keys_listed: usize,
    downloaded: usize,
    failed: usize,
    abandoned: usize,
}

/// Consecutive download failures within one bucket.
#[derive(Debug, Default)]
struct FailureStreak {
    consecutive: u32,
    acknowledged: bool,
}

impl FailureStreak {
    fn needs_checkpoint(&self) -> bool {
        self.consecutive >= FAILURE_STREAK_LIMIT && !self.acknowledged
    }

    fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    fn success(&mut self) {
        *self = Self::default();
    }

    fn failure(&mut self) {
        self.consecutive += 1;
    }
}

pub struct BucketDumper<'a, S: ?Sized, C: ?Sized> {
    store: &'a S,
    console: &'a mut C,
    layout: Layout,
    mode: Mode,
}

impl<'a, S, C> BucketDumper<'a, S, C>
where
    S: ObjectStore + ?Sized,
    C: Console + ?Sized,
{
    pub fn new(store: &'a S, console: &'a mut C, layout: Layout, mode: Mode) -> Self {
        Self {
            store,
            console,
            layout,
            mode,
        }
    }

    pub async fn run(&mut self) -> Result<RunSummary, DumpError> {
        let (buckets, supplied) = match self.mode.names_file() {
            Some(path) => {
                let path = path.to_path_buf();
                let (buckets, names) = self.derive_buckets(&path).await?;
                (buckets, Some(names))
            }
            None => (self.discover_buckets().await?, None),
        };

        let mut summary = RunSummary {
            buckets_found: buckets.len(),
            ..RunSummary::default()
        };

        let names_file = if self.mode.enumerates() {
            match NamesFile::create(self.layout.names_file()).await {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!(error = %err, "cannot create names file, key names will not be saved");
                    self.console.announce(&format!(
                        "Failed to create {}: {err}",
                        self.layout.names_file().display()
                    ));
                    None
                }
            }
        } else {
            None
        };

        self.console.announce("Starting scan process...");
        for bucket in &buckets {
            self.console.announce(&format!("  Bucket name: \"{bucket}\""));
            match self
                .dump_bucket(bucket, supplied.as_ref(), names_file.as_ref())
                .await
            {
                Ok(report) => {
                    debug!(bucket, ?report, "bucket done");
                    summary.add(&report);
                }
                Err(skip) => {
                    let error = error_chain(&skip);
                    warn!(bucket, reason = skip.reason(), error, "skipping bucket");
                    if !matches!(skip, BucketSkip::Declined) {
                        self.console.announce(&format!("      {error}"));
                    }
                    self.console.announce("      Skipping to next bucket.");
                    *summary.buckets_skipped.entry(skip.reason()).or_default() += 1;
                }
            }
        }

        self.console.announce("All buckets have been analyzed.");
        info!(?summary, "run complete");
        Ok(summary)
    }

    async fn discover_buckets(&mut self) -> Result<Vec<String>, DumpError> {
        self.console.announce("Finding existing buckets...");
        let infos = self
            .store
            .list_buckets()
            .await
            .map_err(DumpError::BucketDiscovery)?;

        let cache = self.layout.bucket_cache_file();
        if let Err(err) = save_bucket_cache(&cache, &infos).await {
            warn!(path = %cache.display(), error = %err, "failed to cache bucket listing");
            self.console
                .announce(&format!("  Failed to save bucket listing to {}: {err}", cache.display()));
        }

        for info in &infos {
            self.console
                .announce(&format!("  Found bucket \"{}\".", info.name));
        }
        Ok(infos.into_iter().map(|info| info.name).collect())
    }

    async fn derive_buckets(&mut self, path: &Path) -> Result<(Vec<String>, NamesList), DumpError> {
        self.console
            .announce("Found --dl-names argument, skipping bucket enumeration.");
        let names = NamesList::read(path).await?;
        let buckets: Vec<String> = names.buckets().into_iter().collect();
        info!(records = names.len(), buckets = buckets.len(), "read names file");

        self.console.announce(&format!(
            "Relevant buckets extracted from the supplied list include:\n{}\n",
            buckets.join("\n")
        ));
        Ok((buckets, names))
    }

    async fn dump_bucket(
        &mut self,
        bucket: &str,
        supplied: Option<&NamesList>,
        names_file: Option<&NamesFile>,
    ) -> Result<BucketReport, BucketSkip> {
        self.console.announce("    Checking read permissions...");
        let probe = self
            .store
            .list_objects(bucket, PROBE_PAGE_SIZE, None)
            .await
            .map_err(BucketSkip::NoReadAccess)?;

        if self.mode.prompts()
            && !self.console.confirm(&format!(
                "      You have permission to read files in bucket {bucket}, do you want to attempt to download all files in it? (y/n) "
            ))
        {
            return Err(BucketSkip::Declined);
        }

        if self.mode.downloads() {
            self.console
                .announce("    Attempting to download a test file...");
            let key = self
                .sample_download(bucket, &probe)
                .await
                .map_err(BucketSkip::SampleDownloadFailure)?;
            self.console.announce(&format!(
                "      Test file {key} has been downloaded and read successfully."
            ));
        }

        let mut report = BucketReport::default();
        let candidates = match supplied {
            Some(names) => {
                self.console
                    .announce("    File names were supplied, skipping file name enumeration.");
                names.keys_for(bucket)
            }
            None => {
                self.console.announce("    Finding all files in the bucket...");
                let keys = self
                    .enumerate(bucket)
                    .await
                    .map_err(BucketSkip::EnumerationFailure)?;
                self.console
                    .announce("      Successfully collected all available file names.");
                report.keys_listed = keys.len();

                if let Some(names_file) = names_file {
                    self.save_names(names_file, bucket, &keys).await;
                }
                keys
            }
        };

        if self.mode.downloads() {
            self.download_keys(bucket, &candidates, &mut report).await;
        }
        Ok(report)
    }

    /// Download the first non-directory key of the probe page into a private
    /// temporary directory and read it back. The copy is removed on return.
    async fn sample_download<'p>(
        &self,
        bucket: &str,
        probe: &'p ObjectPage,
    ) -> Result<&'p str, SampleError> {
        let key = probe
            .keys
            .iter()
            .find(|key| !is_directory_marker(key))
            .map(String::as_str)
            .ok_or(SampleError::NoDownloadableObject)?;

        let scratch = tempfile::Builder::new()
            .prefix("s3_dump_sample")
            .tempdir()
            .map_err(SampleError::Scratch)?;
        let path = scratch.path().join(relative_key_path(key)?);
        create_parent(&path).await?;
        self.store.download(bucket, key, &path).await?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| SampleError::Read {
                path: path.clone(),
                source,
            })?;
        debug!(bucket, key, bytes = bytes.len(), "test file read back");
        Ok(key)
    }

    /// List every key of the bucket, creating local directories for directory markers.
    async fn enumerate(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        create_dir(&self.layout.bucket_dir(bucket)).await?;

        let mut iter = KeyIter::new(self.store, bucket, LIST_PAGE_SIZE);
        let mut keys = Vec::new();
        while let Some(key) = iter.next().await? {
            if is_directory_marker(&key) {
                match self.layout.object_path(bucket, &key) {
                    Ok(dir) => create_dir(&dir).await?,
                    Err(err) => warn!(bucket, error = %err, "not creating directory"),
                }
            } else {
                keys.push(key);
            }
        }
        debug!(bucket, keys = keys.len(), pages = iter.pages_fetched(), "enumerated");
        Ok(keys)
    }

    async fn save_names(&mut self, names_file: &NamesFile, bucket: &str, keys: &[String]) {
        match names_file.append(bucket, keys).await {
            Ok(()) => self.console.announce(&format!(
                "    Saved found file names to {}.",
                names_file.path().display()
            )),
            Err(err) => {
                warn!(bucket, error = %err, "failed to save file names");
                self.console.announce(&format!(
                    "    Failed to save file names to {}: {err}",
                    names_file.path().display()
                ));
            }
        }
    }

    async fn download_keys(&mut self, bucket: &str, keys: &[String], report: &mut BucketReport) {
        self.console.announce("    Starting to download files...");
        let mut streak = FailureStreak::default();

        for (index, key) in keys.iter().enumerate() {
            if streak.needs_checkpoint() {
                let go_on = self.console.confirm(&format!(
                    "    There have been {FAILURE_STREAK_LIMIT} failed downloads in a row, do you want to continue and ignore this message for the current bucket (y) or move onto the next bucket (n)? "
                ));
                if !go_on {
                    report.abandoned = keys.len() - index;
                    warn!(bucket, abandoned = report.abandoned, "abandoning bucket after failure streak");
                    return;
                }
                streak.acknowledge();
            }

            self.console
                .announce(&format!("      Downloading file {key}..."));
            match self.download_key(bucket, key).await {
                Ok(bytes) => {
                    debug!(bucket, key, bytes, "downloaded");
                    self.console.announce("        Successful.");
                    streak.success();
                    report.downloaded += 1;
                }
                Err(err) => {
                    let error = error_chain(&err);
                    warn!(bucket, key, error, "download failed");
                    self.console.announce(&format!("        {error}"));
                    self.console
                        .announce("        Failed to download, moving onto next file.");
                    streak.failure();
                    report.failed += 1;
                }
            }
        }
    }

    async fn download_key(&self, bucket: &str, key: &str) -> Result<u64, StoreError> {
        let path = self.layout.object_path(bucket, key)?;
        create_parent(&path).await?;
        self.store.download(bucket, key, &path).await
    }
}

pub fn is_directory_marker(key: &str) -> bool {
    key.ends_with('/')
}

async fn create_dir(path: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| StoreError::Local {
            path: path.to_path_buf(),
            source,
        })
}

async fn create_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) => create_dir(parent).await,
        None => Ok(()),
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct BucketCache<'a> {
    buckets: &'a [BucketInfo],
}

/// Record the live bucket listing in the session directory.
async fn save_bucket_cache(path: &Path, buckets: &[BucketInfo]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(&BucketCache { buckets }).map_err(std::io::Error::other)?;
    tokio::fs::write(path, json).await
}
