//! The storage seam: the three S3 calls the dumper needs.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::DateTimeFormat;
use aws_sdk_s3::Client;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::{ProxyEndpoint, Session};
use crate::error::StoreError;
use crate::proxy::SocksHttpClient;

/// A bucket as returned by `ListBuckets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<String>,
}

/// One page of `ListObjectsV2`.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StoreError>;

    async fn list_objects(
        &self,
        bucket: &str,
        max_keys: i32,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage, StoreError>;

    /// Stream the object to `dest`, returning the number of bytes written.
    /// The parent directory of `dest` must exist.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StoreError>;
}

pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the client once from the session, routing through the proxy if one is configured.
    pub async fn connect(session: &Session, proxy: Option<&ProxyEndpoint>) -> anyhow::Result<Self> {
        let region_provider = RegionProviderChain::first_try(session.region.clone().map(Region::new))
            .or_default_provider()
            .or_else("us-east-1");

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

        if let (Some(access_key), Some(secret_key)) =
            (&session.access_key_id, &session.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                session.session_token.clone(),
                None,
                "s3_dump",
            ));
        }

        if let Some(endpoint) = &session.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        if let Some(proxy) = proxy {
            debug!(proxy = %proxy.url(), "routing S3 calls through proxy");
            loader = loader.http_client(SocksHttpClient::new(proxy)?);
        }

        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(session.endpoint.is_some())
            .build();

        Ok(Self::new(Client::from_conf(s3_config)))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StoreError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StoreError::ListBuckets(DisplayErrorContext(e).to_string()))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                Some(BucketInfo {
                    name: bucket.name()?.to_string(),
                    creation_date: bucket
                        .creation_date()
                        .and_then(|d| d.fmt(DateTimeFormat::DateTime).ok()),
                })
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        max_keys: i32,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage, StoreError> {
        debug!(bucket, max_keys, token = ?continuation_token, "ListObjectsV2");
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| StoreError::ListObjects {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        Ok(ObjectPage {
            keys: output
                .contents()
                .iter()
                .filter_map(|object| object.key())
                .map(str::to_owned)
                .collect(),
            next_token: output.next_continuation_token().map(str::to_owned),
        })
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StoreError> {
        debug!(bucket, key, dest = %dest.display(), "GetObject");
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::GetObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| StoreError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
        let mut body = output.body.into_async_read();
        copy_body(&mut body, &mut file)
            .await
            .map_err(|err| match err {
                CopyError::Read(source) => StoreError::Transfer {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source,
                },
                CopyError::Write(source) => StoreError::Write {
                    path: dest.to_path_buf(),
                    source,
                },
            })
    }
}

#[derive(Debug)]
enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

/// Copy an object body into `out`, keeping read and write failures apart.
async fn copy_body<R, W>(body: &mut R, out: &mut W) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0;
    loop {
        let n = body.read(&mut buf).await.map_err(CopyError::Read)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).await.map_err(CopyError::Write)?;
        written += n as u64;
    }
    out.flush().await.map_err(CopyError::Write)?;
    Ok(written)
}
