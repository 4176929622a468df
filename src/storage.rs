use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    types::{Delete, Error as S3Error, ObjectIdentifier},
    Client,
};

use crate::config::S3Config;

/// DeleteObjects accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

/// Object store operations. The server never proxies file bytes: clients
/// upload and download through pre-signed URLs.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn presign_put(&self, key: &str, content_type: &str, seconds: u64) -> anyhow::Result<String>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn delete_objects(&self, keys: &[String]) -> anyhow::Result<()>;
    /// Sum of object sizes under `prefix`, in bytes.
    async fn total_size(&self, prefix: &str) -> anyhow::Result<i64>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        })
    }
}

/// Quiet-mode DeleteObjects requests covering `keys`.
fn delete_batches(keys: &[String]) -> anyhow::Result<Vec<Delete>> {
    keys.chunks(DELETE_BATCH)
        .map(|chunk| {
            let objects = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<Result<Vec<_>, _>>()
                .context("build object identifiers")?;
            Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .context("build delete request")
        })
        .collect()
}

fn describe_failures(errors: &[S3Error]) -> Vec<String> {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.key().unwrap_or("?"), e.code().unwrap_or("unknown")))
        .collect()
}

#[async_trait]
impl StorageClient for Storage {
    async fn presign_put(&self, key: &str, content_type: &str, seconds: u64) -> anyhow::Result<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(Duration::from_secs(seconds))?)
            .await
            .context("s3 presign_put")?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(Duration::from_secs(seconds))?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for delete in delete_batches(keys)? {
            let resp = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .context("s3 delete_objects")?;
            failed.extend(describe_failures(resp.errors()));
        }
        if !failed.is_empty() {
            tracing::warn!(failed = failed.len(), requested = keys.len(), "objects left undeleted");
            anyhow::bail!("failed to delete {} object(s): {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }

    async fn total_size(&self, prefix: &str) -> anyhow::Result<i64> {
        let mut total = 0i64;
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .context("s3 list_objects_v2")?;
            total += resp
                .contents()
                .iter()
                .map(|o| o.size().unwrap_or(0))
                .sum::<i64>();
            match (resp.is_truncated(), resp.next_continuation_token()) {
                (Some(true), Some(next)) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletes_are_split_into_batches_of_a_thousand() {
        let keys: Vec<String> = (0..2500).map(|i| format!("projects/p/{i}.jpg")).collect();
        let batches = delete_batches(&keys).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|d| d.objects().len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(batches[2].objects()[0].key(), "projects/p/2000.jpg");
        assert!(delete_batches(&[]).unwrap().is_empty());
    }

    #[test]
    fn per_key_failures_are_reported() {
        let errors = vec![
            S3Error::builder().key("images/a.jpg").code("AccessDenied").build(),
            S3Error::builder().key("images/b.jpg").build(),
        ];
        assert_eq!(
            describe_failures(&errors),
            vec!["images/a.jpg (AccessDenied)", "images/b.jpg (unknown)"]
        );
    }
}
