//! In-memory object store.
//!
//! Serves single-node and development deployments; production wires an
//! S3-compatible implementation behind the same [`BaseObjectStore`] trait.
//! Multipart sessions and finalized objects live in process memory, so the
//! pre-authorized part URLs it hands out are only meaningful to clients
//! sharing the process (tests, the dev server).

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::traits::{BaseObjectStore, MultipartInit, UploadPart};

#[derive(Debug, Clone)]
struct UploadSession {
    bucket: String,
    key: String,
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    sessions: DashMap<String, UploadSession>,
    objects: DashMap<String, Vec<UploadPart>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a finalized object exists.
    pub fn object_exists(&self, bucket: &str, key: &str) -> bool {
        self.objects.contains_key(&format!("{bucket}/{key}"))
    }
}

#[async_trait]
impl BaseObjectStore for InMemoryObjectStore {
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        part_count: u32,
    ) -> Result<MultipartInit> {
        let upload_id = Uuid::new_v4().to_string();
        self.sessions.insert(
            upload_id.clone(),
            UploadSession {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
        );
        let part_urls = (1..=part_count.max(1))
            .map(|n| {
                format!("https://storage.test/{bucket}/{key}?partNumber={n}&uploadId={upload_id}")
            })
            .collect();
        Ok(MultipartInit {
            upload_id,
            part_urls,
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadPart],
    ) -> Result<String> {
        let Some(session) = self.sessions.get(upload_id).map(|s| s.clone()) else {
            bail!("unknown upload id: {upload_id}");
        };
        if session.bucket != bucket || session.key != key {
            bail!("upload id does not match bucket/key");
        }

        self.sessions.remove(upload_id);
        self.objects
            .insert(format!("{bucket}/{key}"), parts.to_vec());
        Ok(format!("etag-{}", parts.len()))
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        self.sessions.remove(upload_id);
        Ok(())
    }
}
