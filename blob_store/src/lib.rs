use std::{collections::HashMap, env, fmt::Debug, sync::Arc};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use data_model::{RawStorageEntry, ReleaseKey};
use futures::{stream, stream::BoxStream, StreamExt, TryStreamExt};
use object_store::{
    parse_url_opts,
    path::Path,
    Attribute,
    Attributes,
    GetOptions,
    ObjectMeta,
    ObjectStore,
    ObjectStoreScheme,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    #[serde(default = "default_blob_store_path")]
    pub path: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Number of header requests in flight while reading object tags.
    #[serde(default = "default_tag_fetch_concurrency")]
    pub tag_fetch_concurrency: usize,
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        BlobStorageConfig {
            path: default_blob_store_path(),
            region: None,
            tag_fetch_concurrency: default_tag_fetch_concurrency(),
        }
    }
}

fn default_blob_store_path() -> String {
    let dir = env::current_dir()
        .map(|dir| dir.join("release_storage"))
        .unwrap_or_else(|_| "release_storage".into());
    format!("file://{}", dir.display())
}

fn default_tag_fetch_concurrency() -> usize {
    16
}

/// A single object opened for download. `stream` yields the object's bytes
/// as the store produces them.
pub struct ReleaseDownload {
    pub stream: BoxStream<'static, Result<Bytes>>,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl Debug for ReleaseDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseDownload")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .finish()
    }
}

/// Read-only view of the release bucket. Keys handed in and out are relative
/// to the configured base path.
#[derive(Clone)]
pub struct BlobStorage {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    tag_fetch_concurrency: usize,
}

impl BlobStorage {
    pub fn new(config: BlobStorageConfig) -> Result<Self> {
        let (object_store, path) = Self::build_object_store(&config.path, config.region)?;
        info!("using blob store path: {}", config.path);
        Ok(Self::from_object_store(
            Arc::from(object_store),
            path,
            config.tag_fetch_concurrency,
        ))
    }

    pub fn from_object_store(
        object_store: Arc<dyn ObjectStore>,
        path: Path,
        tag_fetch_concurrency: usize,
    ) -> Self {
        Self {
            object_store,
            path,
            tag_fetch_concurrency: tag_fetch_concurrency.max(1),
        }
    }

    pub fn build_object_store(
        url_str: &str,
        region: Option<String>,
    ) -> Result<(Box<dyn ObjectStore>, Path)> {
        let url = url_str
            .parse::<Url>()
            .with_context(|| format!("invalid blob store url: {url_str}"))?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)?;
        let mut opts: Vec<(String, String)> = Vec::new();
        if matches!(scheme, ObjectStoreScheme::AmazonS3) {
            // inject AWS environment variables so static keys win over instance
            // metadata credentials.
            opts.extend(
                env::vars()
                    .filter(|(key, _)| key.starts_with("AWS_"))
                    .map(|(key, value)| (key.to_ascii_lowercase(), value)),
            );
            if let Some(region) = region {
                opts.push(("aws_region".to_string(), region));
            }
        }
        Ok(parse_url_opts(&url, opts)?)
    }

    pub fn get_object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    pub fn get_path(&self) -> Path {
        self.path.clone()
    }

    /// Lists every object under `prefix` together with its tags.
    ///
    /// The returned order is the store's listing order. Objects deleted
    /// between the listing and the tag lookup are skipped.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<RawStorageEntry>> {
        let list_path = match prefix.filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => self.path.child(prefix),
            None => self.path.clone(),
        };
        let list_prefix = (!list_path.as_ref().is_empty()).then_some(&list_path);
        let objects: Vec<ObjectMeta> = self
            .object_store
            .list(list_prefix)
            .try_collect()
            .await
            .map_err(|e| anyhow!("can't list objects under {:?}: {:?}", list_path, e))?;
        debug!(prefix = ?list_prefix, count = objects.len(), "listed objects");

        let entries: Vec<Option<RawStorageEntry>> = stream::iter(objects)
            .map(|meta| self.read_entry(meta))
            .buffered(self.tag_fetch_concurrency)
            .try_collect()
            .await?;
        Ok(entries.into_iter().flatten().collect())
    }

    async fn read_entry(&self, meta: ObjectMeta) -> Result<Option<RawStorageEntry>> {
        let Some(key) = self.relative_key(&meta.location) else {
            return Ok(None);
        };
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let attributes = match self.object_store.get_opts(&meta.location, options).await {
            Ok(result) => result.attributes,
            Err(object_store::Error::NotFound { .. }) => {
                debug!(key = %key, "object disappeared before its tags were read");
                return Ok(None);
            }
            Err(e) => return Err(anyhow!("can't read tags of {:?}: {:?}", key, e)),
        };
        Ok(Some(RawStorageEntry {
            key: ReleaseKey::new(key),
            size: meta.size as u64,
            uploaded: Some(meta.last_modified),
            tags: tags_from_attributes(&attributes),
        }))
    }

    /// Opens `key` for streaming. `Ok(None)` means the object does not exist,
    /// including keys that cannot name an object at all.
    pub async fn get(&self, key: &str) -> Result<Option<ReleaseDownload>> {
        let Some(location) = self.location(key) else {
            return Ok(None);
        };
        let result = match self.object_store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(anyhow!("can't get object {:?}: {:?}", key, e)),
        };

        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());
        let size = result.meta.size as u64;
        let etag = result.meta.e_tag.clone();
        let key = key.to_string();
        let stream = result
            .into_stream()
            .map(move |chunk| {
                chunk.map_err(|e| anyhow!("error reading object {:?}: {:?}", key, e))
            })
            .boxed();

        Ok(Some(ReleaseDownload {
            stream,
            size,
            content_type,
            etag,
        }))
    }

    fn relative_key(&self, location: &Path) -> Option<String> {
        let location = location.as_ref();
        let base = self.path.as_ref();
        if base.is_empty() {
            return Some(location.to_string());
        }
        location
            .strip_prefix(base)?
            .strip_prefix(object_store::path::DELIMITER)
            .map(str::to_string)
    }

    fn location(&self, key: &str) -> Option<Path> {
        if key.is_empty() {
            return None;
        }
        let base = self.path.as_ref();
        let full = if base.is_empty() {
            key.to_string()
        } else {
            format!("{base}{}{key}", object_store::path::DELIMITER)
        };
        Path::parse(full).ok()
    }
}

fn tags_from_attributes(attributes: &Attributes) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|(attribute, value)| match attribute {
            Attribute::Metadata(name) => Some((name.to_string(), value.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use object_store::{memory::InMemory, PutOptions, PutPayload};

    use super::*;

    async fn put_release(
        store: &Arc<dyn ObjectStore>,
        key: &str,
        body: &'static [u8],
        tags: &[(&'static str, &'static str)],
    ) {
        let mut attributes = Attributes::new();
        for (name, value) in tags {
            attributes.insert(Attribute::Metadata((*name).into()), (*value).into());
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        store
            .put_opts(&Path::from(key), PutPayload::from_static(body), options)
            .await
            .unwrap();
    }

    async fn test_storage() -> BlobStorage {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        put_release(&store, "releases/tool/1.0/linux-x64/tool.bin", b"abcdef", &[]).await;
        put_release(
            &store,
            "releases/tool/1.1/linux-x64/tool.bin",
            b"abc",
            &[("product", "agent"), ("checksum", "sha256:00")],
        )
        .await;
        put_release(&store, "releases/agent/2.0/darwin-arm64/agent.pkg", b"a", &[]).await;
        put_release(&store, "elsewhere/ignored.bin", b"zz", &[]).await;
        BlobStorage::from_object_store(store, Path::from("releases"), 2)
    }

    #[tokio::test]
    async fn test_list_relative_keys_and_tags() {
        let storage = test_storage().await;
        // tags are fetched concurrently but entries keep the store's listing order
        let entries = storage.list(None).await.unwrap();

        let keys: Vec<&str> = entries.iter().map(|e| e.key.get()).collect();
        assert_eq!(
            keys,
            vec![
                "agent/2.0/darwin-arm64/agent.pkg",
                "tool/1.0/linux-x64/tool.bin",
                "tool/1.1/linux-x64/tool.bin",
            ]
        );
        assert_eq!(entries[1].size, 6);
        assert!(entries[1].uploaded.is_some());
        assert!(entries[1].tags.is_empty());
        assert_eq!(entries[2].tags.get("product").map(String::as_str), Some("agent"));
        assert_eq!(
            entries[2].tags.get("checksum").map(String::as_str),
            Some("sha256:00")
        );
    }

    #[tokio::test]
    async fn test_list_keeps_store_order_under_concurrency() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let names: Vec<String> = (0..32).map(|i| format!("p/{i:02}/linux-x64/f.bin")).collect();
        for name in names.iter().rev() {
            put_release(&store, &format!("releases/{name}"), b"x", &[("version", "1")]).await;
        }
        let storage = BlobStorage::from_object_store(store, Path::from("releases"), 8);

        let entries = storage.list(None).await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.get()).collect();
        assert_eq!(keys, names.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let storage = test_storage().await;
        let entries = storage.list(Some("tool")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.key.get().starts_with("tool/")));

        assert!(storage.list(Some("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_streams_whole_object() {
        let storage = test_storage().await;
        let download = storage
            .get("tool/1.0/linux-x64/tool.bin")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(download.size, 6);
        let chunks: Vec<Bytes> = download.stream.try_collect().await.unwrap();
        let body: Vec<u8> = chunks.concat();
        assert_eq!(body.len() as u64, download.size);
        assert_eq!(body, b"abcdef");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_an_error() {
        let storage = test_storage().await;
        assert!(storage.get("tool/9.9/linux-x64/tool.bin").await.unwrap().is_none());
        assert!(storage.get("").await.unwrap().is_none());
        assert!(storage.get("../elsewhere/ignored.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_filesystem_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", temp_dir.path().display());
        let storage = BlobStorage::new(BlobStorageConfig {
            path: url,
            region: None,
            tag_fetch_concurrency: 4,
        })
        .unwrap();
        storage
            .get_object_store()
            .put(
                &storage.get_path().child("tool").child("1.0").child("linux-x64").child("t.bin"),
                PutPayload::from_static(b"hello"),
            )
            .await
            .unwrap();

        let entries = storage.list(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.get(), "tool/1.0/linux-x64/t.bin");
        assert_eq!(entries[0].size, 5);

        let download = storage.get("tool/1.0/linux-x64/t.bin").await.unwrap().unwrap();
        assert_eq!(download.size, 5);
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(BlobStorage::build_object_store("not a url", None).is_err());
    }
}
