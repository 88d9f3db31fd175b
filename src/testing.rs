use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use blob_store::BlobStorage;
use chrono::{DateTime, Utc};
use futures::{stream, stream::BoxStream, StreamExt, TryStreamExt};
use object_store::{
    memory::InMemory,
    path::Path,
    Attribute,
    Attributes,
    GetOptions,
    GetResult,
    ListResult,
    MultipartUpload,
    ObjectMeta,
    ObjectStore,
    PutMultipartOpts,
    PutOptions,
    PutPayload,
    PutResult,
};
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{config::ServerConfig, routes::RouteState};

pub const TEST_BASE_PATH: &str = "releases";
pub const TEST_CONTENT_TYPE: &str = "application/x-binary";

/// In-memory bucket that can be told to fail listings, fail reads under a
/// prefix, or report one modification time for every object.
#[derive(Debug)]
pub struct FaultyStore {
    inner: InMemory,
    fail_list: bool,
    broken_prefix: Option<Path>,
    frozen_at: Option<DateTime<Utc>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemory::new(),
            fail_list: false,
            broken_prefix: None,
            frozen_at: None,
        }
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// `key_prefix` is relative to the release base path.
    pub fn broken_under(mut self, key_prefix: &str) -> Self {
        self.broken_prefix = Some(Path::from(format!("{TEST_BASE_PATH}/{key_prefix}")));
        self
    }

    pub fn frozen_at(mut self, ts: DateTime<Utc>) -> Self {
        self.frozen_at = Some(ts);
        self
    }

    fn injected_error() -> object_store::Error {
        object_store::Error::Generic {
            store: "FaultyStore",
            source: "injected store failure".into(),
        }
    }
}

impl fmt::Display for FaultyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaultyStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &Path,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        if self
            .broken_prefix
            .as_ref()
            .is_some_and(|prefix| location.prefix_matches(prefix))
        {
            return Err(Self::injected_error());
        }
        let mut result = self.inner.get_opts(location, options).await?;
        if let Some(ts) = self.frozen_at {
            result.meta.last_modified = ts;
        }
        Ok(result)
    }

    async fn delete(&self, location: &Path) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        if self.fail_list {
            return stream::once(async { Err(Self::injected_error()) }).boxed();
        }
        let frozen_at = self.frozen_at;
        self.inner
            .list(prefix)
            .map_ok(move |mut meta| {
                if let Some(ts) = frozen_at {
                    meta.last_modified = ts;
                }
                meta
            })
            .boxed()
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> object_store::Result<ListResult> {
        if self.fail_list {
            return Err(Self::injected_error());
        }
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

/// Route state over an in-memory bucket.
pub struct TestService {
    pub store: Arc<FaultyStore>,
    pub route_state: RouteState,
}

impl TestService {
    pub fn new() -> Self {
        Self::with_store(FaultyStore::new())
    }

    pub fn with_store(store: FaultyStore) -> Self {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let store = Arc::new(store);
        let blob_storage =
            BlobStorage::from_object_store(store.clone(), Path::from(TEST_BASE_PATH), 4);
        let route_state = RouteState {
            blob_storage: Arc::new(blob_storage),
            config: Arc::new(ServerConfig::default()),
        };
        Self { store, route_state }
    }

    pub async fn put_release(
        &self,
        key: &str,
        body: &'static [u8],
        tags: &[(&'static str, &'static str)],
    ) -> Result<()> {
        self.put_release_with_content_type(key, body, tags, TEST_CONTENT_TYPE)
            .await
    }

    pub async fn put_release_with_content_type(
        &self,
        key: &str,
        body: &'static [u8],
        tags: &[(&'static str, &'static str)],
        content_type: &'static str,
    ) -> Result<()> {
        let mut attributes = Attributes::new();
        for (name, value) in tags {
            attributes.insert(Attribute::Metadata((*name).into()), (*value).into());
        }
        attributes.insert(Attribute::ContentType, content_type.into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        // stored verbatim, unlike Path::from which escapes non-ASCII
        let location = Path::parse(format!("{TEST_BASE_PATH}/{key}"))?;
        self.store
            .put_opts(&location, PutPayload::from_static(body), options)
            .await?;
        Ok(())
    }
}
