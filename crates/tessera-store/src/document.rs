//! MongoDB document storage adapter.
//!
//! One document per chunk, `_id` equal to the chunk id verbatim. Writes are
//! upserts by `_id`; a TTL index on `lastAccessed` gives the backend its own
//! eviction path on top of the explicit `expires` checks. Timestamps are
//! stored as BSON dates, which carry millisecond resolution natively.

use async_trait::async_trait;
use bson::{doc, Bson, DateTime as BsonDateTime, Document};
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, IndexOptions, Tls, TlsOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use tessera_core::{Chunk, ChunkFilter, ChunkSummary, ChunkType, StorageAdapter, StoreError};

use crate::retry::{with_retry, RetryConfig};

/// Driver-level connection options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MongoOptions {
    pub max_pool_size: Option<u32>,
    #[serde(rename = "serverSelectionTimeoutMS")]
    pub server_selection_timeout_ms: Option<u64>,
    #[serde(rename = "connectTimeoutMS")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(rename = "socketTimeoutMS")]
    pub socket_timeout_ms: Option<u64>,
    pub tls_ca_file: Option<PathBuf>,
}

/// Configuration for the MongoDB adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub options: MongoOptions,
    /// Extra single-field ascending indexes beyond the defaults.
    pub indexes: Vec<String>,
    /// TTL for the `lastAccessed` index and for chunks without an explicit
    /// expiry, seconds.
    #[serde(rename = "defaultTTL")]
    pub default_ttl_secs: u64,
    #[serde(rename = "retryStrategy")]
    pub retry: RetryConfig,
    pub cleanup_on_start: bool,
    #[serde(rename = "cleanupInterval")]
    pub cleanup_interval_ms: Option<u64>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_string(),
            database: "tessera".to_string(),
            collection: "chunks".to_string(),
            options: MongoOptions::default(),
            indexes: Vec::new(),
            default_ttl_secs: 86_400,
            retry: RetryConfig::default(),
            cleanup_on_start: false,
            cleanup_interval_ms: None,
        }
    }
}

/// Stored document shape; `_id` is the chunk id.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkDocument {
    #[serde(rename = "_id")]
    id: String,
    file_key: String,
    #[serde(rename = "type")]
    chunk_type: String,
    created: BsonDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<BsonDateTime>,
    last_accessed: BsonDateTime,
    data: Bson,
    links: Vec<String>,
    size: i64,
    metadata: Document,
}

impl ChunkDocument {
    fn from_chunk(chunk: &Chunk) -> Result<Self, StoreError> {
        let data = bson::to_bson(&chunk.data)
            .map_err(|err| StoreError::Permanent(format!("bson encode: {err}")))?;
        Ok(Self {
            id: chunk.id.clone(),
            file_key: chunk.file_key.clone(),
            chunk_type: chunk.chunk_type.as_str().to_string(),
            created: BsonDateTime::from_chrono(chunk.created),
            expires: chunk.expires.map(BsonDateTime::from_chrono),
            last_accessed: BsonDateTime::from_chrono(chunk.last_accessed),
            data,
            links: chunk.links.clone(),
            size: chunk.size() as i64,
            metadata: Document::new(),
        })
    }

    fn into_chunk(self) -> Result<Chunk, StoreError> {
        let chunk_type: ChunkType = self
            .chunk_type
            .parse()
            .map_err(|_| StoreError::Permanent(format!("unknown chunk type: {}", self.chunk_type)))?;
        let data = bson::from_bson(self.data)
            .map_err(|err| StoreError::Permanent(format!("bson decode: {err}")))?;
        Ok(Chunk {
            id: self.id,
            file_key: self.file_key,
            chunk_type,
            created: self.created.to_chrono(),
            last_accessed: self.last_accessed.to_chrono(),
            expires: self.expires.map(|dt| dt.to_chrono()),
            data,
            links: self.links,
        })
    }
}

/// MongoDB adapter over a single TTL-indexed collection.
pub struct MongoAdapter {
    config: MongoConfig,
    default_ttl: Duration,
    client: OnceCell<Client>,
    cleanup_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MongoAdapter {
    /// Create the adapter; the client is established on first use.
    ///
    /// Background cleanup (when configured) is spawned here and must run
    /// inside a tokio runtime.
    #[must_use]
    pub fn connect(config: MongoConfig) -> Arc<Self> {
        let adapter = Arc::new(Self {
            default_ttl: Duration::seconds(config.default_ttl_secs as i64),
            config,
            client: OnceCell::new(),
            cleanup_task: std::sync::Mutex::new(None),
        });
        crate::spawn_cleanup(
            &adapter,
            adapter.config.cleanup_on_start,
            adapter.config.cleanup_interval_ms,
            &adapter.cleanup_task,
        );
        adapter
    }

    async fn client(&self) -> Result<&Client, StoreError> {
        self.client
            .get_or_try_init(|| async {
                with_retry(&self.config.retry, "mongodb connect", || self.establish()).await
            })
            .await
    }

    async fn establish(&self) -> Result<Client, StoreError> {
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(transient)?;
        let extra = &self.config.options;
        options.max_pool_size = extra.max_pool_size;
        options.server_selection_timeout = extra
            .server_selection_timeout_ms
            .map(std::time::Duration::from_millis);
        options.connect_timeout = extra.connect_timeout_ms.map(std::time::Duration::from_millis);
        if let Some(ca) = &extra.tls_ca_file {
            options.tls = Some(Tls::Enabled(
                TlsOptions::builder().ca_file_path(ca.clone()).build(),
            ));
        }

        let client = Client::with_options(options).map_err(permanent)?;
        self.ensure_indexes(&client).await?;
        debug!(database = %self.config.database, "connected to mongodb");
        Ok(client)
    }

    async fn collection(&self) -> Result<Collection<ChunkDocument>, StoreError> {
        let client = self.client().await?;
        Ok(client
            .database(&self.config.database)
            .collection(&self.config.collection))
    }

    async fn ensure_indexes(&self, client: &Client) -> Result<(), StoreError> {
        let coll: Collection<ChunkDocument> = client
            .database(&self.config.database)
            .collection(&self.config.collection);

        let mut models = vec![
            IndexModel::builder().keys(doc! {"fileKey": 1}).build(),
            IndexModel::builder().keys(doc! {"type": 1}).build(),
            IndexModel::builder()
                .keys(doc! {"lastAccessed": 1})
                .options(
                    IndexOptions::builder()
                        .expire_after(std::time::Duration::from_secs(
                            self.config.default_ttl_secs,
                        ))
                        .build(),
                )
                .build(),
        ];
        for field in &self.config.indexes {
            let mut keys = Document::new();
            keys.insert(field.clone(), 1);
            models.push(IndexModel::builder().keys(keys).build());
        }

        coll.create_indexes(models).await.map_err(transient)?;
        Ok(())
    }

    fn expiry_cutoff(&self, now: DateTime<Utc>) -> BsonDateTime {
        BsonDateTime::from_chrono(now - self.default_ttl)
    }

    /// Run one driver operation under `socketTimeoutMS`, when configured.
    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = mongodb::error::Result<T>>,
    ) -> Result<T, StoreError> {
        match self.config.options.socket_timeout_ms {
            Some(ms) => {
                let deadline = std::time::Duration::from_millis(ms);
                match tokio::time::timeout(deadline, fut).await {
                    Ok(result) => result.map_err(transient),
                    Err(_) => Err(StoreError::Transient("mongodb operation timed out".into())),
                }
            }
            None => fut.await.map_err(transient),
        }
    }
}

#[async_trait]
impl StorageAdapter for MongoAdapter {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn save(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let document = ChunkDocument::from_chunk(chunk)?;
        with_retry(&self.config.retry, "mongodb save", || async {
            let coll = self.collection().await?;
            self.timed(async {
                coll.replace_one(doc! {"_id": &chunk.id}, &document)
                    .upsert(true)
                    .await
            })
            .await?;
            Ok(())
        })
        .await?;
        debug!(chunk_id = %chunk.id, "saved chunk");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        let found = with_retry(&self.config.retry, "mongodb get", || async {
            let coll = self.collection().await?;
            self.timed(async { coll.find_one(doc! {"_id": id}).await })
                .await
        })
        .await?;

        let Some(document) = found else {
            return Ok(None);
        };
        let chunk = match document.into_chunk() {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(chunk_id = %id, error = %err, "corrupt document, treating as absent");
                return Ok(None);
            }
        };

        if chunk.is_expired(Utc::now(), self.default_ttl) {
            debug!(chunk_id = %id, "evicting expired chunk on read");
            let coll = self.collection().await?;
            if let Err(err) = self.timed(async { coll.delete_one(doc! {"_id": id}).await }).await {
                warn!(chunk_id = %id, error = %err, "failed to evict expired chunk");
            }
            return Ok(None);
        }

        // Best-effort lastAccessed bump; failures are logged, not surfaced.
        let coll = self.collection().await?;
        let update = doc! {"$set": {"lastAccessed": BsonDateTime::from_chrono(Utc::now())}};
        if let Err(err) = self
            .timed(async { coll.update_one(doc! {"_id": id}, update).await })
            .await
        {
            warn!(chunk_id = %id, error = %err, "failed to update lastAccessed");
        }

        Ok(Some(chunk))
    }

    async fn has(&self, id: &str) -> Result<bool, StoreError> {
        let count = with_retry(&self.config.retry, "mongodb has", || async {
            let coll = self.collection().await?;
            self.timed(async { coll.count_documents(doc! {"_id": id}).await })
                .await
        })
        .await?;
        Ok(count > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = with_retry(&self.config.retry, "mongodb delete", || async {
            let coll = self.collection().await?;
            self.timed(async { coll.delete_one(doc! {"_id": id}).await })
                .await
        })
        .await?;
        Ok(result.deleted_count > 0)
    }

    async fn list(&self, filter: Option<ChunkFilter>) -> Result<Vec<ChunkSummary>, StoreError> {
        let filter = filter.unwrap_or_default();

        // Narrow in the database on the indexed fields, finish in memory.
        let mut query = Document::new();
        if let Some(file_key) = &filter.file_key {
            query.insert("fileKey", file_key);
        }
        if let Some(ty) = filter.chunk_type {
            query.insert("type", ty.as_str());
        }

        let documents: Vec<ChunkDocument> =
            with_retry(&self.config.retry, "mongodb list", || async {
                let coll = self.collection().await?;
                self.timed(async {
                    let cursor = coll.find(query.clone()).await?;
                    cursor.try_collect().await
                })
                .await
            })
            .await?;

        let mut chunks = Vec::new();
        for document in documents {
            match document.into_chunk() {
                Ok(chunk) => chunks.push(chunk),
                Err(err) => warn!(error = %err, "skipping corrupt document"),
            }
        }
        Ok(filter.apply(chunks.iter(), self.default_ttl))
    }

    async fn cleanup(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let query = doc! {
            "$or": [
                {"expires": {"$lt": BsonDateTime::from_chrono(now)}},
                {"expires": Bson::Null, "created": {"$lt": self.expiry_cutoff(now)}},
            ]
        };
        let result = with_retry(&self.config.retry, "mongodb cleanup", || async {
            let coll = self.collection().await?;
            self.timed(async { coll.delete_many(query.clone()).await })
                .await
        })
        .await?;
        debug!(evicted = result.deleted_count, "mongodb cleanup");
        Ok(result.deleted_count)
    }

    async fn close(&self) -> Result<(), StoreError> {
        crate::abort_cleanup(&self.cleanup_task);
        if let Some(client) = self.client.get() {
            client.clone().shutdown().await;
        }
        Ok(())
    }
}

impl MongoAdapter {
    /// One batched upsert for a whole chunk set; empty input is a no-op.
    pub async fn save_batch(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut updates = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let document = bson::to_document(&ChunkDocument::from_chunk(chunk)?)
                .map_err(|err| StoreError::Permanent(format!("bson encode: {err}")))?;
            updates.push(doc! {
                "q": {"_id": &chunk.id},
                "u": document,
                "upsert": true,
            });
        }
        let command = doc! {
            "update": &self.config.collection,
            "updates": updates,
        };

        with_retry(&self.config.retry, "mongodb bulk save", || async {
            let client = self.client().await?;
            let database = client.database(&self.config.database);
            self.timed(async { database.run_command(command.clone()).await })
                .await?;
            Ok(())
        })
        .await?;
        debug!(count = chunks.len(), "bulk saved chunks");
        Ok(())
    }

    /// Forward an opaque aggregation pipeline to the collection.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection().await?;
        self.timed(async {
            let cursor = coll.aggregate(pipeline).await?;
            cursor.try_collect().await
        })
        .await
    }
}

fn transient(err: mongodb::error::Error) -> StoreError {
    StoreError::Transient(err.to_string())
}

fn permanent(err: mongodb::error::Error) -> StoreError {
    StoreError::Permanent(err.to_string())
}
