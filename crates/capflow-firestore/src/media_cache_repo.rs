//! Firestore-backed media cache entries.

use async_trait::async_trait;

use capflow_models::{MediaCacheEntry, MediaCacheKind};

use crate::client::FirestoreClient;
use crate::convert::{from_document, to_fields};
use crate::error::FirestoreResult;
use crate::store::MediaCacheStore;

const COLLECTION: &str = "media_cache";

/// Entries keyed by `{kind}_{hash}` document ids.
#[derive(Clone)]
pub struct MediaCacheRepository {
    client: FirestoreClient,
}

impl MediaCacheRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaCacheStore for MediaCacheRepository {
    async fn get(&self, kind: MediaCacheKind, hash: &str) -> FirestoreResult<Option<MediaCacheEntry>> {
        let doc_id = MediaCacheEntry::document_id(kind, hash);
        let doc = self.client.get_document(COLLECTION, &doc_id).await?;
        doc.as_ref().map(from_document::<MediaCacheEntry>).transpose()
    }

    async fn upsert(&self, entry: &MediaCacheEntry) -> FirestoreResult<()> {
        let doc_id = MediaCacheEntry::document_id(entry.kind, &entry.hash);
        // Unmasked PATCH without precondition creates or replaces the document
        self.client
            .update_document(COLLECTION, &doc_id, to_fields(entry)?, None, None)
            .await?;
        Ok(())
    }
}
