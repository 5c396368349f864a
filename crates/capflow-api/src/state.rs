//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use capflow_firestore::{FirestoreClient, MemoryStore, Stores};
use capflow_queue::PlanEntitlementGate;
use capflow_storage::{MemoryStorage, ObjectStorage, R2Client};
use capflow_worker::{
    JobService, MediaCacheService, MediaServiceClient, PipelineExecutor, SrtSubtitleGenerator, StageOps,
    WebhookNotifier, WorkerConfig,
};

use crate::config::{ApiConfig, StoreBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub stores: Stores,
    pub jobs: JobService,
}

impl AppState {
    /// Create application state from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let worker_config = WorkerConfig::from_env();

        let (stores, storage): (Stores, Arc<dyn ObjectStorage>) = match config.store_backend {
            StoreBackend::Firestore => {
                let firestore = FirestoreClient::from_env()
                    .await
                    .context("Failed to create Firestore client")?;
                let storage = R2Client::from_env().await.context("Failed to create R2 client")?;
                (Stores::firestore(firestore), Arc::new(storage) as Arc<dyn ObjectStorage>)
            }
            StoreBackend::Memory => {
                info!("Using in-memory stores; records are lost on restart");
                (Stores::memory(MemoryStore::new()), Arc::new(MemoryStorage::default()) as Arc<dyn ObjectStorage>)
            }
        };

        Self::from_components(config, worker_config, stores, storage)
    }

    /// Wire the job service over explicit stores and storage.
    pub fn from_components(
        config: ApiConfig,
        worker_config: WorkerConfig,
        stores: Stores,
        storage: Arc<dyn ObjectStorage>,
    ) -> anyhow::Result<Self> {
        let media = Arc::new(MediaServiceClient::from_config(&worker_config)?);
        let ops = StageOps {
            media: media.clone(),
            stt: media.clone(),
            translator: media,
            subtitles: Arc::new(SrtSubtitleGenerator::new()),
        };
        let notifier = WebhookNotifier::new(stores.webhooks.clone(), worker_config.webhook_timeout)?;
        let cache = MediaCacheService::new(stores.media_cache.clone(), storage.clone(), worker_config.signed_url_ttl);

        let executor = PipelineExecutor::new(
            stores.jobs.clone(),
            storage,
            cache,
            ops,
            Arc::new(notifier),
            worker_config,
        );
        let gate = Arc::new(PlanEntitlementGate::new(stores.plans.clone(), stores.jobs.clone()));
        let jobs = JobService::new(stores.clone(), Arc::new(executor), gate);

        Ok(Self { config, stores, jobs })
    }
}
