use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::AppConfig;
use crate::database::models::ApprovalQueueEntry;
use crate::services::tor_service::TorEvaluation;
use crate::services::{DocumentRequestService, EnrollmentService, GradeService, TorService};
use crate::storage::DocumentStorage;
use crate::types::Role;

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn DocumentStorage>,
    pub approval_queues: Arc<TtlCache<Role, Vec<ApprovalQueueEntry>>>,
    pub evaluations: Arc<TtlCache<i64, TorEvaluation>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, storage: Arc<dyn DocumentStorage>) -> Self {
        let ttl = Duration::from_secs(config.workflow.cache_ttl_secs);
        Self {
            pool,
            config: Arc::new(config),
            storage,
            approval_queues: Arc::new(TtlCache::new(ttl)),
            evaluations: Arc::new(TtlCache::new(ttl)),
        }
    }

    fn retries(&self) -> u32 {
        self.config.database.transient_retries
    }

    pub fn enrollments(&self) -> EnrollmentService {
        EnrollmentService::new(self.pool.clone(), self.storage.clone(), self.retries())
    }

    pub fn grades(&self) -> GradeService {
        GradeService::new(self.pool.clone(), self.approval_queues.clone(), self.retries())
    }

    pub fn transcripts(&self) -> TorService {
        TorService::new(self.pool.clone(), self.evaluations.clone(), self.retries())
    }

    pub fn document_requests(&self) -> DocumentRequestService {
        DocumentRequestService::new(self.pool.clone(), self.retries())
    }

    /// Drop expired cache entries; run periodically by the server
    pub async fn purge_caches(&self) -> usize {
        self.approval_queues.purge_expired().await + self.evaluations.purge_expired().await
    }
}
