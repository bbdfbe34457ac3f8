use crate::algorithms::{CollaborativeModel, ContentModel, InteractionAggregator, ModelSnapshot};
use crate::config::Config;
use crate::error::{RecError, Result};
use crate::models::ModelStatus;
use crate::services::cache::CacheLayer;
use crate::services::stores::{CatalogStore, InteractionStore};
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared model slot plus the counters that drive retraining. Readers
/// clone the current snapshot `Arc` and work against it without holding any
/// lock; a finished training run swaps in a whole new snapshot at once.
pub struct ModelState {
    snapshot: RwLock<Option<Arc<ModelSnapshot>>>,
    training: AtomicBool,
    pending_interactions: AtomicU64,
    version: AtomicU64,
    recompute_requested: AtomicBool,
}

impl ModelState {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            training: AtomicBool::new(false),
            pending_interactions: AtomicU64::new(0),
            version: AtomicU64::new(0),
            recompute_requested: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn install(&self, mut snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        snapshot.version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let arc = Arc::new(snapshot);
        *self.snapshot.write() = Some(arc.clone());
        arc
    }

    /// Wins the exclusive right to train. Exactly one caller sees `true`
    /// until `finish_training` releases the gate.
    pub fn begin_training(&self) -> bool {
        self.training
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish_training(&self) {
        self.training.store(false, Ordering::SeqCst);
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::SeqCst)
    }

    /// Counts an interaction toward the auto-retrain threshold, returning
    /// the new pending total.
    pub fn note_interaction(&self) -> u64 {
        self.pending_interactions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn pending(&self) -> u64 {
        self.pending_interactions.load(Ordering::Relaxed)
    }

    pub fn reset_pending(&self) {
        self.pending_interactions.store(0, Ordering::Relaxed);
    }

    /// Flags that content features went stale (a product edit), so the next
    /// scheduler pass retrains even below the interaction threshold.
    pub fn request_recompute(&self) {
        self.recompute_requested.store(true, Ordering::SeqCst);
    }

    pub fn recompute_requested(&self) -> bool {
        self.recompute_requested.load(Ordering::SeqCst)
    }

    pub fn clear_recompute(&self) {
        self.recompute_requested.store(false, Ordering::SeqCst);
    }
}

impl Default for ModelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one completed training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub version: u64,
    pub user_count: usize,
    pub product_count: usize,
    pub interaction_count: usize,
    pub elapsed_ms: u64,
}

/// Runs full retraining cycles: fetch, aggregate, factorize, build content
/// features, then atomically publish the snapshot and drop stale cache keys.
pub struct TrainingService {
    interactions: Arc<dyn InteractionStore>,
    catalog: Arc<dyn CatalogStore>,
    cache: CacheLayer,
    model: Arc<ModelState>,
    config: Arc<Config>,
}

impl TrainingService {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        catalog: Arc<dyn CatalogStore>,
        cache: CacheLayer,
        model: Arc<ModelState>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            interactions,
            catalog,
            cache,
            model,
            config,
        }
    }

    pub fn model(&self) -> Arc<ModelState> {
        self.model.clone()
    }

    /// Runs one training cycle when due (always when `force`), returning
    /// `Ok(None)` if nothing ran. A concurrent run holds the gate, so a
    /// second trigger is dropped rather than queued.
    pub async fn train_if_needed(&self, force: bool) -> Result<Option<TrainingReport>> {
        if !self.model.begin_training() {
            info!("training already in progress, skipping trigger");
            return Ok(None);
        }

        if !force && !self.retrain_due() {
            self.model.finish_training();
            return Ok(None);
        }

        let result = self.run_training().await;
        self.model.finish_training();
        result.map(Some)
    }

    fn retrain_due(&self) -> bool {
        let training = &self.config.training;
        match self.model.current() {
            None => true,
            Some(snapshot) => {
                let age = Utc::now().signed_duration_since(snapshot.trained_at);
                age >= Duration::hours(training.retrain_interval_hours)
                    || self.model.pending() >= training.auto_retrain_threshold
                    || self.model.recompute_requested()
            }
        }
    }

    async fn run_training(&self) -> Result<TrainingReport> {
        let started = Instant::now();
        let training = &self.config.training;

        let since = (training.max_interaction_age_days > 0)
            .then(|| Utc::now() - Duration::days(training.max_interaction_age_days));
        let interactions = self
            .interactions
            .fetch_interactions(since, training.fetch_limit)
            .await?;
        let products = self
            .catalog
            .fetch_products(self.config.recommendation.catalog_fetch_limit)
            .await?;
        info!(
            interactions = interactions.len(),
            products = products.len(),
            "training inputs fetched"
        );

        let aggregator = InteractionAggregator::new(training);
        let rec = self.config.recommendation.clone();
        let now = Utc::now();

        // The numeric work is CPU-bound; keep it off the runtime threads.
        let handle = tokio::task::spawn_blocking(
            move || -> Result<(CollaborativeModel, ContentModel, usize)> {
                let matrix = aggregator.aggregate(&interactions, now)?;
                let collaborative =
                    CollaborativeModel::train(&matrix, rec.factors, rec.epochs, rec.regularization)?;
                let content = ContentModel::train(&products, rec.max_terms, rec.max_brands);
                Ok((collaborative, content, matrix.interaction_count()))
            },
        );
        let (collaborative, content, row_count) = handle
            .await
            .map_err(|e| RecError::Computation(format!("training task failed: {}", e)))??;

        let snapshot = ModelSnapshot {
            version: 0,
            trained_at: Utc::now(),
            training_row_count: row_count,
            collaborative,
            content,
        };
        let installed = self.model.install(snapshot);
        self.model.reset_pending();
        self.model.clear_recompute();

        // Cached lists computed against the previous snapshot are stale now.
        let purged = self.cache.invalidate_pattern("user_rec:*").await
            + self.cache.invalidate_pattern("product_sim:*").await;

        let report = TrainingReport {
            version: installed.version,
            user_count: installed.collaborative.user_count(),
            product_count: installed.content.len(),
            interaction_count: row_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            version = report.version,
            users = report.user_count,
            products = report.product_count,
            purged_keys = purged,
            elapsed_ms = report.elapsed_ms,
            "model snapshot installed"
        );
        Ok(report)
    }

    pub fn model_status(&self) -> ModelStatus {
        match self.model.current() {
            Some(snapshot) => ModelStatus {
                is_trained: true,
                last_trained_at: Some(snapshot.trained_at),
                training_row_count: snapshot.training_row_count,
                user_count: snapshot.collaborative.user_count(),
                product_count: snapshot.content.len(),
                factorization_rank: snapshot.collaborative.rank(),
                version: snapshot.version,
                training_in_progress: self.model.is_training(),
            },
            None => ModelStatus {
                is_trained: false,
                last_trained_at: None,
                training_row_count: 0,
                user_count: 0,
                product_count: 0,
                factorization_rank: 0,
                version: 0,
                training_in_progress: self.model.is_training(),
            },
        }
    }
}
