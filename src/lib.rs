pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecError, Result};
pub use models::*;

use services::cache::{CacheLayer, RedisCacheStore};
use services::events::{EventConsumer, EventProducer};
use services::recommendation::RecommendationService;
use services::stores::PostgresBackend;
use services::training::{ModelState, TrainingService};
use std::sync::Arc;

/// Shared handles for every entry point (server, trainer, worker).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: CacheLayer,
    pub model: Arc<ModelState>,
    pub event_producer: Arc<EventProducer>,
    pub event_consumer: Arc<EventConsumer>,
    pub recommendation_service: Arc<RecommendationService>,
    pub training_service: Arc<TrainingService>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let backend = Arc::new(PostgresBackend::connect(&config.postgres).await?);

        let redis_client = Arc::new(redis::Client::open(config.redis.url.as_str())?);
        let cache = CacheLayer::new(
            Arc::new(RedisCacheStore::new(redis_client)),
            config.cache.clone(),
        );

        let model = Arc::new(ModelState::new());

        let event_producer = Arc::new(EventProducer::new(&config)?);
        let event_consumer = Arc::new(EventConsumer::new(&config)?);

        let recommendation_service = Arc::new(RecommendationService::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            cache.clone(),
            model.clone(),
            Some(event_producer.clone()),
            config.clone(),
        ));

        let training_service = Arc::new(TrainingService::new(
            backend.clone(),
            backend,
            cache.clone(),
            model.clone(),
            config.clone(),
        ));

        Ok(Self {
            config,
            cache,
            model,
            event_producer,
            event_consumer,
            recommendation_service,
            training_service,
        })
    }
}

pub async fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
