use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
    pub recommendation: RecommendationConfig,
    pub training: TrainingConfig,
    pub cache: CacheTtlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().unwrap()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub event_topic: String,
    pub group_id: String,
    pub auto_offset_reset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Rank of the factorization; clamped to min(matrix shape) - 1 at
    /// training time.
    pub factors: usize,
    pub epochs: usize,
    pub regularization: f32,
    /// Content similarities at or below this are treated as noise.
    pub similarity_threshold: f32,
    pub default_count: usize,
    pub max_count: usize,
    pub collaborative_weight: f32,
    pub content_weight: f32,
    pub max_terms: usize,
    pub max_brands: usize,
    pub request_timeout_secs: u64,
    pub catalog_fetch_limit: usize,
    pub history_fetch_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Users with fewer raw interactions than this are dropped from the
    /// matrix; same idea for products below.
    pub min_user_interactions: usize,
    pub min_product_interactions: usize,
    /// Training aborts (snapshot unchanged) below this many surviving
    /// interactions.
    pub min_total_interactions: usize,
    pub max_interaction_age_days: i64,
    pub recency_decay: bool,
    /// Exponential decay rate per day of interaction age.
    pub recency_decay_rate: f64,
    pub auto_retrain_threshold: u64,
    pub retrain_interval_hours: i64,
    pub fetch_limit: usize,
    pub check_interval_secs: u64,
}

/// TTLs per cache domain, seconds. One table instead of per-call-site
/// constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    pub recommendations: u64,
    pub similarities: u64,
    pub trending: u64,
    pub popular: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                pool_size: 10,
            },
            postgres: PostgresConfig {
                url: "postgresql://localhost:5432/shoprec".to_string(),
                max_connections: 10,
            },
            kafka: KafkaConfig {
                brokers: "localhost:9092".to_string(),
                event_topic: "domain_events".to_string(),
                group_id: "shoprec_workers".to_string(),
                auto_offset_reset: "earliest".to_string(),
            },
            recommendation: RecommendationConfig {
                factors: 50,
                epochs: 30,
                regularization: 0.1,
                similarity_threshold: 0.1,
                default_count: 10,
                max_count: 50,
                collaborative_weight: 0.6,
                content_weight: 0.4,
                max_terms: 1000,
                max_brands: 50,
                request_timeout_secs: 30,
                catalog_fetch_limit: 10_000,
                history_fetch_limit: 500,
            },
            training: TrainingConfig {
                min_user_interactions: 5,
                min_product_interactions: 10,
                min_total_interactions: 100,
                max_interaction_age_days: 365,
                recency_decay: true,
                recency_decay_rate: 0.01,
                auto_retrain_threshold: 1000,
                retrain_interval_hours: 24,
                fetch_limit: 100_000,
                check_interval_secs: 3600,
            },
            cache: CacheTtlConfig {
                recommendations: 3600,
                similarities: 86400,
                trending: 1800,
                popular: 7200,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SHOPREC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
