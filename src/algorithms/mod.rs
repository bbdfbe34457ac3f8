pub mod aggregator;
pub mod collaborative;
pub mod content;
pub mod hybrid;
pub mod popularity;

pub use aggregator::{InteractionAggregator, UserItemMatrix};
pub use collaborative::CollaborativeModel;
pub use content::{ContentModel, ProductFeatureVector};
pub use hybrid::{combine, HybridWeights, CONSENSUS_BOOST};
pub use popularity::{popularity_entries, popularity_ranking, trending_ranking};

use chrono::{DateTime, Utc};

/// Everything one training run produces, bundled immutably. Readers share
/// the active snapshot through an `Arc` and can never observe a
/// half-trained model; a finished run replaces the whole snapshot at once.
#[derive(Debug)]
pub struct ModelSnapshot {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub training_row_count: usize,
    pub collaborative: CollaborativeModel,
    pub content: ContentModel,
}
