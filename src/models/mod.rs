use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single recorded user-product event. Immutable once recorded; newer
/// interactions supersede, they never mutate older ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub interaction_type: InteractionType,
    pub rating: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Click,
    AddToCart,
    Wishlist,
    Review,
    Purchase,
}

impl InteractionType {
    /// Fixed preference weight used when aggregating the user-item matrix.
    pub fn weight(&self) -> f32 {
        match self {
            InteractionType::Purchase => 5.0,
            InteractionType::Review => 3.0,
            InteractionType::AddToCart => 2.0,
            InteractionType::Wishlist => 1.5,
            InteractionType::Click => 1.5,
            InteractionType::View => 1.0,
        }
    }

    /// Engagement weight used for trending scores; unlisted types count as
    /// a plain view.
    pub fn trending_weight(&self) -> f32 {
        match self {
            InteractionType::Purchase => 5.0,
            InteractionType::AddToCart => 3.0,
            InteractionType::Click => 2.0,
            _ => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Click => "click",
            InteractionType::AddToCart => "add_to_cart",
            InteractionType::Wishlist => "wishlist",
            InteractionType::Review => "review",
            InteractionType::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(InteractionType::View),
            "click" => Some(InteractionType::Click),
            "add_to_cart" => Some(InteractionType::AddToCart),
            "wishlist" => Some(InteractionType::Wishlist),
            "review" => Some(InteractionType::Review),
            "purchase" => Some(InteractionType::Purchase),
            _ => None,
        }
    }

    /// Types that change what we would recommend right away, warranting an
    /// immediate cache invalidation for the user.
    pub fn is_high_signal(&self) -> bool {
        matches!(
            self,
            InteractionType::Purchase | InteractionType::Review | InteractionType::AddToCart
        )
    }
}

impl Interaction {
    pub fn new(user_id: Uuid, product_id: Uuid, interaction_type: InteractionType) -> Self {
        Self {
            user_id,
            product_id,
            interaction_type,
            rating: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Catalog entry as delivered by the catalog store. Optional fields are
/// imputed by the content engine, never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub tags: Vec<String>,
    pub price: Option<f64>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub in_stock: bool,
}

impl Product {
    pub fn new(id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            category: None,
            brand: None,
            tags: Vec::new(),
            price: None,
            rating: None,
            review_count: None,
            in_stock: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_rating(mut self, rating: f32, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = Some(review_count);
        self
    }

    pub fn with_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = in_stock;
        self
    }

    /// Catalog-wide popularity: rating dominates, review volume dampened
    /// logarithmically so a thousand reviews do not drown a better product.
    pub fn popularity_score(&self) -> f32 {
        let rating = self.rating.unwrap_or(0.0);
        let reviews = self.review_count.unwrap_or(0) as f32;
        rating * 0.7 + (1.0 + reviews).ln() * 0.3
    }
}

/// Which engine produced (or co-produced) a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Collaborative,
    Content,
    Popularity,
}

/// Algorithm label reported on responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Hybrid,
    Collaborative,
    ContentBased,
    Popularity,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Hybrid => "hybrid",
            Algorithm::Collaborative => "collaborative",
            Algorithm::ContentBased => "content_based",
            Algorithm::Popularity => "popularity",
        }
    }
}

/// One ranked recommendation. Scores are pre-normalized to [0,1] by the
/// emitting engine; confidence is the score clamped to [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub product_id: Uuid,
    pub score: f32,
    pub confidence: f32,
    pub methods: Vec<Method>,
}

impl RecommendationEntry {
    pub fn new(product_id: Uuid, score: f32, method: Method) -> Self {
        Self {
            product_id,
            score,
            confidence: score.clamp(0.0, 1.0),
            methods: vec![method],
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: Uuid,
    pub recommendations: Vec<RecommendationEntry>,
    pub algorithm_used: Algorithm,
    pub confidence_score: f32,
    pub generated_at: DateTime<Utc>,
    pub cache_hit: bool,
}

/// What we know about a user's tastes, assembled from interaction history.
#[derive(Debug, Clone, Default)]
pub struct PreferenceProfile {
    pub user_id: Uuid,
    pub purchased: Vec<Uuid>,
    pub viewed: Vec<Uuid>,
    pub preferred_categories: Vec<String>,
}

impl PreferenceProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.purchased.is_empty() && self.viewed.is_empty() && self.preferred_categories.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendingPeriod {
    Day,
    Week,
    Month,
}

impl TrendingPeriod {
    pub fn window(&self) -> Duration {
        match self {
            TrendingPeriod::Day => Duration::hours(24),
            TrendingPeriod::Week => Duration::days(7),
            TrendingPeriod::Month => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingPeriod::Day => "day",
            TrendingPeriod::Week => "week",
            TrendingPeriod::Month => "month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(TrendingPeriod::Day),
            "week" => Some(TrendingPeriod::Week),
            "month" => Some(TrendingPeriod::Month),
            _ => None,
        }
    }
}

/// Catalog product plus a ranking score, used for trending and popularity
/// listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedProduct {
    pub product_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub score: f32,
}

impl RankedProduct {
    pub fn from_product(product: &Product, score: f32) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            category: product.category.clone(),
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub is_trained: bool,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub training_row_count: usize,
    pub user_count: usize,
    pub product_count: usize,
    pub factorization_rank: usize,
    pub version: u64,
    pub training_in_progress: bool,
}

/// Domain events delivered at-least-once from the surrounding platform.
/// A closed set: adding a kind is a compile-time-checked change, and every
/// handler match is exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum DomainEvent {
    #[serde(rename = "user.created")]
    UserCreated { user_id: Uuid },
    #[serde(rename = "user.updated")]
    UserUpdated { user_id: Uuid },
    #[serde(rename = "user.deleted")]
    UserDeleted { user_id: Uuid },
    #[serde(rename = "product.created")]
    ProductCreated { product_id: Uuid },
    #[serde(rename = "product.updated")]
    ProductUpdated {
        product_id: Uuid,
        #[serde(default)]
        changed_fields: Vec<String>,
    },
    #[serde(rename = "product.deleted")]
    ProductDeleted { product_id: Uuid },
    #[serde(rename = "order.completed")]
    OrderCompleted {
        user_id: Uuid,
        product_ids: Vec<Uuid>,
    },
    #[serde(rename = "review.created")]
    ReviewCreated {
        user_id: Uuid,
        product_id: Uuid,
        rating: Option<u8>,
    },
    #[serde(rename = "interaction.tracked")]
    InteractionTracked {
        user_id: Uuid,
        product_id: Uuid,
        interaction_type: InteractionType,
    },
    #[serde(rename = "inventory.updated")]
    InventoryUpdated { product_id: Uuid, stock_level: i64 },
}

impl DomainEvent {
    /// Partition key so events for one entity stay ordered on the topic.
    pub fn partition_key(&self) -> String {
        match self {
            DomainEvent::UserCreated { user_id }
            | DomainEvent::UserUpdated { user_id }
            | DomainEvent::UserDeleted { user_id }
            | DomainEvent::OrderCompleted { user_id, .. }
            | DomainEvent::ReviewCreated { user_id, .. }
            | DomainEvent::InteractionTracked { user_id, .. } => user_id.to_string(),
            DomainEvent::ProductCreated { product_id }
            | DomainEvent::ProductUpdated { product_id, .. }
            | DomainEvent::ProductDeleted { product_id }
            | DomainEvent::InventoryUpdated { product_id, .. } => product_id.to_string(),
        }
    }
}

/// Fields whose change invalidates a product's similarity neighborhood.
pub fn is_content_edit(changed_fields: &[String]) -> bool {
    changed_fields
        .iter()
        .any(|f| matches!(f.as_str(), "category" | "tags" | "description" | "price"))
}
