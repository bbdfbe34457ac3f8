use crate::algorithms::{
    combine, popularity_entries, popularity_ranking, trending_ranking, HybridWeights,
    ModelSnapshot,
};
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    is_content_edit, Algorithm, DomainEvent, Interaction, InteractionType, Method,
    PreferenceProfile, RankedProduct, RecommendationEntry, RecommendationResponse,
    TrendingPeriod,
};
use crate::services::cache::CacheLayer;
use crate::services::events::EventProducer;
use crate::services::stores::{CatalogStore, InteractionStore, OrderStore};
use crate::services::training::ModelState;
use crate::utils::validation::{validate_count, validate_entity_id, validate_rating};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confidence assigned to popularity entries that pad a thin engine result.
const AUGMENT_CONFIDENCE: f32 = 0.5;
/// Confidence assigned when popularity is the only tier left.
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Request-side orchestrator. Walks the fallback chain (hybrid, single
/// engines, popularity), owns the cache-aside discipline, and applies
/// domain events to the cache and the retrain counters.
pub struct RecommendationService {
    interactions: Arc<dyn InteractionStore>,
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    cache: CacheLayer,
    model: Arc<ModelState>,
    events: Option<Arc<EventProducer>>,
    config: Arc<Config>,
}

impl RecommendationService {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        catalog: Arc<dyn CatalogStore>,
        orders: Arc<dyn OrderStore>,
        cache: CacheLayer,
        model: Arc<ModelState>,
        events: Option<Arc<EventProducer>>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            interactions,
            catalog,
            orders,
            cache,
            model,
            events,
            config,
        }
    }

    /// Personalized recommendations for a user. Serves from cache when
    /// possible, otherwise computes through the fallback chain and caches
    /// the result. Only invalid requests surface as errors; every other
    /// failure degrades to the popularity tier.
    pub async fn get_user_recommendations(
        &self,
        user_id: Uuid,
        count: Option<usize>,
        exclude_purchased: bool,
    ) -> Result<RecommendationResponse> {
        let rec = &self.config.recommendation;
        let n = count.unwrap_or(rec.default_count);
        validate_count(n, rec.max_count)?;
        validate_entity_id(user_id, "user_id")?;

        // Check cache first
        let cache_key = CacheLayer::user_rec_key(user_id, Algorithm::Hybrid);
        if let Some(mut cached) = self
            .cache
            .get_json::<RecommendationResponse>(&cache_key)
            .await
        {
            cached.recommendations.truncate(n);
            cached.cache_hit = true;
            debug!(%user_id, "serving recommendations from cache");
            return Ok(cached);
        }

        let snapshot = match self.model.current() {
            Some(snapshot) => snapshot,
            None => {
                debug!(%user_id, "model not trained yet, serving popularity fallback");
                return self
                    .popularity_fallback(user_id, n, exclude_purchased)
                    .await;
            }
        };

        let budget = Duration::from_secs(rec.request_timeout_secs);
        let computed = tokio::time::timeout(
            budget,
            self.compute_recommendations(&snapshot, user_id, n, exclude_purchased),
        )
        .await;

        match computed {
            Ok(Ok(response)) => {
                self.cache
                    .put_json(&cache_key, &response, self.cache.ttl().recommendations)
                    .await;
                Ok(response)
            }
            Ok(Err(e)) if e.is_client_error() => Err(e),
            Ok(Err(e)) => {
                warn!(%user_id, "recommendation pipeline failed, serving popularity: {}", e);
                self.popularity_fallback(user_id, n, exclude_purchased)
                    .await
            }
            Err(_) => {
                warn!(%user_id, "recommendation pipeline timed out, serving popularity");
                self.popularity_fallback(user_id, n, exclude_purchased)
                    .await
            }
        }
    }

    async fn compute_recommendations(
        &self,
        snapshot: &ModelSnapshot,
        user_id: Uuid,
        n: usize,
        exclude_purchased: bool,
    ) -> Result<RecommendationResponse> {
        let rec = &self.config.recommendation;
        // Over-fetch so exclusion filtering still leaves a full page.
        let over_fetch = n * 2;

        let excluded = self.exclusion_set(user_id, exclude_purchased).await;

        let collaborative = match snapshot.collaborative.recommend(user_id, over_fetch) {
            Ok(entries) => entries,
            Err(e) if e.is_cold_start() => {
                debug!(%user_id, "no collaborative signal: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!(%user_id, "collaborative scoring failed: {}", e);
                Vec::new()
            }
        };

        let profile = self.build_profile(user_id, snapshot).await?;
        let content = snapshot
            .content
            .recommend(&profile, over_fetch, rec.similarity_threshold)
            .unwrap_or_default();

        let weights = HybridWeights {
            collaborative: rec.collaborative_weight,
            content: rec.content_weight,
        };
        let mut entries = combine(&collaborative, &content, &weights, over_fetch);

        if entries.len() >= n {
            entries.retain(|e| !excluded.contains(&e.product_id));
            entries.truncate(n);
        } else {
            entries = merge_unique(entries, collaborative, content);
            entries.retain(|e| !excluded.contains(&e.product_id));
            if entries.len() < n {
                let mut taken: HashSet<Uuid> = excluded.clone();
                taken.extend(entries.iter().map(|e| e.product_id));
                let fill = self
                    .popular_fill(n - entries.len(), &taken, AUGMENT_CONFIDENCE)
                    .await?;
                entries.extend(fill);
            }
            entries.truncate(n);
        }

        Ok(assemble_response(user_id, entries, false))
    }

    async fn exclusion_set(&self, user_id: Uuid, exclude_purchased: bool) -> HashSet<Uuid> {
        if !exclude_purchased {
            return HashSet::new();
        }
        match self.orders.fetch_purchased_product_ids(user_id).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                // Availability beats exactness here.
                warn!(%user_id, "order lookup failed, skipping purchase exclusion: {}", e);
                HashSet::new()
            }
        }
    }

    async fn build_profile(
        &self,
        user_id: Uuid,
        snapshot: &ModelSnapshot,
    ) -> Result<PreferenceProfile> {
        let history = self
            .interactions
            .fetch_user_interactions(user_id, self.config.recommendation.history_fetch_limit)
            .await?;

        let mut purchased: BTreeSet<Uuid> = BTreeSet::new();
        let mut viewed: BTreeSet<Uuid> = BTreeSet::new();
        let mut category_counts: HashMap<String, usize> = HashMap::new();

        for interaction in &history {
            match interaction.interaction_type {
                InteractionType::Purchase => {
                    purchased.insert(interaction.product_id);
                }
                _ => {
                    viewed.insert(interaction.product_id);
                }
            }
            if let Some(category) = snapshot.content.category_of(interaction.product_id) {
                *category_counts.entry(category.to_string()).or_insert(0) += 1;
            }
        }
        viewed.retain(|id| !purchased.contains(id));

        let mut ranked: Vec<(String, usize)> = category_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(3);

        let mut profile = PreferenceProfile::new(user_id);
        profile.purchased = purchased.into_iter().collect();
        profile.viewed = viewed.into_iter().collect();
        profile.preferred_categories = ranked.into_iter().map(|(c, _)| c).collect();
        Ok(profile)
    }

    async fn popular_fill(
        &self,
        fill: usize,
        exclude: &HashSet<Uuid>,
        confidence: f32,
    ) -> Result<Vec<RecommendationEntry>> {
        let ranked = self
            .popular_ranking_cached(None, self.config.recommendation.max_count)
            .await?;
        Ok(popularity_entries(&ranked, exclude, fill, confidence))
    }

    /// Terminal tier: a popularity list dressed as a recommendation
    /// response. Not written to the per-user cache, so a recovering model
    /// takes over on the next request rather than after a TTL.
    async fn popularity_fallback(
        &self,
        user_id: Uuid,
        n: usize,
        exclude_purchased: bool,
    ) -> Result<RecommendationResponse> {
        let excluded = self.exclusion_set(user_id, exclude_purchased).await;
        let entries = self.popular_fill(n, &excluded, FALLBACK_CONFIDENCE).await?;
        Ok(assemble_response(user_id, entries, false))
    }

    async fn popular_ranking_cached(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RankedProduct>> {
        let key = CacheLayer::popular_key(category, limit);
        if let Some(ranked) = self.cache.get_json::<Vec<RankedProduct>>(&key).await {
            return Ok(ranked);
        }
        let products = self
            .catalog
            .fetch_products(self.config.recommendation.catalog_fetch_limit)
            .await?;
        let ranked = popularity_ranking(&products, category, limit);
        self.cache
            .put_json(&key, &ranked, self.cache.ttl().popular)
            .await;
        Ok(ranked)
    }

    /// Products similar to the given one, from the active snapshot's
    /// similarity matrix. An untrained model yields an empty list rather
    /// than an error.
    pub async fn get_similar_products(
        &self,
        product_id: Uuid,
        count: Option<usize>,
    ) -> Result<Vec<RecommendationEntry>> {
        let rec = &self.config.recommendation;
        let n = count.unwrap_or(rec.default_count);
        validate_count(n, rec.max_count)?;
        validate_entity_id(product_id, "product_id")?;

        let key = CacheLayer::product_sim_key(product_id);
        if let Some(mut cached) = self.cache.get_json::<Vec<RecommendationEntry>>(&key).await {
            cached.truncate(n);
            return Ok(cached);
        }

        let snapshot = match self.model.current() {
            Some(snapshot) => snapshot,
            None => return Ok(Vec::new()),
        };

        // Cache the widest page we serve so narrower requests hit too.
        let mut entries = snapshot
            .content
            .similar(product_id, rec.max_count, rec.similarity_threshold);
        self.cache
            .put_json(&key, &entries, self.cache.ttl().similarities)
            .await;
        entries.truncate(n);
        Ok(entries)
    }

    /// Records one user interaction, publishes it as a domain event, and
    /// applies the cache/counter effects locally so a single node works
    /// without the event backbone.
    pub async fn track_behavior(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        interaction_type: InteractionType,
        rating: Option<u8>,
    ) -> Result<()> {
        validate_entity_id(user_id, "user_id")?;
        validate_entity_id(product_id, "product_id")?;
        validate_rating(rating)?;

        let mut interaction = Interaction::new(user_id, product_id, interaction_type);
        if let Some(r) = rating {
            interaction = interaction.with_rating(r);
        }
        self.interactions.record_interaction(&interaction).await?;

        let event = DomainEvent::InteractionTracked {
            user_id,
            product_id,
            interaction_type,
        };
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(&event).await {
                warn!(%user_id, "event publish failed, applying local effects only: {}", e);
            }
        }
        self.handle_event(&event).await;
        Ok(())
    }

    /// Applies one domain event to the cache and retrain counters. Events
    /// arrive at-least-once, so every arm is idempotent.
    pub async fn handle_event(&self, event: &DomainEvent) {
        match event {
            DomainEvent::UserCreated { .. } => {}
            DomainEvent::UserUpdated { user_id } => {
                self.cache.invalidate_user(*user_id).await;
            }
            DomainEvent::UserDeleted { user_id } => {
                self.cache.invalidate_user(*user_id).await;
            }
            DomainEvent::ProductCreated { product_id } => {
                debug!(%product_id, "new product enters the model at the next training run");
            }
            DomainEvent::ProductUpdated {
                product_id,
                changed_fields,
            } => {
                if is_content_edit(changed_fields) {
                    self.cache.invalidate_product_similarity(*product_id).await;
                    self.model.request_recompute();
                }
            }
            DomainEvent::ProductDeleted { product_id } => {
                self.cache.invalidate_product_similarity(*product_id).await;
            }
            DomainEvent::OrderCompleted {
                user_id,
                product_ids,
            } => {
                self.cache.invalidate_user(*user_id).await;
                join_all(
                    product_ids
                        .iter()
                        .map(|id| self.cache.invalidate_product_similarity(*id)),
                )
                .await;
                for _ in product_ids {
                    self.model.note_interaction();
                }
            }
            DomainEvent::ReviewCreated {
                user_id,
                product_id,
                ..
            } => {
                self.cache.invalidate_user(*user_id).await;
                self.cache.invalidate_product_similarity(*product_id).await;
                self.model.note_interaction();
            }
            DomainEvent::InteractionTracked {
                user_id,
                interaction_type,
                ..
            } => {
                let pending = self.model.note_interaction();
                if interaction_type.is_high_signal() {
                    self.cache.invalidate_user(*user_id).await;
                }
                if pending == self.config.training.auto_retrain_threshold {
                    info!(pending, "auto-retrain threshold reached");
                }
            }
            DomainEvent::InventoryUpdated {
                product_id,
                stock_level,
            } => {
                if *stock_level <= 0 {
                    self.cache.invalidate_product_similarity(*product_id).await;
                }
            }
        }
    }

    /// Most-interacted products inside a recent window.
    pub async fn get_trending(
        &self,
        category: Option<&str>,
        period: TrendingPeriod,
        limit: Option<usize>,
    ) -> Result<Vec<RankedProduct>> {
        let rec = &self.config.recommendation;
        let limit = limit.unwrap_or(rec.default_count);
        validate_count(limit, rec.max_count)?;

        let key = CacheLayer::trending_key(category, period, limit);
        if let Some(ranked) = self.cache.get_json::<Vec<RankedProduct>>(&key).await {
            return Ok(ranked);
        }

        let now = Utc::now();
        let interactions = self
            .interactions
            .fetch_interactions(Some(now - period.window()), self.config.training.fetch_limit)
            .await?;
        let products = self.catalog.fetch_products(rec.catalog_fetch_limit).await?;
        let ranked = trending_ranking(&interactions, &products, period, category, limit, now);
        self.cache
            .put_json(&key, &ranked, self.cache.ttl().trending)
            .await;
        Ok(ranked)
    }

    /// Highest-rated, most-reviewed products, optionally per category.
    pub async fn get_popular(
        &self,
        category: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<RankedProduct>> {
        let rec = &self.config.recommendation;
        let limit = limit.unwrap_or(rec.default_count);
        validate_count(limit, rec.max_count)?;
        self.popular_ranking_cached(category, limit).await
    }

    pub async fn health_check(&self) -> HashMap<String, serde_json::Value> {
        let mut health = HashMap::new();
        let cache_up = self.cache.health_probe().await;
        health.insert(
            "cache".to_string(),
            serde_json::json!(if cache_up { "up" } else { "down" }),
        );
        match self.model.current() {
            Some(snapshot) => {
                health.insert("model".to_string(), serde_json::json!("trained"));
                health.insert(
                    "model_version".to_string(),
                    serde_json::json!(snapshot.version),
                );
            }
            None => {
                health.insert("model".to_string(), serde_json::json!("untrained"));
            }
        }
        health
    }
}

/// Appends single-engine entries the combining pass dropped, keeping the
/// first occurrence of each product.
fn merge_unique(
    mut base: Vec<RecommendationEntry>,
    collaborative: Vec<RecommendationEntry>,
    content: Vec<RecommendationEntry>,
) -> Vec<RecommendationEntry> {
    let mut present: HashSet<Uuid> = base.iter().map(|e| e.product_id).collect();
    for entry in collaborative.into_iter().chain(content) {
        if present.insert(entry.product_id) {
            base.push(entry);
        }
    }
    base
}

fn assemble_response(
    user_id: Uuid,
    recommendations: Vec<RecommendationEntry>,
    cache_hit: bool,
) -> RecommendationResponse {
    let algorithm_used = algorithm_for(&recommendations);
    let confidence_score = if recommendations.is_empty() {
        0.0
    } else {
        recommendations.iter().map(|e| e.confidence).sum::<f32>() / recommendations.len() as f32
    };
    RecommendationResponse {
        user_id,
        recommendations,
        algorithm_used,
        confidence_score,
        generated_at: Utc::now(),
        cache_hit,
    }
}

/// Response label derived from which engines actually contributed entries.
fn algorithm_for(entries: &[RecommendationEntry]) -> Algorithm {
    let mut collaborative = false;
    let mut content = false;
    for entry in entries {
        for method in &entry.methods {
            match method {
                Method::Collaborative => collaborative = true,
                Method::Content => content = true,
                Method::Popularity => {}
            }
        }
    }
    match (collaborative, content) {
        (true, true) => Algorithm::Hybrid,
        (true, false) => Algorithm::Collaborative,
        (false, true) => Algorithm::ContentBased,
        (false, false) => Algorithm::Popularity,
    }
}
