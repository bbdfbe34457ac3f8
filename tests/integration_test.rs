use shoprec::*;
use shoprec::algorithms::{
    combine, CollaborativeModel, ContentModel, HybridWeights, InteractionAggregator,
    CONSENSUS_BOOST,
};
use shoprec::services::cache::{CacheLayer, CacheStore, MemoryCacheStore};
use shoprec::services::recommendation::RecommendationService;
use shoprec::services::stores::MemoryBackend;
use shoprec::services::training::{ModelState, TrainingService};
use shoprec::utils::cosine_similarity;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn test_config() -> Config {
    let mut config = Config::default();
    config.training.min_user_interactions = 1;
    config.training.min_product_interactions = 1;
    config.training.min_total_interactions = 1;
    config.training.recency_decay = false;
    config.recommendation.factors = 8;
    config.recommendation.epochs = 10;
    config
}

struct TestApp {
    backend: Arc<MemoryBackend>,
    model: Arc<ModelState>,
    service: RecommendationService,
    trainer: TrainingService,
}

fn build_app(config: Config) -> TestApp {
    let config = Arc::new(config);
    let backend = Arc::new(MemoryBackend::new());
    let cache = CacheLayer::new(Arc::new(MemoryCacheStore::new()), config.cache.clone());
    let model = Arc::new(ModelState::new());
    let service = RecommendationService::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        cache.clone(),
        model.clone(),
        None,
        config.clone(),
    );
    let trainer = TrainingService::new(
        backend.clone(),
        backend.clone(),
        cache,
        model.clone(),
        config,
    );
    TestApp {
        backend,
        model,
        service,
        trainer,
    }
}

fn product_1() -> Uuid {
    Uuid::from_u128(0xB1)
}

fn product_2() -> Uuid {
    Uuid::from_u128(0xB2)
}

fn product_3() -> Uuid {
    Uuid::from_u128(0xB3)
}

/// Two audio products sharing most of their vocabulary plus one unrelated
/// kitchen product.
fn demo_catalog() -> Vec<Product> {
    vec![
        Product::new(product_1(), "wireless bluetooth headphones")
            .with_description("over ear headphones with active noise cancelling")
            .with_category("audio")
            .with_brand("soundcore")
            .with_price(199.0)
            .with_rating(4.8, 1200),
        Product::new(product_2(), "wireless bluetooth earbuds")
            .with_description("in ear earbuds with noise cancelling microphone")
            .with_category("audio")
            .with_brand("soundcore")
            .with_price(129.0)
            .with_rating(4.5, 800),
        Product::new(product_3(), "cast iron skillet")
            .with_description("pre seasoned cast iron pan for stovetop and oven")
            .with_category("kitchen")
            .with_brand("lodge")
            .with_price(39.0)
            .with_rating(4.9, 5000),
    ]
}

fn demo_interactions(u1: Uuid, u2: Uuid) -> Vec<Interaction> {
    vec![
        Interaction::new(u1, product_1(), InteractionType::Purchase),
        Interaction::new(u1, product_2(), InteractionType::View),
        Interaction::new(u2, product_2(), InteractionType::Purchase),
        Interaction::new(u2, product_3(), InteractionType::Purchase),
    ]
}

#[tokio::test]
async fn test_aggregator_builds_weighted_matrix() {
    let config = test_config();
    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    let interactions = demo_interactions(u1, u2);

    let aggregator = InteractionAggregator::new(&config.training);
    let matrix = aggregator.aggregate(&interactions, Utc::now()).unwrap();

    assert_eq!(matrix.shape(), (2, 3));
    assert_eq!(matrix.interaction_count(), 4);
    assert_eq!(matrix.observed_cells(), 4);

    // Purchase weighs 5.0, view 1.0.
    assert_eq!(matrix.weight(u1, product_1()), Some(5.0));
    assert_eq!(matrix.weight(u1, product_2()), Some(1.0));
    assert_eq!(matrix.weight(u2, product_2()), Some(5.0));
    assert_eq!(matrix.weight(u1, product_3()), None);

    // Repeated events on the same cell accumulate.
    let mut doubled = interactions.clone();
    doubled.push(Interaction::new(u1, product_1(), InteractionType::View));
    let matrix = aggregator.aggregate(&doubled, Utc::now()).unwrap();
    assert_eq!(matrix.weight(u1, product_1()), Some(6.0));
}

#[tokio::test]
async fn test_aggregator_is_input_order_independent() {
    let config = test_config();
    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    let interactions = demo_interactions(u1, u2);
    let mut reversed = interactions.clone();
    reversed.reverse();

    let aggregator = InteractionAggregator::new(&config.training);
    let now = Utc::now();
    let a = aggregator.aggregate(&interactions, now).unwrap();
    let b = aggregator.aggregate(&reversed, now).unwrap();

    assert_eq!(a.users(), b.users());
    assert_eq!(a.products(), b.products());
    for &user in a.users() {
        for &product in a.products() {
            assert_eq!(a.weight(user, product), b.weight(user, product));
        }
    }
}

#[tokio::test]
async fn test_aggregator_filters_sparse_users_and_rejects_thin_data() {
    let mut config = test_config();
    config.training.min_user_interactions = 2;

    let u1 = Uuid::from_u128(0xA1);
    let u3 = Uuid::from_u128(0xA3);
    let interactions = vec![
        Interaction::new(u1, product_1(), InteractionType::View),
        Interaction::new(u1, product_2(), InteractionType::View),
        Interaction::new(u3, product_1(), InteractionType::View),
    ];

    let aggregator = InteractionAggregator::new(&config.training);
    let matrix = aggregator.aggregate(&interactions, Utc::now()).unwrap();
    assert_eq!(matrix.users(), &[u1]);
    assert!(matrix.user_index(u3).is_none());

    // Below the survival floor the whole run aborts.
    let mut config = test_config();
    config.training.min_total_interactions = 3;
    let aggregator = InteractionAggregator::new(&config.training);
    let too_few = vec![
        Interaction::new(u1, product_1(), InteractionType::View),
        Interaction::new(u1, product_2(), InteractionType::View),
    ];
    let err = aggregator.aggregate(&too_few, Utc::now()).unwrap_err();
    assert!(matches!(
        err,
        RecError::InsufficientData {
            rows: 2,
            required: 3
        }
    ));
}

#[tokio::test]
async fn test_collaborative_model_recommends_unseen_products() {
    let config = test_config();
    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    let interactions = demo_interactions(u1, u2);

    let aggregator = InteractionAggregator::new(&config.training);
    let matrix = aggregator.aggregate(&interactions, Utc::now()).unwrap();
    let model = CollaborativeModel::train(&matrix, 8, 10, 0.1).unwrap();

    // Rank is clamped to min(shape) - 1 on a 2x3 matrix.
    assert_eq!(model.rank(), 1);
    assert_eq!(model.user_count(), 2);
    assert_eq!(model.product_count(), 3);
    assert!(model.knows_user(u1));
    assert_eq!(model.user_factor(u1).unwrap().len(), 1);
    assert!(model.score(u1, product_1()).unwrap().is_finite());

    // u1 already touched products 1 and 2, so only product 3 is eligible.
    let entries = model.recommend(u1, 5).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].product_id, product_3());
    assert_eq!(entries[0].methods, vec![Method::Collaborative]);
    // A single candidate normalizes to the degenerate midpoint.
    assert!((entries[0].score - 0.5).abs() < 1e-6);

    let unknown = Uuid::new_v4();
    let err = model.recommend(unknown, 5).unwrap_err();
    assert!(err.is_cold_start());
}

#[tokio::test]
async fn test_content_similarity_matrix_properties() {
    let catalog = demo_catalog();
    let model = ContentModel::train(&catalog, 100, 10);

    assert_eq!(model.len(), 3);
    let matrix = model.similarity_matrix();
    let n = model.len();
    for i in 0..n {
        assert!((matrix[[i, i]] - 1.0).abs() < 1e-6);
        for j in 0..n {
            assert!((matrix[[i, j]] - matrix[[j, i]]).abs() < 1e-6);
        }
    }

    // The two audio products share vocabulary, category, and brand; the
    // skillet shares none of it.
    let idx_of = |id: Uuid| {
        model
            .product_ids()
            .iter()
            .position(|&p| p == id)
            .unwrap()
    };
    let a = idx_of(product_1());
    let b = idx_of(product_2());
    let c = idx_of(product_3());
    assert!(matrix[[a, b]] > matrix[[a, c]]);

    assert_eq!(model.category_of(product_1()), Some("audio"));
    assert_eq!(model.category_of(product_3()), Some("kitchen"));
}

#[tokio::test]
async fn test_content_similar_excludes_self_and_honors_threshold() {
    let catalog = demo_catalog();
    let model = ContentModel::train(&catalog, 100, 10);

    let entries = model.similar(product_1(), 10, 0.0);
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.product_id != product_1()));
    assert_eq!(entries[0].product_id, product_2());
    assert!(entries.windows(2).all(|w| w[0].score >= w[1].score));

    // Nothing clears an impossible threshold.
    assert!(model.similar(product_1(), 10, 2.0).is_empty());

    // Unknown products yield an empty list, not an error.
    assert!(model.similar(Uuid::new_v4(), 10, 0.0).is_empty());
}

#[tokio::test]
async fn test_preference_profile_weighs_purchases_double() {
    let catalog = demo_catalog();
    let model = ContentModel::train(&catalog, 100, 10);
    let dim = model.vocabulary_size();

    let mut profile = PreferenceProfile::new(Uuid::new_v4());
    profile.purchased = vec![product_1()];
    profile.viewed = vec![product_3()];

    let query = model.profile_for_user(&profile).unwrap();
    let headphones = model.feature_of(product_1()).unwrap().to_dense(dim);
    let skillet = model.feature_of(product_3()).unwrap().to_dense(dim);
    assert!(cosine_similarity(&query, &headphones) > cosine_similarity(&query, &skillet));

    // With no history the preferred categories stand in.
    let mut fallback = PreferenceProfile::new(Uuid::new_v4());
    fallback.preferred_categories = vec!["kitchen".to_string()];
    let query = model.profile_for_user(&fallback).unwrap();
    assert!(cosine_similarity(&query, &skillet) > 0.99);

    // A fully empty profile has no usable signal at all.
    let empty = PreferenceProfile::new(Uuid::new_v4());
    assert!(model.profile_for_user(&empty).is_none());
    assert!(model.recommend(&empty, 5, 0.0).is_none());
}

#[tokio::test]
async fn test_content_recommend_excludes_interacted_products() {
    let catalog = demo_catalog();
    let model = ContentModel::train(&catalog, 100, 10);

    let mut profile = PreferenceProfile::new(Uuid::new_v4());
    profile.purchased = vec![product_1()];

    let entries = model.recommend(&profile, 10, 0.0).unwrap();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.product_id != product_1()));
    assert!(entries.iter().all(|e| e.methods == vec![Method::Content]));
    // The other audio product beats the skillet for an audio buyer.
    assert_eq!(entries[0].product_id, product_2());
}

#[tokio::test]
async fn test_hybrid_combine_is_pure_and_boosts_consensus() {
    let pa = Uuid::from_u128(1);
    let pb = Uuid::from_u128(2);
    let pc = Uuid::from_u128(3);
    let collaborative = vec![
        RecommendationEntry::new(pa, 0.8, Method::Collaborative),
        RecommendationEntry::new(pb, 0.6, Method::Collaborative),
    ];
    let content = vec![
        RecommendationEntry::new(pa, 0.7, Method::Content),
        RecommendationEntry::new(pc, 0.9, Method::Content),
    ];
    let weights = HybridWeights {
        collaborative: 0.6,
        content: 0.4,
    };

    let out = combine(&collaborative, &content, &weights, 10);
    assert_eq!(out, combine(&collaborative, &content, &weights, 10));

    // pa appears in both engines: weighted mean 0.76, then the boost.
    assert_eq!(out[0].product_id, pa);
    assert!((out[0].score - 0.76 * CONSENSUS_BOOST).abs() < 1e-5);
    assert_eq!(out[0].methods.len(), 2);
    assert!((out[0].confidence - out[0].score.clamp(0.0, 1.0)).abs() < 1e-6);

    // Single-engine products keep their own score.
    assert_eq!(out[1].product_id, pc);
    assert!((out[1].score - 0.9).abs() < 1e-5);
    assert_eq!(out[2].product_id, pb);
    assert!((out[2].score - 0.6).abs() < 1e-5);

    // The boosted consensus entry outranks the single best engine score.
    assert!(out[0].score > 0.9);

    let truncated = combine(&collaborative, &content, &weights, 1);
    assert_eq!(truncated.len(), 1);
}

#[tokio::test]
async fn test_hybrid_combine_breaks_ties_by_product_id() {
    let first = Uuid::from_u128(10);
    let second = Uuid::from_u128(20);
    let collaborative = vec![
        RecommendationEntry::new(second, 0.5, Method::Collaborative),
        RecommendationEntry::new(first, 0.5, Method::Collaborative),
    ];
    let weights = HybridWeights::default();

    let out = combine(&collaborative, &[], &weights, 10);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].product_id, first);
    assert_eq!(out[1].product_id, second);
}

#[tokio::test]
async fn test_training_service_installs_versioned_snapshots() {
    let app = build_app(test_config());
    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    app.backend.add_products(demo_catalog()).await;
    app.backend
        .add_interactions(demo_interactions(u1, u2))
        .await;

    assert!(app.model.current().is_none());

    let report = app.trainer.train_if_needed(true).await.unwrap().unwrap();
    assert_eq!(report.version, 1);
    assert_eq!(report.user_count, 2);
    assert_eq!(report.product_count, 3);
    assert_eq!(report.interaction_count, 4);

    let snapshot = app.model.current().unwrap();
    assert_eq!(snapshot.version, 1);

    // A fresh model with no pending interactions does not retrain.
    assert!(app.trainer.train_if_needed(false).await.unwrap().is_none());

    // Forcing always runs and bumps the version.
    let report = app.trainer.train_if_needed(true).await.unwrap().unwrap();
    assert_eq!(report.version, 2);

    let status = app.trainer.model_status();
    assert!(status.is_trained);
    assert_eq!(status.version, 2);
    assert_eq!(status.user_count, 2);
    assert_eq!(status.product_count, 3);
    assert_eq!(status.factorization_rank, 1);
    assert!(!status.training_in_progress);
}

#[tokio::test]
async fn test_recommendations_cache_roundtrip_and_purchase_exclusion() {
    let app = build_app(test_config());
    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    app.backend.add_products(demo_catalog()).await;
    app.backend
        .add_interactions(demo_interactions(u1, u2))
        .await;
    app.trainer.train_if_needed(true).await.unwrap();

    let first = app
        .service
        .get_user_recommendations(u1, Some(2), true)
        .await
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.recommendations.len(), 2);
    assert_eq!(first.algorithm_used, Algorithm::Hybrid);
    // u1 bought product 1; it must never come back.
    assert!(first
        .recommendations
        .iter()
        .all(|e| e.product_id != product_1()));
    // The model-backed entry leads, the popularity padding follows.
    assert_eq!(first.recommendations[0].product_id, product_3());

    let second = app
        .service
        .get_user_recommendations(u1, Some(2), true)
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.recommendations, first.recommendations);
}

#[tokio::test]
async fn test_untrained_model_falls_back_to_popularity() {
    let app = build_app(test_config());
    app.backend.add_products(demo_catalog()).await;

    let user_id = Uuid::new_v4();
    let response = app
        .service
        .get_user_recommendations(user_id, Some(2), false)
        .await
        .unwrap();

    assert_eq!(response.algorithm_used, Algorithm::Popularity);
    assert_eq!(response.recommendations.len(), 2);
    assert!(response
        .recommendations
        .iter()
        .all(|e| (e.confidence - 0.3).abs() < 1e-6));
    assert!((response.confidence_score - 0.3).abs() < 1e-6);
    // Highest popularity first: the well-reviewed skillet.
    assert_eq!(response.recommendations[0].product_id, product_3());

    // Fallback responses are not cached, so the next request recomputes
    // and a recovered model would take over immediately.
    let again = app
        .service
        .get_user_recommendations(user_id, Some(2), false)
        .await
        .unwrap();
    assert!(!again.cache_hit);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let app = build_app(test_config());
    let user_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();

    let err = app
        .service
        .get_user_recommendations(user_id, Some(0), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RecError::InvalidRequest(_)));

    let err = app
        .service
        .get_user_recommendations(user_id, Some(51), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RecError::InvalidRequest(_)));

    let err = app
        .service
        .get_user_recommendations(Uuid::nil(), Some(5), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RecError::InvalidRequest(_)));

    for bad_rating in [0u8, 6u8] {
        let err = app
            .service
            .track_behavior(
                user_id,
                product_id,
                InteractionType::Review,
                Some(bad_rating),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecError::InvalidRequest(_)));
    }

    let err = app
        .service
        .get_similar_products(Uuid::nil(), Some(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RecError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_track_behavior_records_and_counts_toward_retrain() {
    let app = build_app(test_config());
    let user_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();

    app.service
        .track_behavior(user_id, product_id, InteractionType::Purchase, Some(5))
        .await
        .unwrap();

    assert_eq!(app.backend.interaction_count().await, 1);
    assert_eq!(app.model.pending(), 1);
}

#[tokio::test]
async fn test_order_completed_event_invalidates_user_cache() {
    let app = build_app(test_config());
    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    app.backend.add_products(demo_catalog()).await;
    app.backend
        .add_interactions(demo_interactions(u1, u2))
        .await;
    app.trainer.train_if_needed(true).await.unwrap();

    app.service
        .get_user_recommendations(u1, Some(2), true)
        .await
        .unwrap();
    let cached = app
        .service
        .get_user_recommendations(u1, Some(2), true)
        .await
        .unwrap();
    assert!(cached.cache_hit);

    app.service
        .handle_event(&DomainEvent::OrderCompleted {
            user_id: u1,
            product_ids: vec![product_3()],
        })
        .await;
    assert_eq!(app.model.pending(), 1);

    let recomputed = app
        .service
        .get_user_recommendations(u1, Some(2), true)
        .await
        .unwrap();
    assert!(!recomputed.cache_hit);
}

#[tokio::test]
async fn test_product_update_event_requests_recompute_for_content_edits() {
    let app = build_app(test_config());
    let product_id = Uuid::new_v4();

    app.service
        .handle_event(&DomainEvent::ProductUpdated {
            product_id,
            changed_fields: vec!["title".to_string()],
        })
        .await;
    assert!(!app.model.recompute_requested());

    app.service
        .handle_event(&DomainEvent::ProductUpdated {
            product_id,
            changed_fields: vec!["description".to_string()],
        })
        .await;
    assert!(app.model.recompute_requested());
}

#[tokio::test]
async fn test_similar_products_service_flow() {
    let app = build_app(test_config());
    app.backend.add_products(demo_catalog()).await;

    // Untrained model answers with an empty list, never an error.
    let entries = app
        .service
        .get_similar_products(product_1(), Some(5))
        .await
        .unwrap();
    assert!(entries.is_empty());

    let u1 = Uuid::from_u128(0xA1);
    let u2 = Uuid::from_u128(0xA2);
    app.backend
        .add_interactions(demo_interactions(u1, u2))
        .await;
    app.trainer.train_if_needed(true).await.unwrap();

    let entries = app
        .service
        .get_similar_products(product_1(), Some(5))
        .await
        .unwrap();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.product_id != product_1()));
    assert_eq!(entries[0].product_id, product_2());

    let unknown = app
        .service
        .get_similar_products(Uuid::new_v4(), Some(5))
        .await
        .unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn test_trending_is_windowed_and_weighted() {
    let app = build_app(test_config());
    app.backend.add_products(demo_catalog()).await;

    let now = Utc::now();
    let user = Uuid::new_v4();
    let mut interactions = Vec::new();
    for _ in 0..3 {
        interactions.push(
            Interaction::new(user, product_1(), InteractionType::View)
                .with_timestamp(now - Duration::hours(1)),
        );
    }
    interactions.push(
        Interaction::new(user, product_2(), InteractionType::Purchase)
            .with_timestamp(now - Duration::hours(2)),
    );
    for _ in 0..10 {
        interactions.push(
            Interaction::new(user, product_3(), InteractionType::View)
                .with_timestamp(now - Duration::days(40)),
        );
    }
    app.backend.add_interactions(interactions).await;

    let ranked = app
        .service
        .get_trending(None, TrendingPeriod::Week, Some(10))
        .await
        .unwrap();

    // One purchase (5.0) outranks three views (3.0); the 40-day-old burst
    // is outside the window entirely.
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].product_id, product_2());
    assert_eq!(ranked[1].product_id, product_1());
    assert!(ranked.iter().all(|r| r.product_id != product_3()));

    assert!(TrendingPeriod::parse("fortnight").is_none());
    assert_eq!(TrendingPeriod::parse("day"), Some(TrendingPeriod::Day));
}

#[tokio::test]
async fn test_popular_ranking_follows_rating_and_review_volume() {
    let app = build_app(test_config());
    app.backend.add_products(demo_catalog()).await;

    let ranked = app.service.get_popular(None, Some(10)).await.unwrap();
    assert_eq!(ranked.len(), 3);
    // rating * 0.7 + ln(1 + reviews) * 0.3
    assert_eq!(ranked[0].product_id, product_3());
    assert_eq!(ranked[1].product_id, product_1());
    assert_eq!(ranked[2].product_id, product_2());
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));

    let kitchen = app
        .service
        .get_popular(Some("kitchen"), Some(10))
        .await
        .unwrap();
    assert_eq!(kitchen.len(), 1);
    assert_eq!(kitchen[0].product_id, product_3());
}

#[tokio::test(start_paused = true)]
async fn test_cache_entries_expire_after_ttl() {
    let store = MemoryCacheStore::new();
    store
        .set("user_rec:abc:hybrid", b"payload".to_vec(), 3600)
        .await
        .unwrap();

    tokio::time::advance(std::time::Duration::from_secs(3599)).await;
    assert_eq!(
        store.get("user_rec:abc:hybrid").await.unwrap(),
        Some(b"payload".to_vec())
    );

    tokio::time::advance(std::time::Duration::from_secs(2)).await;
    assert_eq!(store.get("user_rec:abc:hybrid").await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_delete_by_pattern_counts_removed_keys() {
    let store = MemoryCacheStore::new();
    let user = Uuid::from_u128(7);
    let other = Uuid::from_u128(8);
    store
        .set(&format!("user_rec:{}:hybrid", user), vec![1], 60)
        .await
        .unwrap();
    store
        .set(&format!("user_rec:{}:collaborative", user), vec![2], 60)
        .await
        .unwrap();
    store
        .set(&format!("user_rec:{}:hybrid", other), vec![3], 60)
        .await
        .unwrap();
    store.set("product_sim:x", vec![4], 60).await.unwrap();

    let removed = store
        .delete_by_pattern(&format!("user_rec:{}:*", user))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.len(), 2);
    assert!(store
        .get(&format!("user_rec:{}:hybrid", other))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_training_gate_admits_one_run_at_a_time() {
    let state = ModelState::new();

    assert!(state.begin_training());
    assert!(!state.begin_training());
    assert!(state.is_training());
    state.finish_training();
    assert!(!state.is_training());
    assert!(state.begin_training());
    state.finish_training();

    assert_eq!(state.note_interaction(), 1);
    assert_eq!(state.note_interaction(), 2);
    assert_eq!(state.pending(), 2);
    state.reset_pending();
    assert_eq!(state.pending(), 0);

    assert!(!state.recompute_requested());
    state.request_recompute();
    assert!(state.recompute_requested());
    state.clear_recompute();
    assert!(!state.recompute_requested());
}

#[tokio::test]
async fn test_domain_event_wire_format() {
    let user_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();

    let raw = serde_json::json!({
        "event_type": "order.completed",
        "data": { "user_id": user_id, "product_ids": [product_id] }
    });
    let event: DomainEvent = serde_json::from_value(raw).unwrap();
    match &event {
        DomainEvent::OrderCompleted {
            user_id: u,
            product_ids,
        } => {
            assert_eq!(*u, user_id);
            assert_eq!(product_ids, &vec![product_id]);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(event.partition_key(), user_id.to_string());

    // changed_fields is optional on the wire.
    let raw = serde_json::json!({
        "event_type": "product.updated",
        "data": { "product_id": product_id }
    });
    let event: DomainEvent = serde_json::from_value(raw).unwrap();
    match event {
        DomainEvent::ProductUpdated { changed_fields, .. } => {
            assert!(changed_fields.is_empty());
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let event = DomainEvent::InteractionTracked {
        user_id,
        product_id,
        interaction_type: InteractionType::AddToCart,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("interaction.tracked"));
    assert!(json.contains("add_to_cart"));
    let back: DomainEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back.partition_key(), user_id.to_string());

    assert!(is_content_edit(&["price".to_string()]));
    assert!(!is_content_edit(&["title".to_string()]));
}
