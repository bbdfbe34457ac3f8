use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shoprec::*;
use shoprec::algorithms::{
    combine, CollaborativeModel, ContentModel, HybridWeights, InteractionAggregator,
};
use chrono::Utc;
use uuid::Uuid;

fn synthetic_interactions(users: usize, products: usize, per_user: usize) -> Vec<Interaction> {
    let product_ids: Vec<Uuid> = (0..products).map(|i| Uuid::from_u128(i as u128 + 1)).collect();
    let mut out = Vec::with_capacity(users * per_user);
    for u in 0..users {
        let user_id = Uuid::from_u128(0x1000_0000 + u as u128);
        for k in 0..per_user {
            let product = product_ids[(u * 7 + k * 13) % products];
            let kind = match k % 4 {
                0 => InteractionType::Purchase,
                1 => InteractionType::AddToCart,
                2 => InteractionType::Click,
                _ => InteractionType::View,
            };
            out.push(Interaction::new(user_id, product, kind));
        }
    }
    out
}

fn synthetic_catalog(n: usize) -> Vec<Product> {
    let categories = ["audio", "kitchen", "outdoor", "office"];
    let brands = ["acme", "globex", "initech"];
    (0..n)
        .map(|i| {
            Product::new(
                Uuid::from_u128(i as u128 + 1),
                format!("product {} deluxe edition", i),
            )
            .with_description(format!(
                "durable {} gear with model number {} and spare parts included",
                categories[i % categories.len()],
                i
            ))
            .with_category(categories[i % categories.len()])
            .with_brand(brands[i % brands.len()])
            .with_price(9.0 + (i % 50) as f64)
            .with_rating(1.0 + (i % 5) as f32, (i * 17 % 1000) as u32)
        })
        .collect()
}

fn benchmark_aggregation(c: &mut Criterion) {
    let config = Config::default();
    let aggregator = InteractionAggregator::new(&config.training);
    let interactions = synthetic_interactions(200, 100, 10);
    let now = Utc::now();

    c.bench_function("aggregate_2000_interactions", |b| {
        b.iter(|| {
            black_box(aggregator.aggregate(black_box(&interactions), now).unwrap());
        });
    });
}

fn benchmark_collaborative_training(c: &mut Criterion) {
    let config = Config::default();
    let aggregator = InteractionAggregator::new(&config.training);
    let interactions = synthetic_interactions(200, 100, 10);
    let matrix = aggregator.aggregate(&interactions, Utc::now()).unwrap();

    c.bench_function("collaborative_train_200x100", |b| {
        b.iter(|| {
            black_box(CollaborativeModel::train(black_box(&matrix), 16, 5, 0.1).unwrap());
        });
    });

    let model = CollaborativeModel::train(&matrix, 32, 10, 0.1).unwrap();
    let user_id = Uuid::from_u128(0x1000_0000);
    c.bench_function("collaborative_recommend_top_10", |b| {
        b.iter(|| {
            black_box(model.recommend(black_box(user_id), 10).unwrap());
        });
    });
}

fn benchmark_content_model(c: &mut Criterion) {
    let catalog = synthetic_catalog(200);

    c.bench_function("content_train_200_products", |b| {
        b.iter(|| {
            black_box(ContentModel::train(black_box(&catalog), 500, 20));
        });
    });

    let model = ContentModel::train(&catalog, 500, 20);
    let product_id = Uuid::from_u128(1);
    c.bench_function("content_similar_top_10", |b| {
        b.iter(|| {
            black_box(model.similar(black_box(product_id), 10, 0.1));
        });
    });
}

fn benchmark_hybrid_combine(c: &mut Criterion) {
    let collaborative: Vec<RecommendationEntry> = (0..100)
        .map(|i| {
            RecommendationEntry::new(
                Uuid::from_u128(i as u128 + 1),
                (i % 10) as f32 / 10.0,
                Method::Collaborative,
            )
        })
        .collect();
    let content: Vec<RecommendationEntry> = (50..150)
        .map(|i| {
            RecommendationEntry::new(
                Uuid::from_u128(i as u128 + 1),
                ((i + 3) % 10) as f32 / 10.0,
                Method::Content,
            )
        })
        .collect();
    let weights = HybridWeights::default();

    c.bench_function("hybrid_combine_100_entries_each", |b| {
        b.iter(|| {
            black_box(combine(
                black_box(&collaborative),
                black_box(&content),
                &weights,
                20,
            ));
        });
    });
}

criterion_group!(
    benches,
    benchmark_aggregation,
    benchmark_collaborative_training,
    benchmark_content_model,
    benchmark_hybrid_combine
);
criterion_main!(benches);
