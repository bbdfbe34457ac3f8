use crate::models::{
    Interaction, Method, Product, RankedProduct, RecommendationEntry, TrendingPeriod,
};
use crate::utils::min_max_normalize;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

fn sort_ranked(ranked: &mut [RankedProduct]) {
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

/// Catalog-wide popularity ranking from rating and review volume. Needs no
/// trained model, so it always has an answer.
pub fn popularity_ranking(
    catalog: &[Product],
    category: Option<&str>,
    limit: usize,
) -> Vec<RankedProduct> {
    let mut ranked: Vec<RankedProduct> = catalog
        .iter()
        .filter(|p| category.map_or(true, |c| p.category.as_deref() == Some(c)))
        .map(|p| RankedProduct::from_product(p, p.popularity_score()))
        .collect();
    sort_ranked(&mut ranked);
    ranked.truncate(limit);
    ranked
}

/// Interaction-velocity ranking over a recent window. Products with no
/// interactions inside the window do not appear at all.
pub fn trending_ranking(
    interactions: &[Interaction],
    catalog: &[Product],
    period: TrendingPeriod,
    category: Option<&str>,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<RankedProduct> {
    let cutoff = now - period.window();
    let mut scores: HashMap<Uuid, f32> = HashMap::new();
    for i in interactions {
        if i.timestamp >= cutoff && i.timestamp <= now {
            *scores.entry(i.product_id).or_insert(0.0) += i.interaction_type.trending_weight();
        }
    }

    let mut ranked: Vec<RankedProduct> = catalog
        .iter()
        .filter(|p| category.map_or(true, |c| p.category.as_deref() == Some(c)))
        .filter_map(|p| scores.get(&p.id).map(|&s| RankedProduct::from_product(p, s)))
        .collect();
    sort_ranked(&mut ranked);
    ranked.truncate(limit);
    ranked
}

/// Turns a popularity ranking into recommendation entries for padding or
/// fallback. Scores are min-max normalized to keep rank order; `confidence`
/// is the caller's fixed tier value, not derived from the score.
pub fn popularity_entries(
    ranked: &[RankedProduct],
    exclude: &HashSet<Uuid>,
    n: usize,
    confidence: f32,
) -> Vec<RecommendationEntry> {
    let mut scores: Vec<f32> = ranked.iter().map(|r| r.score).collect();
    min_max_normalize(&mut scores);

    ranked
        .iter()
        .zip(scores)
        .filter(|(r, _)| !exclude.contains(&r.product_id))
        .take(n)
        .map(|(r, score)| {
            RecommendationEntry::new(r.product_id, score, Method::Popularity)
                .with_confidence(confidence)
        })
        .collect()
}
