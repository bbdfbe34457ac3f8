use crate::models::{Method, RecommendationEntry};
use crate::utils::weighted_mean;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Multiplier applied when both engines agree on a product.
pub const CONSENSUS_BOOST: f32 = 1.2;

/// Per-engine blend weights. Fixed at request time; tuning them is a
/// training-side concern.
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub collaborative: f32,
    pub content: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.6,
            content: 0.4,
        }
    }
}

struct Signal {
    scores: Vec<(f32, f32)>,
    methods: Vec<Method>,
}

fn fold(
    merged: &mut BTreeMap<Uuid, Signal>,
    entries: &[RecommendationEntry],
    weight: f32,
    method: Method,
) {
    for e in entries {
        let signal = merged.entry(e.product_id).or_insert_with(|| Signal {
            scores: Vec::new(),
            methods: Vec::new(),
        });
        // A duplicate within one engine's list must not double-count.
        if signal.methods.contains(&method) {
            continue;
        }
        signal.scores.push((e.score, weight));
        signal.methods.push(method);
    }
}

/// Merges the two engines' ranked lists into one. Scores are the weighted
/// mean of the per-engine scores, boosted when both engines surface the
/// same product. Pure function of its inputs: same lists in, same list out.
pub fn combine(
    collaborative: &[RecommendationEntry],
    content: &[RecommendationEntry],
    weights: &HybridWeights,
    n: usize,
) -> Vec<RecommendationEntry> {
    let mut merged: BTreeMap<Uuid, Signal> = BTreeMap::new();
    fold(&mut merged, collaborative, weights.collaborative, Method::Collaborative);
    fold(&mut merged, content, weights.content, Method::Content);

    let mut combined: Vec<RecommendationEntry> = merged
        .into_iter()
        .map(|(product_id, signal)| {
            let mut score = weighted_mean(&signal.scores);
            if signal.methods.len() > 1 {
                score *= CONSENSUS_BOOST;
            }
            RecommendationEntry {
                product_id,
                score,
                confidence: score.clamp(0.0, 1.0),
                methods: signal.methods,
            }
        })
        .collect();

    combined.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    combined.truncate(n);
    combined
}
