use chrono::{DateTime, Utc};

pub mod validation;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Rescales scores into [0,1] in place. A degenerate batch (all values
/// equal) maps to 0.5 so downstream weighting still has something to work
/// with.
pub fn min_max_normalize(scores: &mut [f32]) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &s in scores.iter() {
        min = min.min(s);
        max = max.max(s);
    }

    if scores.is_empty() {
        return;
    }

    let range = max - min;
    if range > f32::EPSILON {
        for s in scores.iter_mut() {
            *s = (*s - min) / range;
        }
    } else {
        for s in scores.iter_mut() {
            *s = 0.5;
        }
    }
}

/// Weighted mean over (value, weight) pairs; 0.0 when no weight.
pub fn weighted_mean(pairs: &[(f32, f32)]) -> f32 {
    let mut sum = 0.0;
    let mut total_weight = 0.0;
    for &(value, weight) in pairs {
        sum += value * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        sum / total_weight
    } else {
        0.0
    }
}

/// Exponential recency decay: weight multiplier for an interaction
/// `timestamp` old as seen from `now`. Future timestamps decay nothing.
pub fn recency_decay(timestamp: DateTime<Utc>, now: DateTime<Utc>, rate_per_day: f64) -> f32 {
    let age_days = now.signed_duration_since(timestamp).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    (-rate_per_day * age_days).exp() as f32
}
