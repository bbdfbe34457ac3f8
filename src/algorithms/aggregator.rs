use crate::config::TrainingConfig;
use crate::error::{RecError, Result};
use crate::models::Interaction;
use crate::utils::recency_decay;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Sparse user-product preference matrix. Absence of a cell means
/// "unobserved", not zero preference; stored weights are always positive.
/// Rebuilt wholesale each training cycle, never patched in place.
#[derive(Debug, Clone)]
pub struct UserItemMatrix {
    users: Vec<Uuid>,
    products: Vec<Uuid>,
    user_pos: HashMap<Uuid, usize>,
    product_pos: HashMap<Uuid, usize>,
    rows: Vec<Vec<(usize, f32)>>,
    interaction_count: usize,
}

impl UserItemMatrix {
    pub fn shape(&self) -> (usize, usize) {
        (self.users.len(), self.products.len())
    }

    pub fn users(&self) -> &[Uuid] {
        &self.users
    }

    pub fn products(&self) -> &[Uuid] {
        &self.products
    }

    /// Observed cells of one user row, as (product index, weight) sorted by
    /// product index.
    pub fn row(&self, user_idx: usize) -> &[(usize, f32)] {
        &self.rows[user_idx]
    }

    pub fn user_index(&self, user_id: Uuid) -> Option<usize> {
        self.user_pos.get(&user_id).copied()
    }

    pub fn product_index(&self, product_id: Uuid) -> Option<usize> {
        self.product_pos.get(&product_id).copied()
    }

    pub fn weight(&self, user_id: Uuid, product_id: Uuid) -> Option<f32> {
        let u = self.user_index(user_id)?;
        let p = self.product_index(product_id)?;
        self.rows[u]
            .iter()
            .find(|&&(idx, _)| idx == p)
            .map(|&(_, w)| w)
    }

    /// Number of raw interactions that survived filtering and went into the
    /// aggregation.
    pub fn interaction_count(&self) -> usize {
        self.interaction_count
    }

    pub fn observed_cells(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }
}

/// Folds raw interaction records into a [`UserItemMatrix`]. Aggregation is
/// order-independent: the produced matrix depends only on the set of
/// interactions and `now`.
pub struct InteractionAggregator {
    min_user_interactions: usize,
    min_product_interactions: usize,
    min_total_interactions: usize,
    max_age: Option<Duration>,
    decay_rate: Option<f64>,
}

impl InteractionAggregator {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            min_user_interactions: config.min_user_interactions,
            min_product_interactions: config.min_product_interactions,
            min_total_interactions: config.min_total_interactions,
            max_age: (config.max_interaction_age_days > 0)
                .then(|| Duration::days(config.max_interaction_age_days)),
            decay_rate: config.recency_decay.then_some(config.recency_decay_rate),
        }
    }

    pub fn aggregate(
        &self,
        interactions: &[Interaction],
        now: DateTime<Utc>,
    ) -> Result<UserItemMatrix> {
        let recent: Vec<&Interaction> = interactions
            .iter()
            .filter(|i| match self.max_age {
                Some(max_age) => now.signed_duration_since(i.timestamp) <= max_age,
                None => true,
            })
            .collect();

        let mut user_counts: HashMap<Uuid, usize> = HashMap::new();
        let mut product_counts: HashMap<Uuid, usize> = HashMap::new();
        for i in &recent {
            *user_counts.entry(i.user_id).or_insert(0) += 1;
            *product_counts.entry(i.product_id).or_insert(0) += 1;
        }

        // Sparse rows and columns carry more noise than signal; drop them
        // before they ever reach the factorization.
        let kept: Vec<&Interaction> = recent
            .into_iter()
            .filter(|i| {
                user_counts[&i.user_id] >= self.min_user_interactions
                    && product_counts[&i.product_id] >= self.min_product_interactions
            })
            .collect();

        if kept.len() < self.min_total_interactions {
            return Err(RecError::InsufficientData {
                rows: kept.len(),
                required: self.min_total_interactions,
            });
        }

        // Accumulate in f64 keyed by sorted (user, product) so the result
        // does not depend on input order.
        let mut cells: BTreeMap<(Uuid, Uuid), f64> = BTreeMap::new();
        for i in &kept {
            let decay = match self.decay_rate {
                Some(rate) => recency_decay(i.timestamp, now, rate) as f64,
                None => 1.0,
            };
            let weight = i.interaction_type.weight() as f64 * decay;
            *cells.entry((i.user_id, i.product_id)).or_insert(0.0) += weight;
        }

        let mut users: Vec<Uuid> = cells.keys().map(|&(u, _)| u).collect();
        users.dedup();
        let mut products: Vec<Uuid> = cells.keys().map(|&(_, p)| p).collect();
        products.sort();
        products.dedup();

        let user_pos: HashMap<Uuid, usize> =
            users.iter().enumerate().map(|(i, &u)| (u, i)).collect();
        let product_pos: HashMap<Uuid, usize> =
            products.iter().enumerate().map(|(i, &p)| (p, i)).collect();

        let mut rows: Vec<Vec<(usize, f32)>> = vec![Vec::new(); users.len()];
        for (&(u, p), &w) in &cells {
            rows[user_pos[&u]].push((product_pos[&p], w as f32));
        }

        Ok(UserItemMatrix {
            users,
            products,
            user_pos,
            product_pos,
            rows,
            interaction_count: kept.len(),
        })
    }
}
