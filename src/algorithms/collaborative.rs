use crate::algorithms::aggregator::UserItemMatrix;
use crate::error::{RecError, Result};
use crate::models::{Method, RecommendationEntry};
use crate::utils::min_max_normalize;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Fixed seed keeps factor initialization reproducible, so retraining on
/// identical input yields identical recommendations.
const FACTOR_INIT_SEED: u64 = 42;

/// Rank-k factorization of the user-product matrix, fit with alternating
/// least squares. Row i of the user factors pairs with user i of the input
/// matrix, and likewise for products.
#[derive(Debug, Clone)]
pub struct CollaborativeModel {
    rank: usize,
    users: Vec<Uuid>,
    products: Vec<Uuid>,
    user_factors: HashMap<Uuid, DVector<f32>>,
    item_factors: HashMap<Uuid, DVector<f32>>,
    seen: HashMap<Uuid, HashSet<Uuid>>,
}

impl CollaborativeModel {
    pub fn train(
        matrix: &UserItemMatrix,
        factors: usize,
        epochs: usize,
        regularization: f32,
    ) -> Result<Self> {
        let (n_users, n_products) = matrix.shape();
        if n_users == 0 || n_products == 0 {
            return Err(RecError::InsufficientData {
                rows: 0,
                required: 1,
            });
        }

        // Requested rank may exceed what a small matrix supports.
        let rank = factors.min(n_users.min(n_products).saturating_sub(1)).max(1);

        let mut rows: Vec<Vec<(usize, f32)>> = Vec::with_capacity(n_users);
        let mut cols: Vec<Vec<(usize, f32)>> = vec![Vec::new(); n_products];
        for u in 0..n_users {
            let row = matrix.row(u).to_vec();
            for &(p, w) in &row {
                cols[p].push((u, w));
            }
            rows.push(row);
        }

        let mut rng = StdRng::seed_from_u64(FACTOR_INIT_SEED);
        let mut user_vecs: Vec<DVector<f32>> = vec![DVector::zeros(rank); n_users];
        let mut item_vecs: Vec<DVector<f32>> = (0..n_products)
            .map(|_| DVector::from_fn(rank, |_, _| rng.gen_range(0.01..0.1)))
            .collect();

        let reg = regularization.max(1e-6);
        for _ in 0..epochs {
            solve_side(&mut user_vecs, &item_vecs, &rows, rank, reg);
            solve_side(&mut item_vecs, &user_vecs, &cols, rank, reg);
        }

        let users = matrix.users().to_vec();
        let products = matrix.products().to_vec();

        let user_factors: HashMap<Uuid, DVector<f32>> =
            users.iter().copied().zip(user_vecs).collect();
        let item_factors: HashMap<Uuid, DVector<f32>> =
            products.iter().copied().zip(item_vecs).collect();

        let mut seen: HashMap<Uuid, HashSet<Uuid>> = HashMap::with_capacity(n_users);
        for (u, row) in rows.iter().enumerate() {
            let set: HashSet<Uuid> = row.iter().map(|&(p, _)| products[p]).collect();
            seen.insert(users[u], set);
        }

        Ok(Self {
            rank,
            users,
            products,
            user_factors,
            item_factors,
            seen,
        })
    }

    /// Raw affinity of a user for a product. Unbounded; comparable only
    /// against other scores from the same trained model.
    pub fn score(&self, user_id: Uuid, product_id: Uuid) -> Result<f32> {
        let user = self
            .user_factors
            .get(&user_id)
            .ok_or_else(|| RecError::unknown_user(user_id))?;
        let item = self
            .item_factors
            .get(&product_id)
            .ok_or_else(|| RecError::unknown_product(product_id))?;
        Ok(user.dot(item))
    }

    /// Top-n unseen products for a user, scores min-max normalized over the
    /// whole candidate set before truncation.
    pub fn recommend(&self, user_id: Uuid, n: usize) -> Result<Vec<RecommendationEntry>> {
        let user = self
            .user_factors
            .get(&user_id)
            .ok_or_else(|| RecError::unknown_user(user_id))?;
        let seen = self.seen.get(&user_id);

        let mut candidates: Vec<(Uuid, f32)> = self
            .products
            .iter()
            .filter(|p| seen.map_or(true, |s| !s.contains(p)))
            .filter_map(|&p| self.item_factors.get(&p).map(|f| (p, user.dot(f))))
            .collect();

        let mut scores: Vec<f32> = candidates.iter().map(|&(_, s)| s).collect();
        min_max_normalize(&mut scores);
        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.1 = score;
        }

        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(n);

        Ok(candidates
            .into_iter()
            .map(|(product_id, score)| {
                RecommendationEntry::new(product_id, score, Method::Collaborative)
            })
            .collect())
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn knows_user(&self, user_id: Uuid) -> bool {
        self.user_factors.contains_key(&user_id)
    }

    pub fn user_factor(&self, user_id: Uuid) -> Option<&DVector<f32>> {
        self.user_factors.get(&user_id)
    }

    pub fn item_factor(&self, product_id: Uuid) -> Option<&DVector<f32>> {
        self.item_factors.get(&product_id)
    }
}

/// One half of an ALS sweep: re-solve every vector on the target side
/// against the fixed side, minimizing squared error over observed cells
/// plus an L2 penalty.
fn solve_side(
    target: &mut [DVector<f32>],
    fixed: &[DVector<f32>],
    observed: &[Vec<(usize, f32)>],
    rank: usize,
    reg: f32,
) {
    for (vec, obs) in target.iter_mut().zip(observed.iter()) {
        if obs.is_empty() {
            continue;
        }
        let mut gram = DMatrix::<f32>::identity(rank, rank) * reg;
        let mut rhs = DVector::<f32>::zeros(rank);
        for &(j, w) in obs {
            let f = &fixed[j];
            gram += f * f.transpose();
            rhs += f * w;
        }
        if let Some(chol) = gram.cholesky() {
            *vec = chol.solve(&rhs);
        }
    }
}
