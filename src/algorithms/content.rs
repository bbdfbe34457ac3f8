use crate::models::{Method, PreferenceProfile, Product, RecommendationEntry};
use crate::utils::cosine_similarity;
use ndarray::Array2;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "our", "so", "that", "the",
    "their", "this", "to", "was", "we", "will", "with", "you", "your",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn min_max_scale(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max - min > f32::EPSILON {
        values.iter().map(|v| (v - min) / (max - min)).collect()
    } else {
        // A constant column carries no signal; park it mid-range.
        vec![0.5; values.len()]
    }
}

/// Feature vector of one product: a sparse TF-IDF text block (term index,
/// weight) sorted by index and L2-normalized, followed by a dense block of
/// scaled numerics and one-hot categoricals.
#[derive(Debug, Clone)]
pub struct ProductFeatureVector {
    pub terms: Vec<(usize, f32)>,
    pub dense: Vec<f32>,
}

impl ProductFeatureVector {
    fn dot(&self, other: &Self) -> f32 {
        let mut sum = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.terms.len() && j < other.terms.len() {
            match self.terms[i].0.cmp(&other.terms[j].0) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    sum += self.terms[i].1 * other.terms[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum + self
            .dense
            .iter()
            .zip(&other.dense)
            .map(|(a, b)| a * b)
            .sum::<f32>()
    }

    fn norm(&self) -> f32 {
        let t: f32 = self.terms.iter().map(|&(_, v)| v * v).sum();
        let d: f32 = self.dense.iter().map(|v| v * v).sum();
        (t + d).sqrt()
    }

    pub fn cosine(&self, other: &Self) -> f32 {
        let denom = self.norm() * other.norm();
        if denom > 0.0 {
            self.dot(other) / denom
        } else {
            0.0
        }
    }

    /// Expands the sparse text block into a flat vector of
    /// `vocabulary_size + dense.len()` entries.
    pub fn to_dense(&self, vocabulary_size: usize) -> Vec<f32> {
        let mut out = vec![0.0; vocabulary_size + self.dense.len()];
        for &(t, v) in &self.terms {
            out[t] = v;
        }
        out[vocabulary_size..].copy_from_slice(&self.dense);
        out
    }
}

/// Content-based engine: product feature vectors plus the precomputed
/// pairwise cosine similarity matrix, indexed in product order.
#[derive(Debug)]
pub struct ContentModel {
    products: Vec<Uuid>,
    pos: HashMap<Uuid, usize>,
    features: Vec<ProductFeatureVector>,
    similarity: Array2<f32>,
    categories: Vec<Option<String>>,
    vocabulary_size: usize,
    dense_dim: usize,
}

impl ContentModel {
    pub fn train(catalog: &[Product], max_terms: usize, max_brands: usize) -> Self {
        let mut sorted: Vec<&Product> = catalog.iter().collect();
        sorted.sort_by_key(|p| p.id);
        sorted.dedup_by_key(|p| p.id);
        let n = sorted.len();

        let docs: Vec<Vec<String>> = sorted
            .iter()
            .map(|p| {
                let mut text = p.title.clone();
                if let Some(d) = &p.description {
                    text.push(' ');
                    text.push_str(d);
                }
                for tag in &p.tags {
                    text.push(' ');
                    text.push_str(tag);
                }
                if let Some(b) = &p.brand {
                    text.push(' ');
                    text.push_str(b);
                }
                tokenize(&text)
            })
            .collect();

        // Vocabulary: most frequent terms across the catalog, columns laid
        // out alphabetically so the layout is stable across retrains.
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for doc in &docs {
            for t in doc {
                *term_counts.entry(t.clone()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_terms);
        let mut vocab_terms: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        vocab_terms.sort();
        let vocab: HashMap<String, usize> = vocab_terms
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t, i))
            .collect();

        let mut df = vec![0usize; vocab.len()];
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for t in unique {
                if let Some(&i) = vocab.get(t) {
                    df[i] += 1;
                }
            }
        }
        let idf: Vec<f32> = df
            .iter()
            .map(|&d| ((1 + n) as f32 / (1 + d) as f32).ln() + 1.0)
            .collect();

        // Missing numerics impute to the catalog median, missing
        // categoricals to an explicit "unknown" bucket.
        let median_price = median(sorted.iter().filter_map(|p| p.price).collect());
        let median_rating = median(
            sorted
                .iter()
                .filter_map(|p| p.rating.map(|r| r as f64))
                .collect(),
        );
        let median_reviews = median(
            sorted
                .iter()
                .filter_map(|p| p.review_count.map(|c| c as f64))
                .collect(),
        );

        let prices: Vec<f32> = sorted
            .iter()
            .map(|p| p.price.unwrap_or(median_price) as f32)
            .collect();
        let price_scaled = min_max_scale(&prices);
        let rating_scaled: Vec<f32> = sorted
            .iter()
            .map(|p| (p.rating.unwrap_or(median_rating as f32) / 5.0).clamp(0.0, 1.0))
            .collect();
        let review_logs: Vec<f32> = sorted
            .iter()
            .map(|p| (1.0 + p.review_count.map_or(median_reviews, |c| c as f64)).ln() as f32)
            .collect();
        let review_scaled = min_max_scale(&review_logs);

        let category_of = |p: &Product| p.category.clone().unwrap_or_else(|| "unknown".to_string());
        let category_cols: Vec<String> = sorted
            .iter()
            .map(|&p| category_of(p))
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        let category_idx: HashMap<&str, usize> = category_cols
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let brand_of = |p: &Product| p.brand.clone().unwrap_or_else(|| "unknown".to_string());
        let mut brand_counts: HashMap<String, usize> = HashMap::new();
        for &p in &sorted {
            *brand_counts.entry(brand_of(p)).or_insert(0) += 1;
        }
        let mut brand_ranked: Vec<(String, usize)> = brand_counts.into_iter().collect();
        brand_ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        brand_ranked.truncate(max_brands);
        let mut brand_cols: Vec<String> = brand_ranked.into_iter().map(|(b, _)| b).collect();
        brand_cols.sort();
        let brand_idx: HashMap<&str, usize> = brand_cols
            .iter()
            .enumerate()
            .map(|(i, b)| (b.as_str(), i))
            .collect();

        // Long-tail brands beyond the cap share one trailing column.
        let dense_dim = 4 + category_cols.len() + brand_cols.len() + 1;

        let mut features = Vec::with_capacity(n);
        for (i, &p) in sorted.iter().enumerate() {
            let mut tf: HashMap<usize, f32> = HashMap::new();
            for t in &docs[i] {
                if let Some(&ti) = vocab.get(t.as_str()) {
                    *tf.entry(ti).or_insert(0.0) += 1.0;
                }
            }
            let mut terms: Vec<(usize, f32)> =
                tf.into_iter().map(|(ti, c)| (ti, c * idf[ti])).collect();
            terms.sort_by_key(|&(ti, _)| ti);
            let norm: f32 = terms.iter().map(|&(_, v)| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for term in terms.iter_mut() {
                    term.1 /= norm;
                }
            }

            let mut dense = vec![0.0f32; dense_dim];
            dense[0] = price_scaled[i];
            dense[1] = rating_scaled[i];
            dense[2] = review_scaled[i];
            dense[3] = if p.in_stock { 1.0 } else { 0.0 };
            dense[4 + category_idx[category_of(p).as_str()]] = 1.0;
            let brand = brand_of(p);
            let brand_col = brand_idx
                .get(brand.as_str())
                .copied()
                .unwrap_or(brand_cols.len());
            dense[4 + category_cols.len() + brand_col] = 1.0;

            features.push(ProductFeatureVector { terms, dense });
        }

        let flat: Vec<f32> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row: Vec<f32> = (0..n)
                    .map(|j| {
                        if i == j {
                            1.0
                        } else {
                            features[i].cosine(&features[j])
                        }
                    })
                    .collect();
                row
            })
            .collect::<Vec<Vec<f32>>>()
            .concat();
        let similarity = Array2::from_shape_vec((n, n), flat).unwrap_or_else(|_| Array2::eye(n));

        let products: Vec<Uuid> = sorted.iter().map(|p| p.id).collect();
        let pos: HashMap<Uuid, usize> = products
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        let categories: Vec<Option<String>> = sorted.iter().map(|p| p.category.clone()).collect();

        Self {
            products,
            pos,
            features,
            similarity,
            categories,
            vocabulary_size: vocab.len(),
            dense_dim,
        }
    }

    /// Products most similar to the given one, excluding itself, keeping
    /// only similarities strictly above `threshold`. Unknown ids yield an
    /// empty list.
    pub fn similar(&self, product_id: Uuid, n: usize, threshold: f32) -> Vec<RecommendationEntry> {
        let idx = match self.pos.get(&product_id) {
            Some(&i) => i,
            None => return Vec::new(),
        };

        let mut candidates: Vec<(Uuid, f32)> = self
            .similarity
            .row(idx)
            .iter()
            .enumerate()
            .filter(|&(j, &s)| j != idx && s > threshold)
            .map(|(j, &s)| (self.products[j], s))
            .collect();

        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(n);

        candidates
            .into_iter()
            .map(|(id, score)| RecommendationEntry::new(id, score, Method::Content))
            .collect()
    }

    /// Builds a taste vector for a user in feature space. Purchases weigh
    /// double views; with no usable history it falls back to the mean vector
    /// of the user's preferred categories, and yields `None` when even that
    /// is empty.
    pub fn profile_for_user(&self, profile: &PreferenceProfile) -> Option<Vec<f32>> {
        let dim = self.vocabulary_size + self.dense_dim;
        let mut acc = vec![0.0f32; dim];
        let mut total = 0.0f32;

        for (ids, weight) in [(&profile.purchased, 2.0f32), (&profile.viewed, 1.0f32)] {
            for id in ids {
                if let Some(&i) = self.pos.get(id) {
                    self.add_scaled(&mut acc, i, weight);
                    total += weight;
                }
            }
        }
        if total > 0.0 {
            for v in acc.iter_mut() {
                *v /= total;
            }
            return Some(acc);
        }

        let mut count = 0.0f32;
        for (i, category) in self.categories.iter().enumerate() {
            if let Some(c) = category {
                if profile.preferred_categories.iter().any(|pc| pc == c) {
                    self.add_scaled(&mut acc, i, 1.0);
                    count += 1.0;
                }
            }
        }
        if count > 0.0 {
            for v in acc.iter_mut() {
                *v /= count;
            }
            Some(acc)
        } else {
            None
        }
    }

    /// Top-n products by cosine similarity to the user's taste vector,
    /// excluding already-interacted products. `None` when no profile can be
    /// derived, so the caller can tell cold start from thin results.
    pub fn recommend(
        &self,
        profile: &PreferenceProfile,
        n: usize,
        threshold: f32,
    ) -> Option<Vec<RecommendationEntry>> {
        let query = self.profile_for_user(profile)?;
        let exclude: HashSet<&Uuid> = profile
            .purchased
            .iter()
            .chain(profile.viewed.iter())
            .collect();

        let mut candidates: Vec<(Uuid, f32)> = Vec::new();
        for (i, id) in self.products.iter().enumerate() {
            if exclude.contains(id) {
                continue;
            }
            let sim = cosine_similarity(&query, &self.features[i].to_dense(self.vocabulary_size));
            if sim > threshold {
                candidates.push((*id, sim));
            }
        }

        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(n);

        Some(
            candidates
                .into_iter()
                .map(|(id, score)| RecommendationEntry::new(id, score, Method::Content))
                .collect(),
        )
    }

    fn add_scaled(&self, acc: &mut [f32], feature_idx: usize, weight: f32) {
        let f = &self.features[feature_idx];
        for &(t, v) in &f.terms {
            acc[t] += v * weight;
        }
        for (d, v) in f.dense.iter().enumerate() {
            acc[self.vocabulary_size + d] += v * weight;
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn product_ids(&self) -> &[Uuid] {
        &self.products
    }

    pub fn category_of(&self, product_id: Uuid) -> Option<&str> {
        let &i = self.pos.get(&product_id)?;
        self.categories[i].as_deref()
    }

    pub fn similarity_matrix(&self) -> &Array2<f32> {
        &self.similarity
    }

    pub fn feature_of(&self, product_id: Uuid) -> Option<&ProductFeatureVector> {
        self.pos.get(&product_id).map(|&i| &self.features[i])
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }
}
