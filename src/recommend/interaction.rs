use crate::models::UnifiedRecord;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Item-item similarity source for the collaborative signal.
/// The synthetic model below can be swapped for one backed by real interaction logs.
pub trait SimilarityProvider {
    /// Up to `count` most similar items, most similar first, never `track_id` itself.
    /// Unknown ids yield an empty list.
    fn similar_items(&self, track_id: &str, count: usize) -> Vec<String>;

    /// Whether the provider no longer matches the current unified table
    fn is_stale(&self, _records: &[UnifiedRecord]) -> bool {
        false
    }

    fn rebuild(&mut self, _records: &[UnifiedRecord]) {}
}

/// Random binary user × item interactions, regenerated on every process start
pub struct SyntheticInteractionModel {
    num_users: usize,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    // One interaction vector per item (column of the user × item matrix)
    interactions: Vec<Vec<bool>>,
    rng: StdRng,
}

impl SyntheticInteractionModel {
    pub fn build(records: &[UnifiedRecord], num_users: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut model = SyntheticInteractionModel {
            num_users,
            columns: Vec::new(),
            column_index: HashMap::new(),
            interactions: Vec::new(),
            rng,
        };
        model.generate(records);
        model
    }

    fn generate(&mut self, records: &[UnifiedRecord]) {
        self.columns = records.iter().map(|r| r.track_id.clone()).collect();
        self.column_index = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let num_users = self.num_users;
        let rng = &mut self.rng;
        self.interactions = (0..self.columns.len())
            .map(|_| (0..num_users).map(|_| rng.gen_bool(0.5)).collect())
            .collect();

        info!(
            "Generated synthetic interaction matrix: {} users x {} tracks",
            self.num_users,
            self.columns.len()
        );
    }
}

impl SimilarityProvider for SyntheticInteractionModel {
    fn similar_items(&self, track_id: &str, count: usize) -> Vec<String> {
        let Some(&target) = self.column_index.get(track_id) else {
            debug!("Track '{track_id}' not found in interaction matrix for collaborative filtering");
            return Vec::new();
        };

        let query = &self.interactions[target];
        let mut scored: Vec<(usize, f64)> = self
            .interactions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target)
            .map(|(i, column)| (i, cosine_similarity(query, column)))
            .collect();

        // Stable sort keeps column order among ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(count)
            .map(|(i, _)| self.columns[i].clone())
            .collect()
    }

    fn is_stale(&self, records: &[UnifiedRecord]) -> bool {
        self.columns.len() != records.len()
            || self
                .columns
                .iter()
                .zip(records)
                .any(|(id, record)| *id != record.track_id)
    }

    fn rebuild(&mut self, records: &[UnifiedRecord]) {
        self.generate(records);
    }
}

/// Cosine similarity of two binary vectors; 0.0 when either is all zeros
pub fn cosine_similarity(a: &[bool], b: &[bool]) -> f64 {
    let mut dot = 0usize;
    let mut norm_a = 0usize;
    let mut norm_b = 0usize;
    for (&x, &y) in a.iter().zip(b) {
        dot += usize::from(x && y);
        norm_a += usize::from(x);
        norm_b += usize::from(y);
    }

    if norm_a == 0 || norm_b == 0 {
        return 0.0;
    }
    dot as f64 / ((norm_a as f64).sqrt() * (norm_b as f64).sqrt())
}
