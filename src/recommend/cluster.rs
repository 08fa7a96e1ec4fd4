//! Audio-feature clustering of the unified table.
//!
//! Features are mean-imputed and standardized before k-means, so tempo (BPM)
//! and loudness (dB) do not dominate the [0, 1] descriptors.

use crate::error::{RecommendError, Result};
use crate::models::{FeatureColumn, UnifiedRecord};
use linfa::DatasetBase;
use linfa::traits::{Fit, Predict};
use linfa_clustering::{KMeans, KMeansInit};
use log::{debug, info};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256Plus;
use std::collections::HashMap;

/// Summary statistics of one raw (unscaled) feature column
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    pub column: FeatureColumn,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub missing: usize,
}

/// Cluster labels for every track of one clustering run
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    features: Vec<FeatureColumn>,
    labels: HashMap<String, usize>,
    members: Vec<Vec<String>>,
    stats: Vec<FeatureStats>,
}

impl ClusterIndex {
    /// Partition `records` into `min(max_clusters, records.len())` groups.
    /// Identical input and seed always yield identical labels.
    pub fn build(
        records: &[UnifiedRecord],
        features: &[FeatureColumn],
        max_clusters: usize,
        seed: u64,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(RecommendError::DataIntegrity(
                "clustering needs at least one feature column".to_string(),
            ));
        }

        let stats = feature_stats(records, features);
        let mut index = ClusterIndex {
            features: features.to_vec(),
            labels: HashMap::new(),
            members: Vec::new(),
            stats,
        };
        if records.is_empty() {
            return Ok(index);
        }

        let data = standardized_matrix(records, &index.stats);
        let k = max_clusters.max(1).min(records.len());

        let model = KMeans::params_with_rng(k, Xoshiro256Plus::seed_from_u64(seed))
            .init_method(KMeansInit::Random)
            .n_runs(10)
            .max_n_iterations(300)
            .tolerance(1e-4)
            .fit(&DatasetBase::from(data.clone()))
            .map_err(|e| RecommendError::DataIntegrity(format!("k-means failed: {e}")))?;
        let labels: Array1<usize> = model.predict(&data);

        index.members = vec![Vec::new(); k];
        for (record, &label) in records.iter().zip(labels.iter()) {
            index.labels.insert(record.track_id.clone(), label);
            index.members[label].push(record.track_id.clone());
        }

        info!(
            "Clustering applied: {} tracks in {} clusters",
            records.len(),
            k
        );
        Ok(index)
    }

    pub fn label_of(&self, track_id: &str) -> Option<usize> {
        self.labels.get(track_id).copied()
    }

    /// Up to `count` random tracks sharing `track_id`'s cluster, never the track itself.
    /// Fewer peers than requested is not an error.
    pub fn peers_of<R: Rng + ?Sized>(
        &self,
        track_id: &str,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<String>> {
        let label = self.label_of(track_id).ok_or_else(|| {
            RecommendError::NotFound(format!("track '{track_id}' has no cluster label"))
        })?;

        let peers: Vec<&String> = self.members[label]
            .iter()
            .filter(|id| id.as_str() != track_id)
            .collect();
        if peers.len() < count {
            debug!(
                "Cluster {label} has {} peers for '{track_id}', {count} requested",
                peers.len()
            );
        }

        Ok(peers
            .choose_multiple(rng, count)
            .map(|id| (*id).clone())
            .collect())
    }

    /// Whether every record carries a label from this run on the same feature set
    pub fn covers(&self, records: &[UnifiedRecord], features: &[FeatureColumn]) -> bool {
        self.features == features && records.iter().all(|r| self.labels.contains_key(&r.track_id))
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }

    pub fn feature_stats(&self) -> &[FeatureStats] {
        &self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn feature_stats(records: &[UnifiedRecord], features: &[FeatureColumn]) -> Vec<FeatureStats> {
    features
        .iter()
        .map(|&column| {
            let values: Vec<f64> = records.iter().filter_map(|r| r.feature(column)).collect();
            let missing = records.len() - values.len();

            if values.is_empty() {
                // Nothing to impute from
                return FeatureStats {
                    column,
                    mean: 0.0,
                    std_dev: 0.0,
                    min: 0.0,
                    max: 0.0,
                    missing,
                };
            }

            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

            FeatureStats {
                column,
                mean,
                // Imputed cells sit on the mean and add nothing to the variance, only to the count
                std_dev: (variance * n / records.len() as f64).sqrt(),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                missing,
            }
        })
        .collect()
}

/// Mean-impute missing cells and scale each column to zero mean and unit variance
fn standardized_matrix(records: &[UnifiedRecord], stats: &[FeatureStats]) -> Array2<f64> {
    Array2::from_shape_fn((records.len(), stats.len()), |(row, col)| {
        let stat = &stats[col];
        let value = records[row].feature(stat.column).unwrap_or(stat.mean);
        if stat.std_dev > f64::EPSILON {
            (value - stat.mean) / stat.std_dev
        } else {
            0.0
        }
    })
}
