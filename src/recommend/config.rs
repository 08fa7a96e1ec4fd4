use crate::error::{RecommendError, Result};
use crate::models::FeatureColumn;
use serde::Deserialize;

/// Tuning knobs for the hybrid recommendation engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub n_cluster_recs: usize,  // Peers drawn from the query track's cluster
    pub n_collab_recs: usize,   // Nearest neighbours in the interaction model
    pub n_external_recs: usize, // Tracks requested from the external recommendation API
    pub cluster_features: Vec<FeatureColumn>,
    pub max_clusters: usize,
    pub cluster_seed: u64,
    pub num_users: usize, // Rows of the synthetic interaction matrix
    pub interaction_seed: Option<u64>, // None draws fresh interactions on every start
    pub sampling_seed: Option<u64>,
    pub seed_genres: Vec<String>, // Extra genre seeds sent alongside the query track
    pub enrich_all_top_tracks: bool, // Artist queries store every top track, not just the first
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            n_cluster_recs: 5,
            n_collab_recs: 5,
            n_external_recs: 5,
            cluster_features: vec![
                FeatureColumn::Danceability,
                FeatureColumn::Energy,
                FeatureColumn::Valence,
                FeatureColumn::Tempo,
                FeatureColumn::Acousticness,
            ],
            max_clusters: 10,
            cluster_seed: 42,
            num_users: 100,
            interaction_seed: None,
            sampling_seed: None,
            seed_genres: Vec::new(),
            enrich_all_top_tracks: false,
        }
    }
}

impl EngineConfig {
    /// Load an engine configuration from a JSON object; omitted fields keep their defaults
    pub fn load_from_file(path: &str) -> Result<EngineConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content).map_err(|e| {
            RecommendError::Configuration(format!("invalid engine configuration in '{path}': {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster_features.is_empty() {
            return Err(RecommendError::Configuration(
                "cluster_features must name at least one audio feature".to_string(),
            ));
        }
        if self.max_clusters == 0 {
            return Err(RecommendError::Configuration(
                "max_clusters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Size of the final recommendation set
    pub fn total_recommendations(&self) -> usize {
        self.n_cluster_recs + self.n_collab_recs + self.n_external_recs
    }
}
