use super::cluster::ClusterIndex;
use super::config::EngineConfig;
use super::interaction::{SimilarityProvider, SyntheticInteractionModel};
use super::sampling::{RecommendedTrack, SignalSource, merge_unique, sample_up_to};
use crate::client::{CatalogGateway, Seeds};
use crate::error::{RecommendError, Result};
use crate::store::FeatureStore;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fmt;

// The recommendations endpoint accepts at most five seeds in total
const MAX_SEEDS: usize = 5;
// and returns at most 100 tracks per request
const MAX_EXTERNAL_LIMIT: usize = 100;

/// What the user typed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Track,
    Artist,
}

/// Result of one recommendation query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecommendationOutcome {
    Found {
        seed_note: Option<String>,
        tracks: Vec<RecommendedTrack>,
    },
    Unavailable {
        seed_note: Option<String>,
    },
}

impl RecommendationOutcome {
    /// Prefix the outcome with a note on how the query was resolved
    pub fn with_seed_note(self, note: String) -> Self {
        match self {
            RecommendationOutcome::Found { tracks, .. } => RecommendationOutcome::Found {
                seed_note: Some(note),
                tracks,
            },
            RecommendationOutcome::Unavailable { .. } => RecommendationOutcome::Unavailable {
                seed_note: Some(note),
            },
        }
    }
}

impl fmt::Display for RecommendationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationOutcome::Unavailable { seed_note } => {
                if let Some(note) = seed_note {
                    writeln!(f, "{note}\n")?;
                }
                write!(f, "No recommendations available.")
            }
            RecommendationOutcome::Found { seed_note, tracks } => {
                if let Some(note) = seed_note {
                    writeln!(f, "{note}\n")?;
                }
                for (i, track) in tracks.iter().enumerate() {
                    writeln!(
                        f,
                        "{:>3}. {} - {} [{}]",
                        i + 1,
                        track.track_name,
                        track.artist_name,
                        track.source
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// Blends cluster peers, collaborative neighbours and external recommendations
pub struct HybridEngine {
    config: EngineConfig,
    store: FeatureStore,
    gateway: Box<dyn CatalogGateway>,
    similarity: Box<dyn SimilarityProvider>,
    clusters: Option<ClusterIndex>,
    rng: StdRng,
}

impl HybridEngine {
    /// Create an engine backed by the synthetic interaction model
    pub fn new(config: EngineConfig, store: FeatureStore, gateway: Box<dyn CatalogGateway>) -> Self {
        let similarity = SyntheticInteractionModel::build(
            store.unified(),
            config.num_users,
            config.interaction_seed,
        );
        Self::with_similarity(config, store, gateway, Box::new(similarity))
    }

    pub fn with_similarity(
        config: EngineConfig,
        store: FeatureStore,
        gateway: Box<dyn CatalogGateway>,
        similarity: Box<dyn SimilarityProvider>,
    ) -> Self {
        let rng = match config.sampling_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut engine = Self {
            config,
            store,
            gateway,
            similarity,
            clusters: None,
            rng,
        };
        engine.refresh_models();
        engine
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub fn clusters(&self) -> Option<&ClusterIndex> {
        self.clusters.as_ref()
    }

    /// Resolve a track or artist name and recommend around it
    pub fn recommend(&mut self, input_text: &str, kind: QueryKind) -> Result<RecommendationOutcome> {
        match kind {
            QueryKind::Track => {
                let track_id = self
                    .gateway
                    .search_track_by_name(input_text)
                    .map_err(|e| resolution_failure("track ID", e))?
                    .ok_or_else(|| RecommendError::NotFound("Track not found on Spotify.".to_string()))?;
                Ok(self.hybrid_recommendation(&track_id))
            }
            QueryKind::Artist => self.recommend_for_artist(input_text),
        }
    }

    fn recommend_for_artist(&mut self, artist_name: &str) -> Result<RecommendationOutcome> {
        let artist_id = self
            .gateway
            .search_artist_by_name(artist_name)
            .map_err(|e| resolution_failure("artist ID", e))?
            .ok_or_else(|| RecommendError::NotFound("Artist not found on Spotify.".to_string()))?;

        let mut top_tracks = self
            .gateway
            .top_tracks_of_artist(&artist_id)
            .map_err(|e| resolution_failure("top tracks", e))?;
        if top_tracks.is_empty() {
            return Err(RecommendError::NotFound(
                "No top tracks found for this artist on Spotify.".to_string(),
            ));
        }

        // The representative track is filed under the name the user searched for
        top_tracks[0].artist_name = artist_name.to_string();
        let representative = top_tracks[0].clone();
        if !self.config.enrich_all_top_tracks {
            top_tracks.truncate(1);
        }

        match self.store.ensure_tracks(&top_tracks, self.gateway.as_ref()) {
            Ok(0) => debug!("Top tracks of '{artist_name}' already known"),
            Ok(added) => info!("Added {added} top tracks of '{artist_name}' to the dataset"),
            Err(e) => warn!("Could not store top tracks of '{artist_name}': {e}"),
        }

        let note = format!(
            "Using top track '{}' by {} for recommendations.",
            representative.track_name, artist_name
        );
        Ok(self
            .hybrid_recommendation(&representative.track_id)
            .with_seed_note(note))
    }

    /// Recommend around a known catalog track id. Every signal may fail on its own;
    /// the result is whatever the remaining signals produced.
    pub fn hybrid_recommendation(&mut self, track_id: &str) -> RecommendationOutcome {
        match self.store.ensure_present(track_id, self.gateway.as_ref()) {
            Ok(true) => info!("Track '{track_id}' added to the dataset"),
            Ok(false) => debug!("Track '{track_id}' already in the dataset"),
            Err(e) => warn!("Could not add track '{track_id}' to the dataset: {e}"),
        }

        self.refresh_models();

        let cluster_recs = self.cluster_signal(track_id);
        let collab_recs = self.collaborative_signal(track_id);
        let external_recs = self.external_signal(track_id);
        debug!(
            "Signals for '{track_id}': {} cluster, {} collaborative, {} external",
            cluster_recs.len(),
            collab_recs.len(),
            external_recs.len()
        );

        let merged = merge_unique([cluster_recs, collab_recs, external_recs]);
        let tracks = sample_up_to(merged, self.config.total_recommendations(), &mut self.rng);

        if tracks.is_empty() {
            RecommendationOutcome::Unavailable { seed_note: None }
        } else {
            RecommendationOutcome::Found {
                seed_note: None,
                tracks,
            }
        }
    }

    /// Recluster and regenerate interactions when the unified table has moved on
    fn refresh_models(&mut self) {
        let records = self.store.unified();
        let features = &self.config.cluster_features;

        let labelled = self
            .clusters
            .as_ref()
            .is_some_and(|index| index.covers(records, features));

        if labelled {
            debug!("Clustering already applied");
        } else {
            self.clusters = match ClusterIndex::build(
                records,
                features,
                self.config.max_clusters,
                self.config.cluster_seed,
            ) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("Clustering failed: {e}");
                    None
                }
            };
        }

        if self.similarity.is_stale(records) {
            self.similarity.rebuild(records);
        }
    }

    fn cluster_signal(&mut self, track_id: &str) -> Vec<RecommendedTrack> {
        let Some(index) = &self.clusters else {
            warn!("No cluster index available, skipping cluster recommendations");
            return Vec::new();
        };

        match index.peers_of(track_id, self.config.n_cluster_recs, &mut self.rng) {
            Ok(peers) => self.project(&peers, SignalSource::Cluster),
            Err(e) => {
                warn!("Skipping cluster recommendations: {e}");
                Vec::new()
            }
        }
    }

    fn collaborative_signal(&self, track_id: &str) -> Vec<RecommendedTrack> {
        let neighbours = self
            .similarity
            .similar_items(track_id, self.config.n_collab_recs);
        self.project(&neighbours, SignalSource::Collaborative)
    }

    fn external_signal(&mut self, track_id: &str) -> Vec<RecommendedTrack> {
        if self.config.n_external_recs == 0 {
            return Vec::new();
        }

        let mut seeds = Seeds::from_track(track_id);
        seeds.genres = self
            .config
            .seed_genres
            .iter()
            .take(MAX_SEEDS - 1)
            .cloned()
            .collect();

        let external = self
            .gateway
            .fetch_recommendations(&seeds, external_limit(self.config.n_external_recs));
        if external.is_empty() {
            return Vec::new();
        }

        // Keep the dataset growing with every track the catalog suggests
        if let Err(e) = self.store.ensure_tracks(&external, self.gateway.as_ref()) {
            warn!("Could not store external recommendations: {e}");
        }

        external
            .iter()
            .map(|t| RecommendedTrack::new(&t.track_name, &t.artist_name, SignalSource::External))
            .collect()
    }

    /// Map track ids to display rows, dropping ids the store does not know
    fn project(&self, track_ids: &[String], source: SignalSource) -> Vec<RecommendedTrack> {
        track_ids
            .iter()
            .filter_map(|id| self.store.lookup(id))
            .map(|record| RecommendedTrack::new(&record.track_name, &record.artist_name, source))
            .collect()
    }
}

/// A catalog outage while resolving the query is reported to the user like a miss
fn resolution_failure(what: &str, error: RecommendError) -> RecommendError {
    match error {
        RecommendError::ExternalService(_) => {
            warn!("Error fetching {what}: {error}");
            RecommendError::NotFound(format!("Error fetching {what}: {error}"))
        }
        other => other,
    }
}

fn external_limit(requested: usize) -> u32 {
    requested.min(MAX_EXTERNAL_LIMIT) as u32
}
