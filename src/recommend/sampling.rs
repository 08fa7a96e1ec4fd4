use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Which signal produced a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Cluster,
    Collaborative,
    External,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalSource::Cluster => "cluster",
            SignalSource::Collaborative => "collaborative",
            SignalSource::External => "external",
        };
        f.write_str(name)
    }
}

/// A recommended track as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedTrack {
    pub track_name: String,
    pub artist_name: String,
    pub source: SignalSource,
}

impl RecommendedTrack {
    pub fn new(track_name: &str, artist_name: &str, source: SignalSource) -> Self {
        Self {
            track_name: track_name.to_string(),
            artist_name: artist_name.to_string(),
            source,
        }
    }
}

/// Union the signals in order, keeping the first occurrence of every (track, artist) pair
pub fn merge_unique<I>(signals: I) -> Vec<RecommendedTrack>
where
    I: IntoIterator<Item = Vec<RecommendedTrack>>,
{
    let mut seen = HashSet::new();
    signals
        .into_iter()
        .flatten()
        .filter(|track| seen.insert((track.track_name.clone(), track.artist_name.clone())))
        .collect()
}

/// Uniform sample of `limit` items without replacement; everything when there are no more than `limit`
pub fn sample_up_to<R: Rng + ?Sized>(
    items: Vec<RecommendedTrack>,
    limit: usize,
    rng: &mut R,
) -> Vec<RecommendedTrack> {
    if items.len() <= limit {
        return items;
    }
    items.choose_multiple(rng, limit).cloned().collect()
}
