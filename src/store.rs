use crate::client::CatalogGateway;
use crate::error::{RecommendError, Result};
use crate::models::{AudioFeatures, Track, UnifiedRecord};
use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const TRACKS_FILE: &str = "tracks.csv";
pub const AUDIO_FEATURES_FILE: &str = "audio_features.csv";
pub const COMBINED_FILE: &str = "combined.csv";

/// Persistent track metadata + audio-feature tables and their joined view
pub struct FeatureStore {
    dir: PathBuf,
    tracks: Vec<Track>,
    features: Vec<AudioFeatures>,
    unified: Vec<UnifiedRecord>,
    index: HashMap<String, usize>,
}

impl FeatureStore {
    /// Open the store in `dir`, treating missing tables as empty.
    /// The unified table is always rebuilt from the two source tables, so a run that
    /// stopped between writes leaves nothing stale behind.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let tracks = read_table(&dir.join(TRACKS_FILE))?;
        let features = read_table(&dir.join(AUDIO_FEATURES_FILE))?;

        let mut store = FeatureStore {
            dir,
            tracks,
            features,
            unified: Vec::new(),
            index: HashMap::new(),
        };
        store.clean_and_join()?;

        info!(
            "Loaded feature store: {} tracks, {} audio feature rows, {} unified records",
            store.tracks.len(),
            store.features.len(),
            store.unified.len()
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn unified(&self) -> &[UnifiedRecord] {
        &self.unified
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn audio_features(&self) -> &[AudioFeatures] {
        &self.features
    }

    pub fn lookup(&self, track_id: &str) -> Option<&UnifiedRecord> {
        self.index.get(track_id).map(|&i| &self.unified[i])
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.index.contains_key(track_id)
    }

    /// Append metadata rows whose ids are not stored yet; known ids are discarded, never overwritten
    pub fn append_tracks(&mut self, incoming: &[Track]) -> Result<usize> {
        let added = append_unique(&mut self.tracks, incoming);
        if added > 0 {
            write_table(&self.dir.join(TRACKS_FILE), &self.tracks)?;
            info!("Added {added} new tracks to {TRACKS_FILE}");
        } else {
            debug!("No new tracks to add");
        }
        Ok(added)
    }

    /// Append audio-feature rows whose ids are not stored yet
    pub fn append_audio_features(&mut self, incoming: &[AudioFeatures]) -> Result<usize> {
        let added = append_unique(&mut self.features, incoming);
        if added > 0 {
            write_table(&self.dir.join(AUDIO_FEATURES_FILE), &self.features)?;
            info!("Added {added} new audio features to {AUDIO_FEATURES_FILE}");
        } else {
            debug!("No new audio features to add");
        }
        Ok(added)
    }

    /// Make sure `track_id` is part of the unified table, fetching whatever is missing.
    /// Returns true when the track was newly joined.
    pub fn ensure_present(
        &mut self,
        track_id: &str,
        gateway: &dyn CatalogGateway,
    ) -> Result<bool> {
        if self.contains(track_id) {
            return Ok(false);
        }

        let track = match self.tracks.iter().find(|t| t.track_id == track_id) {
            Some(known) => known.clone(),
            None => gateway.fetch_metadata(track_id)?,
        };

        info!("Adding track '{track_id}' to the dataset");
        Ok(self.ensure_tracks(&[track], gateway)? > 0)
    }

    /// Store metadata the caller already holds, fetch audio features for any track that lacks
    /// them and rejoin. Tracks already in the unified table are skipped entirely.
    /// Returns how many tracks joined the unified table.
    pub fn ensure_tracks(&mut self, tracks: &[Track], gateway: &dyn CatalogGateway) -> Result<usize> {
        let unknown: Vec<Track> = tracks
            .iter()
            .filter(|t| !self.contains(&t.track_id))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return Ok(0);
        }

        self.append_tracks(&unknown)?;

        let have_features: HashSet<&str> =
            self.features.iter().map(|f| f.track_id.as_str()).collect();
        let mut seen = HashSet::new();
        let missing: Vec<String> = unknown
            .iter()
            .map(|t| t.track_id.clone())
            .filter(|id| !have_features.contains(id.as_str()) && seen.insert(id.clone()))
            .collect();

        if !missing.is_empty() {
            let fetched = gateway.fetch_audio_features(&missing)?;
            self.append_audio_features(&fetched)?;
        }

        let before = self.unified.len();
        self.clean_and_join()?;
        Ok(self.unified.len().saturating_sub(before))
    }

    /// Deduplicate both source tables, inner-join them on track id (in metadata order)
    /// and persist all three tables. Re-running on clean data rewrites identical bytes.
    pub fn clean_and_join(&mut self) -> Result<()> {
        dedup_by_id(&mut self.tracks);
        dedup_by_id(&mut self.features);

        let features_by_id: HashMap<&str, &AudioFeatures> = self
            .features
            .iter()
            .map(|f| (f.track_id.as_str(), f))
            .collect();

        self.unified = self
            .tracks
            .iter()
            .filter_map(|track| {
                features_by_id
                    .get(track.track_id.as_str())
                    .map(|features| UnifiedRecord::join(track, features))
            })
            .collect();
        self.reindex();

        write_table(&self.dir.join(TRACKS_FILE), &self.tracks)?;
        write_table(&self.dir.join(AUDIO_FEATURES_FILE), &self.features)?;
        write_table(&self.dir.join(COMBINED_FILE), &self.unified)?;

        debug!("Unified table refreshed with {} records", self.unified.len());
        Ok(())
    }

    fn reindex(&mut self) {
        self.index = self
            .unified
            .iter()
            .enumerate()
            .map(|(i, record)| (record.track_id.clone(), i))
            .collect();
    }
}

/// A persisted CSV table row keyed by track id
pub trait TableRow: Serialize + DeserializeOwned + Clone {
    const HEADER: &'static [&'static str];

    fn track_id(&self) -> &str;
}

impl TableRow for Track {
    const HEADER: &'static [&'static str] = &[
        "track_id",
        "track_name",
        "artist_name",
        "album_name",
        "release_date",
        "popularity",
    ];

    fn track_id(&self) -> &str {
        &self.track_id
    }
}

impl TableRow for AudioFeatures {
    const HEADER: &'static [&'static str] = &[
        "track_id",
        "danceability",
        "energy",
        "key",
        "loudness",
        "mode",
        "speechiness",
        "acousticness",
        "instrumentalness",
        "liveness",
        "valence",
        "tempo",
    ];

    fn track_id(&self) -> &str {
        &self.track_id
    }
}

impl TableRow for UnifiedRecord {
    const HEADER: &'static [&'static str] = &[
        "track_id",
        "track_name",
        "artist_name",
        "album_name",
        "release_date",
        "popularity",
        "danceability",
        "energy",
        "key",
        "loudness",
        "mode",
        "speechiness",
        "acousticness",
        "instrumentalness",
        "liveness",
        "valence",
        "tempo",
    ];

    fn track_id(&self) -> &str {
        &self.track_id
    }
}

fn append_unique<T: TableRow>(existing: &mut Vec<T>, incoming: &[T]) -> usize {
    let mut known: HashSet<String> = existing.iter().map(|r| r.track_id().to_string()).collect();
    let before = existing.len();
    for record in incoming {
        if known.insert(record.track_id().to_string()) {
            existing.push(record.clone());
        }
    }
    existing.len() - before
}

fn dedup_by_id<T: TableRow>(records: &mut Vec<T>) {
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.track_id().to_string()));
}

/// Read a CSV table; a missing file is an empty table
fn read_table<T: TableRow>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        debug!("{} not found, starting with an empty table", path.display());
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if let Some(missing) = T::HEADER.iter().find(|column| !headers.iter().any(|h| h == **column)) {
        return Err(RecommendError::DataIntegrity(format!(
            "{} is missing required column '{}'",
            path.display(),
            missing
        )));
    }

    reader
        .deserialize()
        .enumerate()
        .map(|(row, record)| {
            record.map_err(|e| {
                RecommendError::DataIntegrity(format!(
                    "{} row {}: {}",
                    path.display(),
                    row + 1,
                    e
                ))
            })
        })
        .collect()
}

/// Replace a CSV table atomically: write a sibling temp file, then rename it over the target
fn write_table<T: TableRow>(path: &Path, records: &[T]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(temp.as_file()));
        writer.write_record(T::HEADER)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| RecommendError::Io(e.error))?;
    Ok(())
}
