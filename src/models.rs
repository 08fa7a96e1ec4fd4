use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Track metadata as stored in the metadata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub release_date: String, // year, year-month or full date depending on the catalog's precision
    pub popularity: u32,
}

/// Audio features for one track, as reported by the audio-analysis endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub track_id: String,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i32>,
    pub loudness: Option<f64>,
    pub mode: Option<i32>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
}

/// Joined metadata + audio-feature row; the working dataset for recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub release_date: String,
    pub popularity: u32,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i32>,
    pub loudness: Option<f64>,
    pub mode: Option<i32>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
}

impl UnifiedRecord {
    /// Join a metadata row with its audio features. The name always comes from the metadata.
    pub fn join(track: &Track, features: &AudioFeatures) -> Self {
        UnifiedRecord {
            track_id: track.track_id.clone(),
            track_name: track.track_name.clone(),
            artist_name: track.artist_name.clone(),
            album_name: track.album_name.clone(),
            release_date: track.release_date.clone(),
            popularity: track.popularity,
            danceability: features.danceability,
            energy: features.energy,
            key: features.key,
            loudness: features.loudness,
            mode: features.mode,
            speechiness: features.speechiness,
            acousticness: features.acousticness,
            instrumentalness: features.instrumentalness,
            liveness: features.liveness,
            valence: features.valence,
            tempo: features.tempo,
        }
    }

    /// Value of a feature column, treating NaN as missing
    pub fn feature(&self, column: FeatureColumn) -> Option<f64> {
        let value = match column {
            FeatureColumn::Danceability => self.danceability,
            FeatureColumn::Energy => self.energy,
            FeatureColumn::Key => self.key.map(f64::from),
            FeatureColumn::Loudness => self.loudness,
            FeatureColumn::Mode => self.mode.map(f64::from),
            FeatureColumn::Speechiness => self.speechiness,
            FeatureColumn::Acousticness => self.acousticness,
            FeatureColumn::Instrumentalness => self.instrumentalness,
            FeatureColumn::Liveness => self.liveness,
            FeatureColumn::Valence => self.valence,
            FeatureColumn::Tempo => self.tempo,
        };
        value.filter(|v| !v.is_nan())
    }
}

/// Audio-feature columns usable for clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureColumn {
    Danceability,
    Energy,
    Key,
    Loudness,
    Mode,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 11] = [
        FeatureColumn::Danceability,
        FeatureColumn::Energy,
        FeatureColumn::Key,
        FeatureColumn::Loudness,
        FeatureColumn::Mode,
        FeatureColumn::Speechiness,
        FeatureColumn::Acousticness,
        FeatureColumn::Instrumentalness,
        FeatureColumn::Liveness,
        FeatureColumn::Valence,
        FeatureColumn::Tempo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Danceability => "danceability",
            FeatureColumn::Energy => "energy",
            FeatureColumn::Key => "key",
            FeatureColumn::Loudness => "loudness",
            FeatureColumn::Mode => "mode",
            FeatureColumn::Speechiness => "speechiness",
            FeatureColumn::Acousticness => "acousticness",
            FeatureColumn::Instrumentalness => "instrumentalness",
            FeatureColumn::Liveness => "liveness",
            FeatureColumn::Valence => "valence",
            FeatureColumn::Tempo => "tempo",
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for FeatureColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FeatureColumn::ALL
            .iter()
            .copied()
            .find(|column| column.name() == wanted)
            .ok_or_else(|| format!("unknown audio feature column '{s}'"))
    }
}

/// Response structure for the client-credentials token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Track object as returned by search, top-tracks, track and recommendation endpoints
#[derive(Debug, Deserialize)]
pub struct ApiTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    pub album: Option<ApiAlbum>,
}

#[derive(Debug, Deserialize)]
pub struct ApiArtist {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiAlbum {
    pub name: String,
    #[serde(default)]
    pub release_date: String,
}

impl From<ApiTrack> for Track {
    fn from(track: ApiTrack) -> Self {
        let artist_name = track
            .artists
            .into_iter()
            .next()
            .map(|artist| artist.name)
            .unwrap_or_else(|| "Unknown".to_string());
        let (album_name, release_date) = match track.album {
            Some(album) => (album.name, album.release_date),
            None => ("Unknown".to_string(), String::new()),
        };

        Track {
            track_id: track.id,
            track_name: track.name,
            artist_name,
            album_name,
            release_date,
            popularity: track.popularity,
        }
    }
}

/// Response structure for the search endpoint
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Paging<ApiTrack>>,
    pub artists: Option<Paging<ApiArtist>>,
}

#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
}

/// Response structure for artist top tracks and recommendations
#[derive(Debug, Deserialize)]
pub struct TrackList {
    pub tracks: Vec<ApiTrack>,
}

/// Response structure for the batched audio-features endpoint
#[derive(Debug, Deserialize)]
pub struct AudioFeaturesResponse {
    // Unknown ids come back as null entries
    pub audio_features: Vec<Option<ApiAudioFeatures>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiAudioFeatures {
    pub id: String,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i32>,
    pub loudness: Option<f64>,
    pub mode: Option<i32>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
}

impl From<ApiAudioFeatures> for AudioFeatures {
    fn from(features: ApiAudioFeatures) -> Self {
        AudioFeatures {
            track_id: features.id,
            danceability: features.danceability,
            energy: features.energy,
            key: features.key,
            loudness: features.loudness,
            mode: features.mode,
            speechiness: features.speechiness,
            acousticness: features.acousticness,
            instrumentalness: features.instrumentalness,
            liveness: features.liveness,
            valence: features.valence,
            tempo: features.tempo,
        }
    }
}
