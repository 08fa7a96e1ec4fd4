use crate::config::Config;
use crate::error::{RecommendError, Result};
use crate::models::{
    ApiAudioFeatures, ApiTrack, AudioFeatures, AudioFeaturesResponse, SearchResponse,
    TokenResponse, Track, TrackList,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;
use ureq::Agent;
use urlencoding::encode;

/// The audio-features endpoint accepts at most this many ids per request
pub const MAX_AUDIO_FEATURE_IDS: usize = 100;

/// Seed identifiers that bias the external recommendation endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seeds {
    pub tracks: Vec<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
}

impl Seeds {
    pub fn from_track(track_id: &str) -> Self {
        Seeds {
            tracks: vec![track_id.to_string()],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.artists.is_empty() && self.genres.is_empty()
    }
}

/// Everything the recommender needs from the external music catalog
#[cfg_attr(test, mockall::automock)]
pub trait CatalogGateway {
    /// Metadata for a single track
    fn fetch_metadata(&self, track_id: &str) -> Result<Track>;

    /// Audio features for the given tracks; ids unknown to the catalog are skipped
    fn fetch_audio_features(&self, track_ids: &[String]) -> Result<Vec<AudioFeatures>>;

    /// Seeded recommendations. Failures are logged and yield an empty list.
    fn fetch_recommendations(&self, seeds: &Seeds, limit: u32) -> Vec<Track>;

    fn search_track_by_name(&self, name: &str) -> Result<Option<String>>;

    fn search_artist_by_name(&self, name: &str) -> Result<Option<String>>;

    /// Top tracks of an artist, most popular first
    fn top_tracks_of_artist(&self, artist_id: &str) -> Result<Vec<Track>>;

    /// Free-text track search, used to bootstrap the local dataset
    fn search_tracks(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<Track>>;
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// A blocking Spotify Web API client using the client-credentials flow
pub struct SpotifyClient {
    agent: Agent,
    api_url: String,
    auth_url: String,
    market: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// Create a new client with configuration from environment
    pub fn new(config: Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        SpotifyClient {
            agent,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url,
            market: config.market,
            client_id: config.client_id,
            client_secret: config.client_secret,
            token: Mutex::new(None),
        }
    }

    /// Return a valid access token, requesting a new one when the cached token is about to expire
    fn access_token(&self) -> Result<String> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| RecommendError::ExternalService("token cache poisoned".to_string()))?;

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .agent
            .post(&self.auth_url)
            .set("Authorization", &format!("Basic {credentials}"))
            .send_form(&[("grant_type", "client_credentials")])
            .map_err(|e| describe_error("Token request", e))?;

        let token: TokenResponse = response.into_json().map_err(|e| {
            RecommendError::ExternalService(format!("Failed to parse token response: {e}"))
        })?;

        debug!("Obtained access token valid for {}s", token.expires_in);

        // Treat the token as expired a minute before the server does
        let expires_at = Utc::now() + ChronoDuration::seconds((token.expires_in - 60).max(0));
        let access_token = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });

        Ok(access_token)
    }

    /// Authenticated GET against the API, decoding the JSON body
    fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let token = self.access_token()?;
        let url = format!("{}{}", self.api_url, path_and_query);
        debug!("GET {url}");

        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {token}"))
            .call()
            .map_err(|e| describe_error("HTTP request", e))?;

        response.into_json().map_err(|e| {
            RecommendError::ExternalService(format!("Failed to parse JSON response: {e}"))
        })
    }

    fn search(&self, query: &str, kind: &str, limit: u32, offset: u32) -> Result<SearchResponse> {
        self.get_json(&format!(
            "/search?q={}&type={}&limit={}&offset={}",
            encode(query),
            kind,
            limit,
            offset
        ))
    }

    fn try_fetch_recommendations(&self, seeds: &Seeds, limit: u32) -> Result<Vec<Track>> {
        let mut path = format!("/recommendations?limit={limit}");
        for (name, values) in [
            ("seed_tracks", &seeds.tracks),
            ("seed_artists", &seeds.artists),
            ("seed_genres", &seeds.genres),
        ] {
            if !values.is_empty() {
                path.push_str(&format!("&{}={}", name, encode(&values.join(","))));
            }
        }

        let list: TrackList = self.get_json(&path)?;
        Ok(list.tracks.into_iter().map(Track::from).collect())
    }
}

impl CatalogGateway for SpotifyClient {
    fn fetch_metadata(&self, track_id: &str) -> Result<Track> {
        let track: ApiTrack = self.get_json(&format!("/tracks/{}", encode(track_id)))?;
        Ok(track.into())
    }

    fn fetch_audio_features(&self, track_ids: &[String]) -> Result<Vec<AudioFeatures>> {
        fetch_in_chunks(track_ids, |chunk| {
            let response: AudioFeaturesResponse =
                self.get_json(&format!("/audio-features?ids={}", encode(&chunk.join(","))))?;
            Ok(response.audio_features)
        })
    }

    fn fetch_recommendations(&self, seeds: &Seeds, limit: u32) -> Vec<Track> {
        if seeds.is_empty() {
            warn!("Skipping external recommendations: no seeds supplied");
            return Vec::new();
        }

        match self.try_fetch_recommendations(seeds, limit) {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Error fetching external recommendations: {e}");
                Vec::new()
            }
        }
    }

    fn search_track_by_name(&self, name: &str) -> Result<Option<String>> {
        let response = self.search(&format!("track:{name}"), "track", 1, 0)?;
        Ok(response
            .tracks
            .and_then(|page| page.items.into_iter().next())
            .map(|track| track.id))
    }

    fn search_artist_by_name(&self, name: &str) -> Result<Option<String>> {
        let response = self.search(&format!("artist:{name}"), "artist", 1, 0)?;
        Ok(response
            .artists
            .and_then(|page| page.items.into_iter().next())
            .and_then(|artist| artist.id))
    }

    fn top_tracks_of_artist(&self, artist_id: &str) -> Result<Vec<Track>> {
        let list: TrackList = self.get_json(&format!(
            "/artists/{}/top-tracks?market={}",
            encode(artist_id),
            encode(&self.market)
        ))?;
        Ok(list.tracks.into_iter().map(Track::from).collect())
    }

    fn search_tracks(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<Track>> {
        let response = self.search(query, "track", limit, offset)?;
        Ok(response
            .tracks
            .map(|page| page.items.into_iter().map(Track::from).collect())
            .unwrap_or_default())
    }
}

/// Run `fetch_chunk` over slices of at most `MAX_AUDIO_FEATURE_IDS` ids, in order.
/// Null entries (ids the catalog does not know) are dropped.
fn fetch_in_chunks<F>(track_ids: &[String], mut fetch_chunk: F) -> Result<Vec<AudioFeatures>>
where
    F: FnMut(&[String]) -> Result<Vec<Option<ApiAudioFeatures>>>,
{
    let mut all_features = Vec::with_capacity(track_ids.len());

    for chunk in track_ids.chunks(MAX_AUDIO_FEATURE_IDS) {
        let before = all_features.len();
        all_features.extend(
            fetch_chunk(chunk)?
                .into_iter()
                .flatten()
                .map(AudioFeatures::from),
        );
        debug!(
            "Fetched audio features for {}/{} tracks",
            all_features.len() - before,
            chunk.len()
        );
    }

    Ok(all_features)
}

fn describe_error(context: &str, error: ureq::Error) -> RecommendError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            RecommendError::ExternalService(format!("{context} failed with HTTP {code}: {body}"))
        }
        ureq::Error::Transport(transport) => {
            RecommendError::ExternalService(format!("{context} failed: {transport}"))
        }
    }
}
