use crate::client::CatalogGateway;
use crate::error::Result;
use crate::models::Track;
use crate::store::FeatureStore;
use log::{info, warn};
use std::collections::HashSet;

/// Outcome of a catalog collection run
#[derive(Debug, Default, PartialEq)]
pub struct CollectionReport {
    pub batches_failed: usize,
    pub tracks_seen: usize,
    pub tracks_added: usize,
}

/// Page through a catalog search and store every track found, with its audio features.
/// A failing batch is logged and skipped.
pub fn collect_catalog(
    store: &mut FeatureStore,
    gateway: &dyn CatalogGateway,
    query: &str,
    batches: u32,
    batch_size: u32,
) -> Result<CollectionReport> {
    let mut report = CollectionReport::default();
    let mut seen_ids = HashSet::new();
    let mut collected: Vec<Track> = Vec::new();

    for batch in 0..batches {
        match gateway.search_tracks(query, batch_size, batch.saturating_mul(batch_size)) {
            Ok(tracks) => {
                let fetched = tracks.len();
                collected.extend(
                    tracks
                        .into_iter()
                        .filter(|t| seen_ids.insert(t.track_id.clone())),
                );
                info!(
                    "Batch {}: got {} tracks (total unique: {})",
                    batch + 1,
                    fetched,
                    collected.len()
                );
                if fetched < batch_size as usize {
                    info!("Search results exhausted after {} batches", batch + 1);
                    break;
                }
            }
            Err(e) => {
                warn!("Error on batch {}: {e}", batch + 1);
                report.batches_failed += 1;
            }
        }
    }

    report.tracks_seen = collected.len();
    report.tracks_added = store.ensure_tracks(&collected, gateway)?;
    info!(
        "Collection complete: {} tracks seen, {} added to the dataset",
        report.tracks_seen, report.tracks_added
    );
    Ok(report)
}
