use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};

mod client;
mod collect;
mod config;
mod error;
mod models;
mod recommend;
mod store;


use crate::client::SpotifyClient;
use crate::collect::collect_catalog;
use crate::config::load_config;
use crate::error::RecommendError;
use crate::models::FeatureColumn;
use crate::recommend::{ClusterIndex, EngineConfig, HybridEngine, QueryKind};
use crate::store::FeatureStore;

#[derive(Parser)]
#[command(name = "track-recommender")]
#[command(about = "Hybrid track recommender over a local audio-feature dataset and Spotify")]
#[command(version)]
struct Args {
    /// Directory holding tracks.csv, audio_features.csv and combined.csv
    #[arg(long = "data-dir", env = "DATA_DIR", default_value = "data", global = true)]
    data_dir: String,

    /// Verbose mode - log every signal and store update
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Quiet mode - only log warnings and errors
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recommend tracks similar to a track or to an artist's top track
    Recommend {
        /// Track name, or artist name with --artist
        text: String,

        /// Treat the input as an artist name
        #[arg(short = 'a', long = "artist")]
        artist: bool,

        /// Number of cluster peers
        #[arg(long = "cluster")]
        cluster: Option<usize>,

        /// Number of collaborative neighbours
        #[arg(long = "collab")]
        collab: Option<usize>,

        /// Number of external recommendations
        #[arg(long = "external")]
        external: Option<usize>,

        /// Audio features to cluster on, comma separated
        #[arg(long = "features", value_delimiter = ',')]
        features: Vec<FeatureColumn>,

        /// Path to an engine configuration JSON file
        #[arg(short = 'c', long = "engine-config")]
        engine_config: Option<String>,

        /// Print the recommendations as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Grow the dataset from a catalog search
    Collect {
        #[arg(long = "query", default_value = "Japanese Pop")]
        query: String,

        #[arg(long = "batches", default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=1000))]
        batches: u32,

        /// Tracks per search request (the search endpoint caps this at 50)
        #[arg(long = "batch-size", default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=50))]
        batch_size: u32,
    },

    /// Summarize the unified dataset and its clustering
    Stats {
        #[arg(long = "features", value_delimiter = ',')]
        features: Vec<FeatureColumn>,

        #[arg(short = 'c', long = "engine-config")]
        engine_config: Option<String>,
    },
}

fn main() -> Result<()> {
    // DATA_DIR may come from `.env` as well
    dotenv::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let store = FeatureStore::open(&args.data_dir)
        .with_context(|| format!("Failed to load the dataset from '{}'", args.data_dir))?;

    match args.command {
        Command::Recommend {
            text,
            artist,
            cluster,
            collab,
            external,
            features,
            engine_config,
            json,
        } => {
            let mut engine_config = load_engine_config(engine_config.as_deref(), features)?;
            if let Some(n) = cluster {
                engine_config.n_cluster_recs = n;
            }
            if let Some(n) = collab {
                engine_config.n_collab_recs = n;
            }
            if let Some(n) = external {
                engine_config.n_external_recs = n;
            }
            engine_config.validate()?;

            let kind = if artist {
                QueryKind::Artist
            } else {
                QueryKind::Track
            };
            run_recommend(store, engine_config, &text, kind, json)
        }
        Command::Collect {
            query,
            batches,
            batch_size,
        } => run_collect(store, &query, batches, batch_size),
        Command::Stats {
            features,
            engine_config,
        } => {
            let engine_config = load_engine_config(engine_config.as_deref(), features)?;
            run_stats(&store, &engine_config)
        }
    }
}

fn load_engine_config(path: Option<&str>, features: Vec<FeatureColumn>) -> Result<EngineConfig> {
    let mut engine_config = match path {
        Some(path) => {
            info!("Loading engine configuration from: {path}");
            EngineConfig::load_from_file(path)?
        }
        None => EngineConfig::default(),
    };
    if !features.is_empty() {
        engine_config.cluster_features = features;
    }
    Ok(engine_config)
}

fn run_recommend(
    store: FeatureStore,
    engine_config: EngineConfig,
    text: &str,
    kind: QueryKind,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let client = SpotifyClient::new(config);

    let mut engine = HybridEngine::new(engine_config, store, Box::new(client));

    match engine.recommend(text, kind) {
        Ok(outcome) if json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Ok(outcome) => {
            println!("\n=== RECOMMENDATIONS ===");
            println!("{}", outcome.to_string().trim_end());
            Ok(())
        }
        // Nothing matched the query; tell the user, the run itself succeeded
        Err(RecommendError::NotFound(message)) => {
            println!("{message}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn run_collect(mut store: FeatureStore, query: &str, batches: u32, batch_size: u32) -> Result<()> {
    let config = load_config()?;
    let client = SpotifyClient::new(config);

    println!("Collecting up to {} tracks for query '{query}'...", batches.saturating_mul(batch_size));
    let before = store.unified().len();
    let report = collect_catalog(&mut store, &client, query, batches, batch_size)?;

    println!("\n=== COLLECTION SUMMARY ===");
    println!("Tracks found:     {}", report.tracks_seen);
    println!("Tracks added:     {}", report.tracks_added);
    println!("Failed batches:   {}/{batches}", report.batches_failed);
    println!("Dataset size:     {} (was {before})", store.unified().len());
    Ok(())
}

fn run_stats(store: &FeatureStore, engine_config: &EngineConfig) -> Result<()> {
    let records = store.unified();

    println!("=== DATASET SUMMARY ===");
    println!("Data directory:   {}", store.dir().display());
    println!("Track metadata:   {}", store.tracks().len());
    println!("Audio features:   {}", store.audio_features().len());
    println!("Unified tracks:   {}", records.len());

    let index = ClusterIndex::build(
        records,
        &engine_config.cluster_features,
        engine_config.max_clusters,
        engine_config.cluster_seed,
    )?;

    println!("\nFeature statistics:");
    println!(
        "   {:<16} {:>10} {:>10} {:>10} {:>10} {:>8}",
        "feature", "mean", "std", "min", "max", "missing"
    );
    for stat in index.feature_stats() {
        println!(
            "   {:<16} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>8}",
            stat.column,
            stat.mean,
            stat.std_dev,
            stat.min,
            stat.max,
            stat.missing
        );
    }

    if index.is_empty() {
        println!("\nNo tracks to cluster.");
        return Ok(());
    }

    println!("\nCluster sizes:");
    for (label, size) in index.cluster_sizes().iter().enumerate() {
        println!("   Cluster {label}: {size} tracks");
    }
    Ok(())
}
