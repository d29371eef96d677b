use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackmatch::catalog::{build_catalog, optimize_database, CatalogEntry, CatalogProvider};
use trackmatch::progress::{create_progress_bar, format_duration, log_progress, set_log_only};
use trackmatch::safety::validate_output_path;
use trackmatch::scoring::get_filter_validation_errors;
use trackmatch::{
    expression_to_ui, migrate_legacy_filter, MatchFilter, Provider, SearchConfig, SearchSession,
    WantedTrack,
};

#[derive(Parser)]
#[command(name = "trackmatch")]
#[command(about = "Match wanted songs against a music library")]
struct Args {
    /// Hide progress bars and log progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a searchable catalog database from a JSON array of tracks
    Index {
        source: PathBuf,

        output: PathBuf,

        /// Run a test search against the new catalog
        #[arg(long)]
        test: Option<String>,
    },

    /// Search a JSON array of wanted tracks and print the responses
    Search {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        tracks: PathBuf,
    },

    /// Search one track and print candidates with their comparison matrices
    Analyze {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Artist name; repeat for alternative spellings
        #[arg(long = "artist", required = true)]
        artists: Vec<String>,

        #[arg(long)]
        title: String,

        #[arg(long)]
        album: Option<String>,
    },

    /// Check a match filter expression
    Validate {
        expression: String,

        /// Print the editor form of a valid expression
        #[arg(long)]
        ui: bool,
    },

    /// Convert a legacy match filter into expression syntax
    Migrate { filter: String },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::load(path).context("Failed to load search config"),
        None => Ok(SearchConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

async fn run_index(source: &Path, output: &Path, test: Option<&str>) -> Result<()> {
    validate_output_path(output, "catalog", &[source])?;
    let start = Instant::now();

    info!("Reading catalog entries: {:?}", source);
    let entries: Vec<CatalogEntry> = read_json(source)?;

    if output.exists() {
        std::fs::remove_file(output).context("Failed to remove existing output file")?;
    }

    info!("Creating catalog database: {:?}", output);
    let mut conn = Connection::open(output).context("Failed to create catalog database")?;
    let written = build_catalog(&mut conn, &entries)?;
    optimize_database(&conn)?;

    let file_size = std::fs::metadata(output)?.len();
    info!(
        tracks = written,
        skipped = entries.len() - written,
        size_mb = %format!("{:.2}", file_size as f64 / 1_048_576.0),
        elapsed = %format_duration(start.elapsed()),
        "Catalog complete"
    );

    if let Some(query) = test {
        let provider = CatalogProvider::new(conn);
        let tracks = provider.search_by_text(query, 10).await?;
        println!("\nSearch results for '{}':", query);
        println!("{:-<80}", "");
        for track in &tracks {
            println!(
                "[{}] {} - {} ({})",
                track.id,
                track.artist_title,
                track.title,
                track.album_title.as_deref().unwrap_or("Unknown")
            );
        }
        if tracks.is_empty() {
            println!("No results found.");
        }
    }

    Ok(())
}

async fn run_search(catalog: &Path, config: Option<&Path>, tracks_path: &Path) -> Result<()> {
    let config = load_config(config)?;
    let provider = CatalogProvider::open(catalog).context("Failed to open catalog")?;
    let tracks: Vec<WantedTrack> = read_json(tracks_path)?;
    let start = Instant::now();

    let total = tracks.len() as u64;
    let pb = create_progress_bar(total, "Searching");
    let mut done = 0u64;
    let mut found = 0usize;

    let mut session = SearchSession::new(&config, &provider);
    let responses = session
        .search_with(&tracks, |response| {
            done += 1;
            if response.is_found() {
                found += 1;
            }
            pb.inc(1);
            log_progress("search", done, total, 100);
        })
        .await;
    pb.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&responses)?);
    info!(
        tracks = responses.len(),
        found,
        elapsed = %format_duration(start.elapsed()),
        "Search complete"
    );
    Ok(())
}

async fn run_analyze(
    catalog: &Path,
    config: Option<&Path>,
    artists: Vec<String>,
    title: String,
    album: Option<String>,
) -> Result<()> {
    let config = load_config(config)?;
    let provider = CatalogProvider::open(catalog).context("Failed to open catalog")?;

    let mut track = WantedTrack::new("cli", artists, title);
    track.album = album;

    let response = trackmatch::analyze(&config, &provider, &track).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_validate(expression: &str, ui: bool) -> Result<()> {
    let errors = get_filter_validation_errors(&MatchFilter::new(expression));
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("  {}", error);
        }
        bail!("Invalid match filter: {}", expression);
    }

    if ui {
        let items = expression_to_ui(expression).map_err(|e| anyhow::anyhow!(e.join("; ")))?;
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        println!("valid");
    }
    Ok(())
}

fn run_migrate(filter: &str) -> Result<()> {
    match migrate_legacy_filter(filter) {
        Some(migrated) => {
            println!("{}", migrated);
            Ok(())
        }
        None => bail!("Not a recognized legacy filter: {}", filter),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    set_log_only(args.log_only);

    match args.command {
        Command::Index { source, output, test } => run_index(&source, &output, test.as_deref()).await,
        Command::Search {
            catalog,
            config,
            tracks,
        } => run_search(&catalog, config.as_deref(), &tracks).await,
        Command::Analyze {
            catalog,
            config,
            artists,
            title,
            album,
        } => run_analyze(&catalog, config.as_deref(), artists, title, album).await,
        Command::Validate { expression, ui } => run_validate(&expression, ui),
        Command::Migrate { filter } => run_migrate(&filter),
    }
}
