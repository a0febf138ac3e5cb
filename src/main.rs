use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coverstash::config::ArtworkConfig;
use coverstash::images::{Artwork, ArtworkKind, ArtworkLookup, ArtworkRequest, ArtworkService};
use coverstash::models::{Album, Artist, Track};

/// Artwork cache for music library clients
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how many entries and bytes each cache holds
    Stats,
    /// Look up cached artwork without touching the network
    Lookup {
        #[command(subcommand)]
        target: Target,
    },
    /// Resolve artwork, downloading it if nothing is cached
    Fetch {
        #[command(subcommand)]
        target: Target,
    },
    /// Remove the cached entry and file for one album or artist
    Forget {
        #[command(subcommand)]
        target: Target,
    },
    /// Drop recorded misses so they are fetched again
    ClearNegative {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// Drop every entry and image of a kind
    ClearAll {
        #[arg(value_enum)]
        kind: KindArg,
    },
}

#[derive(Subcommand)]
enum Target {
    Album {
        name: String,
        #[arg(long)]
        artist: Option<String>,
        /// MusicBrainz release id
        #[arg(long)]
        mbid: Option<String>,
    },
    Artist {
        name: String,
        /// MusicBrainz artist id; repeat for artists with several
        #[arg(long = "mbid")]
        mbids: Vec<String>,
    },
    Track {
        /// Path of the track on the music server
        path: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        album: Option<String>,
        #[arg(long)]
        album_artist: Option<String>,
        #[arg(long)]
        album_mbid: Option<String>,
    },
}

impl Target {
    fn to_request(&self) -> ArtworkRequest {
        match self {
            Target::Album { name, artist, mbid } => {
                let mut album = Album::new(name.clone(), artist.clone().unwrap_or_default());
                if let Some(mbid) = mbid {
                    album = album.with_mbid(mbid.clone());
                }
                ArtworkRequest::album(&album)
            }
            Target::Artist { name, mbids } => {
                let artist = mbids
                    .iter()
                    .fold(Artist::new(name.clone()), |artist, mbid| {
                        artist.with_mbid(mbid.clone())
                    });
                ArtworkRequest::artist(&artist)
            }
            Target::Track {
                path,
                title,
                album,
                album_artist,
                album_mbid,
            } => {
                let mut track = Track::new(title.clone(), path.clone());
                if let Some(album) = album {
                    track = track.with_album(album.clone());
                }
                if let Some(album_artist) = album_artist {
                    track = track.with_album_artist(album_artist.clone());
                }
                if let Some(mbid) = album_mbid {
                    track = track.with_album_mbid(mbid.clone());
                }
                ArtworkRequest::track(&track)
            }
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Album,
    Artist,
}

impl From<KindArg> for ArtworkKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Album => ArtworkKind::Album,
            KindArg::Artist => ArtworkKind::Artist,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coverstash=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables if .env exists
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = ArtworkConfig::from_env().context("Invalid configuration")?;

    tracing::debug!("Using artwork database at {}", config.database_path.display());

    let service = ArtworkService::from_config(&config).with_context(|| {
        format!(
            "Failed to open artwork cache at {}",
            config.database_path.display()
        )
    })?;

    match cli.command {
        Commands::Stats => {
            for kind in ArtworkKind::ALL {
                let stats = service.index().stats(kind)?;
                let bytes = service.index().files().size_bytes(kind);
                println!(
                    "{:<7} {:>6} cached  {:>6} missing  {:>10} bytes",
                    kind.as_str(),
                    stats.found,
                    stats.not_found,
                    bytes
                );
            }
        }
        Commands::Lookup { target } => {
            let request = target.to_request();
            match service.index().lookup(&request) {
                ArtworkLookup::Found(path) => println!("{}", path.display()),
                ArtworkLookup::NotFound => println!("not found (recorded)"),
                ArtworkLookup::Absent => println!("absent"),
            }
            if let Some(entry) = service.index().entry(&request)? {
                let fetched_at = chrono::DateTime::from_timestamp(entry.fetched_at, 0)
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default();
                println!("{}", serde_json::to_string_pretty(&entry)?);
                println!("fetched at {}", fetched_at);
            }
        }
        Commands::Fetch { target } => {
            let request = target.to_request();
            match service.get_artwork(&request).await {
                Some(Artwork::File(path)) => println!("{}", path.display()),
                Some(Artwork::Bytes(bytes)) => {
                    // Wait for the background write so the path is known
                    while service.fetcher().in_flight() > 0 {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    }
                    match service.index().lookup(&request) {
                        ArtworkLookup::Found(path) => println!("{}", path.display()),
                        _ => println!("downloaded {} bytes, not cached", bytes.len()),
                    }
                }
                None => println!("no artwork available"),
            }
        }
        Commands::Forget { target } => {
            if service.index().remove_one(&target.to_request())? {
                println!("removed");
            } else {
                println!("nothing cached");
            }
        }
        Commands::ClearNegative { kind } => {
            let removed = service.index().clear_negative(kind.into())?;
            println!("cleared {} recorded misses", removed);
        }
        Commands::ClearAll { kind } => {
            let removed = service.index().clear_all(kind.into())?;
            println!("cleared {} entries", removed);
        }
    }

    Ok(())
}
