use crate::config::Config;
use crate::core::{DownloadRequest, Downloader, HttpTransport, Transport};
use crate::extractors::Tv5Extractor;
use crate::server;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "tv5-dl")]
#[command(about = "Search TV5 series and download episodes from their HLS streams")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Search the catalog
    Search { query: String },

    /// Show title, cover and description of a series
    Show {
        query: String,
        /// Pick this player ID among the search results instead of the first hit
        #[arg(short, long)]
        player_id: Option<String>,
    },

    /// Dump the raw episode map of a player
    Player { player_id: String },

    /// List seasons, episodes and voices of a player
    Series { player_id: String },

    /// List the voices available for one episode
    Episode {
        player_id: String,
        season: String,
        episode: String,
    },

    /// Find the episode after the given one
    Next {
        player_id: String,
        season: String,
        episode: String,
    },

    /// List the qualities of one episode and voice
    Qualities(EpisodeArgs),

    /// Download an episode into a single MP4 file
    Download {
        #[command(flatten)]
        episode: EpisodeArgs,

        /// Quality to download, e.g. 720
        #[arg(short, long)]
        quality: u32,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Print the media playlist URL of an episode without downloading it
    Playlist {
        #[command(flatten)]
        episode: EpisodeArgs,

        #[arg(short, long)]
        quality: u32,
    },

    /// Serve the JSON API
    Serve {
        /// Address to listen on, overrides the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[derive(Args)]
pub struct EpisodeArgs {
    pub player_id: String,
    pub season: String,
    pub episode: String,
    pub voice_id: String,
}

impl EpisodeArgs {
    fn request(&self, quality: u32) -> DownloadRequest {
        DownloadRequest {
            player_id: self.player_id.clone(),
            season: self.season.clone(),
            episode: self.episode.clone(),
            voice_id: self.voice_id.clone(),
            quality,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let mut config = Config::load(self.config.as_deref())?;

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
        let extractor = Arc::new(Tv5Extractor::new(transport.clone(), &config)?);
        let downloader = Downloader::new(extractor.clone(), transport, &config);

        match &self.command {
            Command::Search { query } => print_json(&extractor.search(query).await?)?,
            Command::Show { query, player_id } => {
                print_json(&extractor.resolve_title(query, player_id.as_deref()).await?)?
            }
            Command::Player { player_id } => {
                print_json(extractor.fetch_player_manifest(player_id).await?.raw())?
            }
            Command::Series { player_id } => {
                print_json(&extractor.series_summary(player_id).await?)?
            }
            Command::Episode {
                player_id,
                season,
                episode,
            } => print_json(&extractor.episode_variants(player_id, season, episode).await?)?,
            Command::Next {
                player_id,
                season,
                episode,
            } => print_json(&extractor.next_episode(player_id, season, episode).await?)?,
            Command::Qualities(args) => print_json(
                &extractor
                    .resolve_qualities(&args.player_id, &args.season, &args.episode, &args.voice_id)
                    .await?,
            )?,
            Command::Download {
                episode,
                quality,
                output,
            } => {
                let request = episode.request(*quality);
                let video = downloader.download(&request).await?;
                info!(
                    "Assembled {} of {} segments ({:?}, {} bytes)",
                    video.segments_downloaded(),
                    video.segments_total(),
                    video.method(),
                    video.size()
                );
                let path = video.save_to(output).await?;
                println!("{}", path.display());
            }
            Command::Playlist { episode, quality } => {
                println!("{}", downloader.playlist_url(&episode.request(*quality)).await?);
            }
            Command::Serve { bind } => {
                if let Some(bind) = bind {
                    config.bind = bind.clone();
                }
                server::serve(&config).await?;
            }
        }

        Ok(())
    }
}
