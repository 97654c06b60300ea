use thiserror::Error;

pub type Result<T> = std::result::Result<T, Tv5Error>;

#[derive(Debug, Error)]
pub enum Tv5Error {
    #[error("Request to {url} failed: {message}")]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Search request failed: {0}")]
    SearchFailed(String),

    #[error("Content not found for query: {query}")]
    NotFound { query: String },

    #[error("Player ID {player_id} not found in search results")]
    PlayerNotFound { player_id: String },

    #[error("Voice ID {voice_id} not found for episode {season}x{episode}")]
    VoiceNotFound {
        voice_id: String,
        season: String,
        episode: String,
    },

    #[error("Episode {season}x{episode} not found")]
    EpisodeNotFound { season: String, episode: String },

    #[error("Quality {quality}p not found")]
    QualityNotFound { quality: u32 },

    #[error("Invalid player data format")]
    InvalidManifest,

    #[error("Invalid video data response")]
    InvalidVideoResponse,

    #[error("TV show description not found")]
    DescriptionMissing,

    #[error("No video segments found")]
    NoSegments,

    #[error("All {attempted} segments failed to download")]
    AllSegmentsFailed { attempted: usize },

    #[error("Cannot create temp directory: {0}")]
    Workspace(String),

    #[error("Video conversion failed: {0}")]
    Mux(String),

    #[error("{0}")]
    MissingParameter(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Tv5Error {
    pub fn transport(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Resolution misses the caller can fix by choosing different parameters.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::PlayerNotFound { .. }
                | Self::VoiceNotFound { .. }
                | Self::EpisodeNotFound { .. }
                | Self::QualityNotFound { .. }
                | Self::MissingParameter(_)
                | Self::InvalidParameter(_)
        )
    }

    /// The upstream site answered with something we no longer understand.
    pub fn is_upstream_shape_change(&self) -> bool {
        matches!(
            self,
            Self::InvalidManifest | Self::InvalidVideoResponse | Self::DescriptionMissing
        )
    }
}
