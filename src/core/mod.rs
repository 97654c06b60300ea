pub mod downloader;
pub mod error;
pub mod metadata;
pub mod muxer;
pub mod playlist;
pub mod transport;
pub mod workspace;

pub use downloader::{DownloadRequest, DownloadedVideo, Downloader};
pub use error::{Result, Tv5Error};
pub use metadata::{
    EpisodeVariant, ManifestEntry, MediaSegment, NextEpisode, PlayerManifest, QualityOption,
    SearchHit, SeasonSummary, SeriesSummary, StreamDescriptor, TitleMetadata,
};
pub use muxer::{AssemblyMethod, MuxerCapability};
pub use transport::{HttpTransport, Transport};
pub use workspace::Workspace;
