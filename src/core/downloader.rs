use crate::config::Config;
use crate::core::muxer::{assemble, AssemblyMethod, MuxerCapability};
use crate::core::playlist::parse_media_playlist;
use crate::core::workspace::Workspace;
use crate::core::{MediaSegment, QualityOption, Result, Transport, Tv5Error};
use crate::extractors::Tv5Extractor;
use crate::utils::sanitize_filename;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Which episode, audio track and quality to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub player_id: String,
    pub season: String,
    pub episode: String,
    pub voice_id: String,
    pub quality: u32,
}

impl DownloadRequest {
    pub fn file_name(&self) -> String {
        sanitize_filename(&format!(
            "{}_{}s{}e_{}p.mp4",
            self.player_id, self.season, self.episode, self.quality
        ))
    }
}

pub struct Downloader {
    extractor: Arc<Tv5Extractor>,
    transport: Arc<dyn Transport>,
    pub concurrent_limit: usize,
    temp_parent: Option<PathBuf>,
    ffmpeg_path: Option<PathBuf>,
    require_muxer: bool,
}

/// An assembled video still living in its workspace.
///
/// Dropping it (or the stream returned by [`DownloadedVideo::into_stream`])
/// removes the workspace.
#[derive(Debug)]
pub struct DownloadedVideo {
    workspace: Workspace,
    file_name: String,
    size: u64,
    method: AssemblyMethod,
    segments_total: usize,
    segments_downloaded: usize,
}

impl Downloader {
    pub fn new(extractor: Arc<Tv5Extractor>, transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            extractor,
            transport,
            concurrent_limit: config.concurrent_segments.max(1),
            temp_parent: config.temp_dir.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            require_muxer: config.require_muxer,
        }
    }

    pub async fn select_quality(&self, request: &DownloadRequest) -> Result<QualityOption> {
        self.extractor
            .resolve_qualities(
                &request.player_id,
                &request.season,
                &request.episode,
                &request.voice_id,
            )
            .await?
            .into_iter()
            .find(|q| q.quality == request.quality)
            .ok_or(Tv5Error::QualityNotFound {
                quality: request.quality,
            })
    }

    /// Media playlist URL of the requested quality, for clients that stream
    /// the HLS themselves. Nothing is downloaded.
    pub async fn playlist_url(&self, request: &DownloadRequest) -> Result<String> {
        Ok(self.select_quality(request).await?.url)
    }

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadedVideo> {
        let quality = self.select_quality(request).await?;
        info!("Downloading {} from {}", request.file_name(), quality.url);

        let playlist = self.transport.get_text(&quality.url).await?;
        let segments = parse_media_playlist(&playlist, &quality.url)?;
        if segments.is_empty() {
            return Err(Tv5Error::NoSegments);
        }

        let capability = MuxerCapability::detect(self.ffmpeg_path.as_deref());
        let workspace = Workspace::new(self.temp_parent.as_deref())?;
        debug!("Workspace: {}", workspace.path().display());

        let downloaded = self.fetch_segments(&workspace, &segments).await?;
        info!("Downloaded {}/{} segments", downloaded.len(), segments.len());
        if downloaded.is_empty() {
            return Err(Tv5Error::AllSegmentsFailed {
                attempted: segments.len(),
            });
        }

        let names: Vec<String> = downloaded
            .iter()
            .map(|&index| Workspace::segment_file_name(index))
            .collect();
        let method = assemble(&capability, &workspace, &names, self.require_muxer).await?;
        let size = tokio::fs::metadata(workspace.output()).await?.len();

        Ok(DownloadedVideo {
            workspace,
            file_name: request.file_name(),
            size,
            method,
            segments_total: segments.len(),
            segments_downloaded: downloaded.len(),
        })
    }

    /// Fetch segments concurrently and write each one under its index.
    ///
    /// A segment that fails to download is left out. Returns the indexes that
    /// made it to disk, in playback order.
    async fn fetch_segments(&self, workspace: &Workspace, segments: &[MediaSegment]) -> Result<Vec<usize>> {
        let fetches: Vec<_> = segments
            .iter()
            .map(|segment| self.fetch_segment(workspace, segment))
            .collect();
        let mut indexes: Vec<usize> = futures::stream::iter(fetches)
            .buffer_unordered(self.concurrent_limit)
            .try_filter_map(|index| async move { Ok(index) })
            .try_collect()
            .await?;

        indexes.sort_unstable();
        Ok(indexes)
    }

    async fn fetch_segment(&self, workspace: &Workspace, segment: &MediaSegment) -> Result<Option<usize>> {
        let data = match self.transport.get_bytes(&segment.url).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Segment {} failed: {}", segment.index, e);
                return Ok(None);
            }
        };
        tokio::fs::write(workspace.segment_path(segment.index), &data)
            .await
            .map_err(|e| Tv5Error::Workspace(e.to_string()))?;
        Ok(Some(segment.index))
    }
}

impl DownloadedVideo {
    pub fn path(&self) -> PathBuf {
        self.workspace.output()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn method(&self) -> AssemblyMethod {
        self.method
    }

    pub fn segments_total(&self) -> usize {
        self.segments_total
    }

    pub fn segments_downloaded(&self) -> usize {
        self.segments_downloaded
    }

    /// Copy the video into `dir` and release the workspace.
    pub async fn save_to(self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let destination = dir.join(&self.file_name);
        tokio::fs::copy(self.path(), &destination).await?;
        Ok(destination)
    }

    /// Stream the video. The workspace lives until the stream is dropped.
    pub async fn into_stream(
        self,
    ) -> Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
        let file = tokio::fs::File::open(self.path()).await?;
        let workspace = self.workspace;
        Ok(ReaderStream::new(file).map(move |chunk| {
            let _keep = &workspace;
            chunk
        }))
    }
}
