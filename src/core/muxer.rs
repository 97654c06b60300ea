//! Turning downloaded segments into one file.
//!
//! ffmpeg remuxes the concatenated transport stream into MP4 without
//! re-encoding. Without ffmpeg the segments are appended byte for byte; the
//! result plays in most players but carries no proper seek index.

use crate::core::workspace::{Workspace, CONCAT_LIST, OUTPUT_FILE};
use crate::core::{Result, Tv5Error};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMethod {
    Ffmpeg,
    Concat,
}

/// Whether ffmpeg can be used for this job. Probed once, before assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxerCapability {
    ffmpeg: Option<PathBuf>,
}

impl MuxerCapability {
    /// A configured value may be a path or a bare program name looked up on `PATH`.
    pub fn detect(configured: Option<&Path>) -> Self {
        let ffmpeg = match configured {
            Some(path) => match which::which(path) {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!("Configured ffmpeg {} is not usable: {}", path.display(), e);
                    None
                }
            },
            None => which::which("ffmpeg").ok(),
        };
        debug!("ffmpeg available: {:?}", ffmpeg);
        Self { ffmpeg }
    }

    pub fn unavailable() -> Self {
        Self { ffmpeg: None }
    }

    pub fn is_available(&self) -> bool {
        self.ffmpeg.is_some()
    }

    pub fn ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg.as_deref()
    }
}

pub fn concat_directive(segment_names: &[String]) -> String {
    segment_names
        .iter()
        .map(|name| format!("file '{}'\n", name))
        .collect()
}

/// Remux the workspace's concat list into `output.mp4` with the index at the head.
pub async fn mux(ffmpeg: &Path, workspace: &Workspace) -> Result<()> {
    let output = Command::new(ffmpeg)
        .current_dir(workspace.path())
        .args(["-y", "-f", "concat", "-safe", "0", "-i", CONCAT_LIST])
        .args(["-c", "copy", "-movflags", "+faststart", OUTPUT_FILE])
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
        return Err(Tv5Error::Mux(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        )));
    }
    if !workspace.output().exists() {
        return Err(Tv5Error::Mux("ffmpeg produced no output".to_string()));
    }
    Ok(())
}

/// Append the segments into `output.mp4` in the given order.
pub async fn fallback_concat(workspace: &Workspace, segment_names: &[String]) -> Result<()> {
    let mut out = File::create(workspace.output()).await?;
    for name in segment_names {
        let mut segment = File::open(workspace.path().join(name)).await?;
        tokio::io::copy(&mut segment, &mut out).await?;
    }
    out.flush().await?;
    Ok(())
}

pub async fn assemble(
    capability: &MuxerCapability,
    workspace: &Workspace,
    segment_names: &[String],
    require_muxer: bool,
) -> Result<AssemblyMethod> {
    tokio::fs::write(workspace.concat_list(), concat_directive(segment_names)).await?;

    match capability.ffmpeg() {
        Some(ffmpeg) => match mux(ffmpeg, workspace).await {
            Ok(()) => {
                info!("Remuxed {} segments with ffmpeg", segment_names.len());
                return Ok(AssemblyMethod::Ffmpeg);
            }
            Err(e) if require_muxer => return Err(e),
            Err(e) => warn!("ffmpeg failed, falling back to plain concatenation: {}", e),
        },
        None if require_muxer => {
            return Err(Tv5Error::Mux("ffmpeg is not available".to_string()));
        }
        None => warn!("ffmpeg not found, falling back to plain concatenation"),
    }

    fallback_concat(workspace, segment_names).await?;
    info!("Concatenated {} segments without remuxing", segment_names.len());
    Ok(AssemblyMethod::Concat)
}
