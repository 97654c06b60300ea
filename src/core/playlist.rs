//! HLS playlist parsing.
//!
//! Only the subset the player CDN serves is understood: a master playlist of
//! `#EXT-X-STREAM-INF` variants and flat media playlists of segment URIs.

use crate::core::{MediaSegment, QualityOption, Result};
use std::collections::HashSet;
use tracing::warn;
use url::Url;

const STREAM_INF: &str = "#EXT-X-STREAM-INF";

/// A variant stream listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStream {
    pub url: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<String>,
}

impl VariantStream {
    /// Quality tier taken from the first run of digits in the parent
    /// directory of the variant URL (`.../720/index.m3u8` is 720).
    pub fn quality(&self) -> Option<u32> {
        let url = Url::parse(&self.url).ok()?;
        let segments: Vec<&str> = url.path_segments()?.collect();
        if segments.len() < 2 {
            return None;
        }
        first_number(segments[segments.len() - 2])
    }
}

/// Resolve a playlist line against the playlist URL.
///
/// Absolute URLs are kept, `/path` resolves against the origin and anything
/// else against the playlist's directory.
pub fn resolve_url(base: &str, line: &str) -> Result<String> {
    if let Ok(absolute) = Url::parse(line) {
        return Ok(absolute.to_string());
    }
    let base = Url::parse(base)?;
    Ok(base.join(line)?.to_string())
}

pub fn parse_variants(text: &str, master_url: &str) -> Result<Vec<VariantStream>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut variants = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.contains(STREAM_INF) {
            continue;
        }
        let Some(next) = lines.get(i + 1).map(|l| l.trim()) else {
            continue;
        };
        if next.is_empty() || next.starts_with('#') {
            continue;
        }

        let url = match resolve_url(master_url, next) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping variant {}: {}", next, e);
                continue;
            }
        };
        variants.push(VariantStream {
            url,
            bandwidth: attribute(line, "BANDWIDTH").and_then(|v| v.parse().ok()),
            resolution: attribute(line, "RESOLUTION").map(str::to_string),
        });
    }

    Ok(variants)
}

/// Distinct qualities of a master playlist, ascending. The first variant
/// seen for a quality wins.
pub fn parse_master_playlist(text: &str, master_url: &str) -> Result<Vec<QualityOption>> {
    let mut seen = HashSet::new();
    let mut qualities: Vec<QualityOption> = parse_variants(text, master_url)?
        .into_iter()
        .filter_map(|variant| {
            let quality = variant.quality()?;
            seen.insert(quality).then_some(QualityOption {
                quality,
                url: variant.url,
            })
        })
        .collect();

    qualities.sort_by_key(|q| q.quality);
    Ok(qualities)
}

/// Segment URIs in playlist order. A line that does not resolve is skipped but
/// keeps its position, so later segments retain their original index.
pub fn parse_media_playlist(text: &str, playlist_url: &str) -> Result<Vec<MediaSegment>> {
    let segments = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .filter_map(|(index, line)| match resolve_url(playlist_url, line) {
            Ok(url) => Some(MediaSegment { index, url }),
            Err(e) => {
                warn!("Skipping segment {} ({}): {}", index, line, e);
                None
            }
        })
        .collect();
    Ok(segments)
}

fn attribute<'a>(tag_line: &'a str, name: &str) -> Option<&'a str> {
    let (_, attrs) = tag_line.split_once(':')?;
    attrs.split(',').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}

fn first_number(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
