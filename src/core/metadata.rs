use crate::core::{Result, Tv5Error};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub url: String,
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMetadata {
    pub name: String,
    pub player_id: String,
    pub img: String,
    pub description: String,
}

/// One audio track of one episode as listed by the player page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub voice_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub video_id: String,
    #[serde(default, alias = "voice")]
    pub voice_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
}

/// Season → episode → audio tracks, keyed exactly as the player page keys them.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerManifest {
    seasons: BTreeMap<String, BTreeMap<String, Vec<ManifestEntry>>>,
    raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub video_id: String,
    pub master_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    pub quality: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSegment {
    pub index: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeVariant {
    pub season: String,
    pub episode: String,
    pub voice_id: String,
    pub voice_name: Option<String>,
    pub video_id: String,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub episodes: Vec<String>,
    pub voice_variants: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub player_id: String,
    pub seasons: BTreeMap<String, SeasonSummary>,
    pub available_voices: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEpisode {
    pub exists: bool,
    pub season: Option<String>,
    pub episode: Option<String>,
}

impl PlayerManifest {
    /// Build the typed view from the JSON embedded in the player page.
    ///
    /// Seasons and episodes may be JSON objects or arrays (array positions
    /// become the keys). Entries without both ids are skipped.
    pub fn from_value(raw: Value) -> Result<Self> {
        let mut seasons = BTreeMap::new();

        for (season, episodes) in children(&raw).ok_or(Tv5Error::InvalidManifest)? {
            let Some(episodes) = children(episodes) else {
                continue;
            };
            let mut by_episode = BTreeMap::new();
            for (episode, entries) in episodes {
                let Some(entries) = entries.as_array() else {
                    continue;
                };
                let parsed: Vec<ManifestEntry> = entries
                    .iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect();
                by_episode.insert(episode, parsed);
            }
            seasons.insert(season, by_episode);
        }

        Ok(Self { seasons, raw })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn episode(&self, season: &str, episode: &str) -> Result<&[ManifestEntry]> {
        self.seasons
            .get(season)
            .and_then(|episodes| episodes.get(episode))
            .map(Vec::as_slice)
            .ok_or_else(|| Tv5Error::EpisodeNotFound {
                season: season.to_string(),
                episode: episode.to_string(),
            })
    }

    /// Video source id for the given audio track; ids compare as strings.
    pub fn find_video_id(&self, season: &str, episode: &str, voice_id: &str) -> Result<String> {
        let voice_missing = || Tv5Error::VoiceNotFound {
            voice_id: voice_id.to_string(),
            season: season.to_string(),
            episode: episode.to_string(),
        };

        let entries = self.episode(season, episode).map_err(|_| voice_missing())?;
        entries
            .iter()
            .find(|entry| entry.voice_id == voice_id.trim())
            .map(|entry| entry.video_id.clone())
            .ok_or_else(voice_missing)
    }

    pub fn episode_variants(&self, season: &str, episode: &str) -> Result<Vec<EpisodeVariant>> {
        Ok(self
            .episode(season, episode)?
            .iter()
            .map(|entry| EpisodeVariant {
                season: season.to_string(),
                episode: episode.to_string(),
                voice_id: entry.voice_id.clone(),
                voice_name: entry.voice_name.clone(),
                video_id: entry.video_id.clone(),
                duration: entry.duration,
            })
            .collect())
    }

    pub fn summary(&self, player_id: &str) -> SeriesSummary {
        let mut seasons = BTreeMap::new();
        let mut available_voices = BTreeMap::new();

        for (season, episodes) in &self.seasons {
            let mut keys: Vec<String> = episodes.keys().cloned().collect();
            keys.sort_by(|a, b| numeric_cmp(a, b));

            let mut voice_variants = 0;
            for entry in episodes.values().flatten() {
                voice_variants += 1;
                available_voices
                    .entry(entry.voice_id.clone())
                    .or_insert_with(|| {
                        entry
                            .voice_name
                            .clone()
                            .unwrap_or_else(|| format!("Voice {}", entry.voice_id))
                    });
            }

            seasons.insert(
                season.clone(),
                SeasonSummary {
                    episodes: keys,
                    voice_variants,
                },
            );
        }

        SeriesSummary {
            player_id: player_id.to_string(),
            seasons,
            available_voices,
        }
    }

    /// The episode after `season`x`episode`: next in the same season, otherwise
    /// the first episode of the following season.
    pub fn next_episode(&self, season: &str, episode: &str) -> NextEpisode {
        let mut season_keys: Vec<&String> = self.seasons.keys().collect();
        season_keys.sort_by(|a, b| numeric_cmp(a, b));

        let Some(pos) = season_keys.iter().position(|s| s.as_str() == season) else {
            return NextEpisode::none();
        };

        if let Some(next) = self
            .episode_keys(season)
            .into_iter()
            .find(|k| numeric_cmp(k, episode) == Ordering::Greater)
        {
            return NextEpisode::at(season, next);
        }

        for next_season in &season_keys[pos + 1..] {
            if let Some(first) = self.episode_keys(next_season).first() {
                return NextEpisode::at(next_season, first);
            }
        }

        NextEpisode::none()
    }
}

impl PlayerManifest {
    fn episode_keys(&self, season: &str) -> Vec<&String> {
        let mut keys: Vec<&String> = self
            .seasons
            .get(season)
            .into_iter()
            .flatten()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(k, _)| k)
            .collect();
        keys.sort_by(|a, b| numeric_cmp(a, b));
        keys
    }
}

impl NextEpisode {
    fn at(season: &str, episode: &str) -> Self {
        Self {
            exists: true,
            season: Some(season.to_string()),
            episode: Some(episode.to_string()),
        }
    }

    fn none() -> Self {
        Self {
            exists: false,
            season: None,
            episode: None,
        }
    }
}

fn children(value: &Value) -> Option<Vec<(String, &Value)>> {
    match value {
        Value::Object(map) => Some(map.iter().map(|(k, v)| (k.clone(), v)).collect()),
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        ),
        _ => None,
    }
}

/// Numeric keys compare as numbers, anything else falls back to string order.
pub fn numeric_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> PlayerManifest {
        PlayerManifest::from_value(json!({
            "1": {
                "1": [
                    {"voice_id": 152, "video_id": "abc", "voice_name": "LostFilm", "duration": 2580},
                    {"voice_id": "7", "video_id": 991, "voice_name": "Original"}
                ],
                "2": [{"voice_id": 152, "video_id": "abd"}],
                "10": [{"voice_id": 152, "video_id": "abz"}]
            },
            "2": {
                "1": [{"voice_id": 152, "video_id": "bcd", "duration": "2400.5"}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_voice_lookup_normalizes_ids() {
        let m = manifest();
        assert_eq!(m.find_video_id("1", "1", "152").unwrap(), "abc");
        assert_eq!(m.find_video_id("1", "1", "7").unwrap(), "991");
    }

    #[test]
    fn test_missing_voice_is_typed() {
        let m = manifest();
        assert!(matches!(
            m.find_video_id("1", "1", "999"),
            Err(Tv5Error::VoiceNotFound { .. })
        ));
        // Absent episode keys never fall back to a default entry.
        assert!(matches!(
            m.find_video_id("3", "1", "152"),
            Err(Tv5Error::VoiceNotFound { .. })
        ));
    }

    #[test]
    fn test_non_container_manifest_is_invalid() {
        assert!(matches!(
            PlayerManifest::from_value(json!("nope")),
            Err(Tv5Error::InvalidManifest)
        ));
    }

    #[test]
    fn test_array_seasons_use_positions() {
        let m = PlayerManifest::from_value(json!([[[{"voice_id": 1, "video_id": "x"}]]])).unwrap();
        assert_eq!(m.find_video_id("0", "0", "1").unwrap(), "x");
    }

    #[test]
    fn test_summary_orders_episodes_numerically() {
        let summary = manifest().summary("42");
        assert_eq!(summary.seasons["1"].episodes, vec!["1", "2", "10"]);
        assert_eq!(summary.seasons["1"].voice_variants, 4);
        assert_eq!(summary.available_voices["152"], "LostFilm");
        assert_eq!(summary.available_voices["7"], "Original");
    }

    #[test]
    fn test_next_episode() {
        let m = manifest();
        assert_eq!(m.next_episode("1", "2"), NextEpisode::at("1", "10"));
        assert_eq!(m.next_episode("1", "10"), NextEpisode::at("2", "1"));
        assert!(!m.next_episode("2", "1").exists);
        assert!(!m.next_episode("9", "1").exists);
    }

    #[test]
    fn test_lenient_duration() {
        let variants = manifest().episode_variants("2", "1").unwrap();
        assert_eq!(variants[0].duration, Some(2400.5));
    }
}
