use crate::config::Config;
use crate::core::playlist::{parse_master_playlist, resolve_url};
use crate::core::{
    EpisodeVariant, NextEpisode, PlayerManifest, QualityOption, Result, SearchHit,
    SeriesSummary, StreamDescriptor, TitleMetadata, Transport, Tv5Error,
};
use futures::StreamExt;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SEASON_MARKER: &str = "сезон";
const UNKNOWN_NAME: &str = "Неизвестно";
/// Detail pages fetched at once while resolving search hits.
const DETAIL_CONCURRENCY: usize = 4;

/// Walks the TV5 catalog from a search query down to HLS quality variants.
pub struct Tv5Extractor {
    transport: Arc<dyn Transport>,
    site_base: String,
    player_base: String,
    video_api: String,
    player_link: Regex,
    manifest_block: Regex,
}

/// One `entryID` block of the catalog search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitlePage {
    pub name: String,
    pub img: String,
    pub description: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Tv5Error::Config(format!("bad selector {css}: {e}")))
}

impl Tv5Extractor {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Result<Self> {
        let player_url = url::Url::parse(&config.player_url)?;
        let host = player_url
            .host_str()
            .ok_or_else(|| Tv5Error::Config(format!("player_url has no host: {}", config.player_url)))?;
        let player_link = Regex::new(&format!(r"//{}/pl/(\d+)", regex::escape(host)))
            .map_err(|e| Tv5Error::Config(e.to_string()))?;

        Ok(Self {
            transport,
            site_base: config.site_base().to_string(),
            player_base: config.player_url.trim_end_matches('/').to_string(),
            video_api: config.video_api_url.clone(),
            player_link,
            manifest_block: manifest_block_regex()?,
        })
    }

    pub fn player_page_url(&self, player_id: &str) -> String {
        format!("{}/pl/{}", self.player_base, player_id)
    }

    pub fn video_api_url(&self, video_id: &str) -> String {
        format!("{}?video_id={}", self.video_api, urlencoding::encode(video_id))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = format!("{}/catalog/1", self.site_base);
        info!("Searching for: {}", query);

        let html = self
            .transport
            .post_form(&url, &[("query", query), ("a", "2")])
            .await
            .map_err(|e| Tv5Error::SearchFailed(e.to_string()))?;

        let entries = parse_search_entries(&html, &self.site_base)?;
        debug!("Search page lists {} entries", entries.len());

        let resolved: Vec<(SearchEntry, Option<String>)> = futures::stream::iter(entries)
            .map(move |entry| async move {
                let player_id = self.player_id_for(&entry.url).await;
                (entry, player_id)
            })
            .buffered(DETAIL_CONCURRENCY)
            .collect()
            .await;

        let mut seen = HashSet::new();
        let hits: Vec<SearchHit> = resolved
            .into_iter()
            .filter_map(|(entry, player_id)| {
                let player_id = player_id?;
                seen.insert(player_id.clone()).then_some(SearchHit {
                    name: entry.name,
                    url: entry.url,
                    player_id,
                })
            })
            .collect();

        info!("Found {} results", hits.len());
        Ok(hits)
    }

    async fn player_id_for(&self, detail_url: &str) -> Option<String> {
        match self.transport.get_text(detail_url).await {
            Ok(html) => self.extract_player_id(&html),
            Err(e) => {
                warn!("Skipping search hit {}: {}", detail_url, e);
                None
            }
        }
    }

    pub fn extract_player_id(&self, html: &str) -> Option<String> {
        self.player_link
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub async fn resolve_title(&self, query: &str, player_id: Option<&str>) -> Result<TitleMetadata> {
        let hits = self.search(query).await?;
        if hits.is_empty() {
            return Err(Tv5Error::NotFound {
                query: query.to_string(),
            });
        }

        let hit = match player_id {
            Some(id) => hits
                .into_iter()
                .find(|hit| hit.player_id == id)
                .ok_or_else(|| Tv5Error::PlayerNotFound {
                    player_id: id.to_string(),
                })?,
            None => hits.into_iter().next().ok_or_else(|| Tv5Error::NotFound {
                query: query.to_string(),
            })?,
        };

        let html = self.transport.get_text(&hit.url).await?;
        let page = parse_title_page(&html, &self.site_base)?;

        Ok(TitleMetadata {
            name: page.name,
            player_id: hit.player_id,
            img: page.img,
            description: page.description,
        })
    }

    pub async fn fetch_player_manifest(&self, player_id: &str) -> Result<PlayerManifest> {
        let url = self.player_page_url(player_id);
        debug!("Fetching player data: {}", url);
        let html = self.transport.get_text(&url).await?;
        PlayerManifest::from_value(extract_manifest_json(&html, &self.manifest_block)?)
    }

    pub async fn resolve_stream(
        &self,
        player_id: &str,
        season: &str,
        episode: &str,
        voice_id: &str,
    ) -> Result<StreamDescriptor> {
        let manifest = self.fetch_player_manifest(player_id).await?;
        let video_id = manifest.find_video_id(season, episode, voice_id)?;

        let body = self.transport.get_text(&self.video_api_url(&video_id)).await?;
        let master_url = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("src").and_then(Value::as_str).map(str::to_string))
            .ok_or(Tv5Error::InvalidVideoResponse)?;

        debug!("Video {} master playlist: {}", video_id, master_url);
        Ok(StreamDescriptor {
            video_id,
            master_url,
        })
    }

    pub async fn resolve_qualities(
        &self,
        player_id: &str,
        season: &str,
        episode: &str,
        voice_id: &str,
    ) -> Result<Vec<QualityOption>> {
        let stream = self.resolve_stream(player_id, season, episode, voice_id).await?;
        let master = self.transport.get_text(&stream.master_url).await?;
        let qualities = parse_master_playlist(&master, &stream.master_url)?;

        info!(
            "Episode {}x{} voice {}: qualities {:?}",
            season,
            episode,
            voice_id,
            qualities.iter().map(|q| q.quality).collect::<Vec<_>>()
        );
        Ok(qualities)
    }

    pub async fn series_summary(&self, player_id: &str) -> Result<SeriesSummary> {
        Ok(self.fetch_player_manifest(player_id).await?.summary(player_id))
    }

    pub async fn episode_variants(
        &self,
        player_id: &str,
        season: &str,
        episode: &str,
    ) -> Result<Vec<EpisodeVariant>> {
        self.fetch_player_manifest(player_id)
            .await?
            .episode_variants(season, episode)
    }

    pub async fn next_episode(&self, player_id: &str, season: &str, episode: &str) -> Result<NextEpisode> {
        Ok(self
            .fetch_player_manifest(player_id)
            .await?
            .next_episode(season, episode))
    }
}

pub fn parse_search_entries(html: &str, site_base: &str) -> Result<Vec<SearchEntry>> {
    let document = Html::parse_document(html);
    let entry_selector = selector(r#"div[id^="entryID"]"#)?;
    let title_selector = selector(r#"span[style*="font-size"]"#)?;
    let link_selector = selector("a[href]")?;

    let mut entries = Vec::new();
    for entry in document.select(&entry_selector) {
        let name = entry
            .select(&title_selector)
            .next()
            .map(|span| truncate_at_season(span.text().collect::<String>().trim()))
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        let Some(href) = entry
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };

        match resolve_url(site_base, href) {
            Ok(url) => entries.push(SearchEntry { name, url }),
            Err(e) => warn!("Skipping search entry {:?} with link {}: {}", name, href, e),
        }
    }

    Ok(entries)
}

/// "Show 3 сезон 1-10 серии" becomes "Show 3 сезон".
pub fn truncate_at_season(name: &str) -> String {
    match name.find(SEASON_MARKER) {
        Some(pos) => format!("{}{}", &name[..pos], SEASON_MARKER),
        None => name.to_string(),
    }
}

pub fn parse_title_page(html: &str, site_base: &str) -> Result<TitlePage> {
    let document = Html::parse_document(html);
    let name_selector = selector(r#"div[style="display:none"]"#)?;
    let description_selector = selector("td.eText")?;
    let img_selector = selector("img[src]")?;

    let name = document
        .select(&name_selector)
        .next()
        .map(|div| div.text().collect::<String>().trim().to_string())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    let container = document
        .select(&description_selector)
        .next()
        .ok_or(Tv5Error::DescriptionMissing)?;

    let img = match container
        .select(&img_selector)
        .next()
        .and_then(|img| img.value().attr("src"))
    {
        Some(src) => resolve_url(site_base, src)?,
        None => String::new(),
    };

    let mut text = String::new();
    collect_text_outside_divs(container, &mut text);
    let description = text.split_whitespace().collect::<Vec<_>>().join(" ");

    Ok(TitlePage {
        name,
        img,
        description,
    })
}

// Nested divs hold ratings and share buttons, not the synopsis.
fn collect_text_outside_divs(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            if el.value().name() != "div" {
                collect_text_outside_divs(el, out);
            }
        }
    }
}

pub fn manifest_block_regex() -> Result<Regex> {
    Regex::new(r#"(?s)<div id="inputData"[^>]*>(.*?)</div>"#)
        .map_err(|e| Tv5Error::Config(e.to_string()))
}

/// The JSON episode map embedded in `<div id="inputData">` on the player page.
pub fn extract_manifest_json(html: &str, block: &Regex) -> Result<Value> {
    let raw = block
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .ok_or(Tv5Error::InvalidManifest)?;

    if let Ok(value) = serde_json::from_str(raw) {
        return Ok(value);
    }

    // Some pages entity-encode the JSON; let the HTML parser decode it.
    let decoded = Html::parse_fragment(raw)
        .root_element()
        .text()
        .collect::<String>();
    serde_json::from_str(decoded.trim()).map_err(|_| Tv5Error::InvalidManifest)
}
