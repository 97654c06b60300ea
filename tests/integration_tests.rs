use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use tv5_dl::core::{AssemblyMethod, Transport};
use tv5_dl::server::{router, AppState};
use tv5_dl::{Config, DownloadRequest, Downloader, Tv5Error, Tv5Extractor};

const CDN: &str = "https://cdn.example.com/hls/abc";
const SEGMENTS: usize = 20;
const BROKEN_SEGMENT: usize = 7;

/// Serves canned bodies by URL; anything else is a 404.
#[derive(Default)]
struct MockTransport {
    pages: HashMap<String, Bytes>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    fn page(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_bytes(&self, url: &str) -> tv5_dl::Result<Bytes> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| Tv5Error::transport(url, Some(404), "HTTP 404 Not Found"))
    }

    async fn post_form(&self, url: &str, _form: &[(&str, &str)]) -> tv5_dl::Result<String> {
        self.requests.lock().unwrap().push(format!("POST {url}"));
        self.pages
            .get(&format!("POST {url}"))
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| Tv5Error::transport(url, Some(500), "HTTP 500"))
    }
}

fn segment_url(i: usize) -> String {
    format!("{CDN}/720/seg{i:03}.ts")
}

fn segment_body(i: usize) -> Vec<u8> {
    format!("<seg{i:03}>").into_bytes()
}

fn mock_site() -> MockTransport {
    let search = r#"<html><body>
        <div id="entryID1"><span style="font-size:16px">Ван-пис 1 сезон 1-61 серия</span>
            <a href="/load/one_piece/1">open</a></div>
        <div id="entryID2"><span style="font-size:16px">Ван-пис (зеркало)</span>
            <a href="/load/one_piece_mirror/2">open</a></div>
        <div id="entryID3"><span style="font-size:16px">Пропавший</span>
            <a href="/load/gone/3">open</a></div>
    </body></html>"#;

    let detail = r#"<html><body>
        <div style="display:none">Ван-пис</div>
        <iframe src="//playep.pro/pl/555"></iframe>
        <table><tr><td class="eText"><img src="/img/op.jpg"><div>★★★★★</div>
            Пираты  в поисках
            сокровища.</td></tr></table>
    </body></html>"#;

    let player = r#"<html><body><div id="inputData" style="display:none">
        {"1": {"1": [{"voice_id": 152, "video_id": "abc", "voice_name": "AniDub"},
                     {"voice_id": 7, "video_id": "def"}],
               "2": [{"voice_id": 152, "video_id": "ghi"}]}}
    </div></body></html>"#;

    let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720
720/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
1080/index.m3u8
";

    let mut media = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:6\n");
    for i in 0..SEGMENTS {
        media.push_str(&format!("#EXTINF:6.0,\nseg{i:03}.ts\n"));
    }
    media.push_str("#EXT-X-ENDLIST\n");

    let unreachable_media = "#EXTM3U\n#EXTINF:6.0,\n/gone/a.ts\n#EXTINF:6.0,\n/gone/b.ts\n";

    let mut site = MockTransport::default()
        .page("POST https://tv532.ru/catalog/1", search)
        .page("https://tv532.ru/load/one_piece/1", detail)
        .page("https://tv532.ru/load/one_piece_mirror/2", detail)
        .page("https://playep.pro/pl/555", player)
        .page(
            "https://gencit.info/player/responce.php?video_id=abc",
            format!(r#"{{"src": "{CDN}/master.m3u8"}}"#),
        )
        .page(
            "https://gencit.info/player/responce.php?video_id=def",
            r#"{"error": "gone"}"#,
        )
        .page(&format!("{CDN}/master.m3u8"), master)
        .page(&format!("{CDN}/720/index.m3u8"), media)
        .page(&format!("{CDN}/360/index.m3u8"), "#EXTM3U\n#EXT-X-ENDLIST\n")
        .page(&format!("{CDN}/1080/index.m3u8"), unreachable_media);

    for i in (0..SEGMENTS).filter(|&i| i != BROKEN_SEGMENT) {
        site = site.page(&segment_url(i), segment_body(i));
    }
    site
}

struct Fixture {
    transport: Arc<MockTransport>,
    extractor: Arc<Tv5Extractor>,
    downloader: Downloader,
    config: Config,
    temp_parent: TempDir,
}

fn fixture() -> Result<Fixture> {
    let temp_parent = tempfile::tempdir()?;
    let config = Config {
        temp_dir: Some(temp_parent.path().to_path_buf()),
        // Force the plain concatenation path so results do not depend on the host.
        ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
        concurrent_segments: 4,
        ..Config::default()
    };
    let transport = Arc::new(mock_site());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let extractor = Arc::new(Tv5Extractor::new(dyn_transport.clone(), &config)?);
    let downloader = Downloader::new(extractor.clone(), dyn_transport, &config);

    Ok(Fixture {
        transport,
        extractor,
        downloader,
        config,
        temp_parent,
    })
}

fn request(voice_id: &str, quality: u32) -> DownloadRequest {
    DownloadRequest {
        player_id: "555".to_string(),
        season: "1".to_string(),
        episode: "1".to_string(),
        voice_id: voice_id.to_string(),
        quality,
    }
}

fn workspace_count(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

#[tokio::test]
async fn test_search_deduplicates_player_ids() -> Result<()> {
    let f = fixture()?;
    let hits = f.extractor.search("Ван-пис").await?;

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].player_id, "555");
    assert_eq!(hits[0].name, "Ван-пис 1 сезон");
    assert_eq!(hits[0].url, "https://tv532.ru/load/one_piece/1");
    Ok(())
}

#[tokio::test]
async fn test_search_failure_is_search_failed() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let config = Config {
        temp_dir: Some(temp.path().to_path_buf()),
        ..Config::default()
    };
    let extractor = Tv5Extractor::new(Arc::new(MockTransport::default()), &config)?;

    let result = extractor.search("anything").await;
    assert!(matches!(result, Err(Tv5Error::SearchFailed(_))));
    Ok(())
}

#[tokio::test]
async fn test_resolve_title() -> Result<()> {
    let f = fixture()?;

    let title = f.extractor.resolve_title("Ван-пис", None).await?;
    assert_eq!(title.name, "Ван-пис");
    assert_eq!(title.player_id, "555");
    assert_eq!(title.img, "https://tv532.ru/img/op.jpg");
    assert_eq!(title.description, "Пираты в поисках сокровища.");

    let missing = f.extractor.resolve_title("Ван-пис", Some("999")).await;
    assert!(matches!(missing, Err(Tv5Error::PlayerNotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_resolve_qualities_by_voice() -> Result<()> {
    let f = fixture()?;

    let qualities = f.extractor.resolve_qualities("555", "1", "1", "152").await?;
    let tiers: Vec<u32> = qualities.iter().map(|q| q.quality).collect();
    assert_eq!(tiers, vec![360, 720, 1080]);
    assert_eq!(qualities[1].url, format!("{CDN}/720/index.m3u8"));

    let missing = f.extractor.resolve_qualities("555", "1", "1", "999").await;
    assert!(matches!(missing, Err(Tv5Error::VoiceNotFound { .. })));

    let broken = f.extractor.resolve_qualities("555", "1", "1", "7").await;
    assert!(matches!(broken, Err(Tv5Error::InvalidVideoResponse)));
    Ok(())
}

#[tokio::test]
async fn test_series_helpers() -> Result<()> {
    let f = fixture()?;

    let summary = f.extractor.series_summary("555").await?;
    assert_eq!(summary.seasons["1"].episodes, vec!["1", "2"]);
    assert_eq!(summary.available_voices["152"], "AniDub");

    let variants = f.extractor.episode_variants("555", "1", "1").await?;
    assert_eq!(variants.len(), 2);

    let next = f.extractor.next_episode("555", "1", "1").await?;
    assert!(next.exists);
    assert_eq!(next.episode.as_deref(), Some("2"));
    Ok(())
}

#[tokio::test]
async fn test_download_tolerates_single_segment_failure() -> Result<()> {
    let f = fixture()?;

    let video = f.downloader.download(&request("152", 720)).await?;
    assert_eq!(video.method(), AssemblyMethod::Concat);
    assert_eq!(video.segments_total(), SEGMENTS);
    assert_eq!(video.segments_downloaded(), SEGMENTS - 1);
    assert_eq!(video.file_name(), "555_1s1e_720p.mp4");

    let expected: Vec<u8> = (0..SEGMENTS)
        .filter(|&i| i != BROKEN_SEGMENT)
        .flat_map(segment_body)
        .collect();
    assert_eq!(std::fs::read(video.path())?, expected);
    assert_eq!(video.size(), expected.len() as u64);

    let out = tempfile::tempdir()?;
    let saved = video.save_to(out.path()).await?;
    assert_eq!(std::fs::read(&saved)?, expected);
    assert_eq!(workspace_count(&f.temp_parent), 0);
    Ok(())
}

#[tokio::test]
async fn test_download_empty_playlist_is_no_segments() -> Result<()> {
    let f = fixture()?;
    let result = f.downloader.download(&request("152", 360)).await;
    assert!(matches!(result, Err(Tv5Error::NoSegments)));
    assert_eq!(workspace_count(&f.temp_parent), 0);
    Ok(())
}

#[tokio::test]
async fn test_download_all_segments_failed_releases_workspace() -> Result<()> {
    let f = fixture()?;
    let result = f.downloader.download(&request("152", 1080)).await;
    assert!(matches!(
        result,
        Err(Tv5Error::AllSegmentsFailed { attempted: 2 })
    ));
    assert_eq!(workspace_count(&f.temp_parent), 0);
    Ok(())
}

#[tokio::test]
async fn test_download_unknown_quality() -> Result<()> {
    let f = fixture()?;
    let result = f.downloader.download(&request("152", 480)).await;
    assert!(matches!(
        result,
        Err(Tv5Error::QualityNotFound { quality: 480 })
    ));
    Ok(())
}

#[tokio::test]
async fn test_playlist_url_fetches_no_segments() -> Result<()> {
    let f = fixture()?;
    let url = f.downloader.playlist_url(&request("152", 720)).await?;

    assert_eq!(url, format!("{CDN}/720/index.m3u8"));
    let requested = f.transport.requested();
    assert!(!requested.iter().any(|u| u.ends_with(".ts")));
    assert!(!requested.contains(&url));
    assert_eq!(workspace_count(&f.temp_parent), 0);
    Ok(())
}

async fn call(f: &Fixture, uri: &str) -> Result<(StatusCode, axum::http::HeaderMap, Bytes)> {
    let transport: Arc<dyn Transport> = f.transport.clone();
    let app = router(AppState::with_transport(transport, &f.config)?);
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, headers, body))
}

#[tokio::test]
async fn test_server_missing_parameters_before_network() -> Result<()> {
    let f = fixture()?;
    let (status, _, body) = call(&f, "/?method=get_available_qualities&player_id=555").await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(
        json["error"],
        "Missing required parameters: season, episode, voice_id"
    );
    assert!(f.transport.requested().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_server_resolution_error_is_json() -> Result<()> {
    let f = fixture()?;
    let (status, _, body) = call(
        &f,
        "/?method=get_available_qualities&player_id=555&season=1&episode=1&voice_id=999",
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["error"], "Voice ID 999 not found for episode 1x1");
    Ok(())
}

#[tokio::test]
async fn test_server_download_m3u8_redirects() -> Result<()> {
    let f = fixture()?;
    let (status, headers, _) = call(
        &f,
        "/?method=download_m3u8&player_id=555&season=1&episode=1&voice_id=152&quality=720",
    )
    .await?;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        headers[header::LOCATION],
        format!("{CDN}/720/index.m3u8").as_str()
    );
    Ok(())
}

#[tokio::test]
async fn test_server_download_streams_attachment() -> Result<()> {
    let f = fixture()?;
    let (status, headers, body) = call(
        &f,
        "/?method=download&player_id=555&season=1&episode=1&voice_id=152&quality=720",
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"555_1s1e_720p.mp4\""
    );
    assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string().as_str());
    assert!(body.starts_with(b"<seg000>"));
    assert_eq!(workspace_count(&f.temp_parent), 0);
    Ok(())
}

#[tokio::test]
async fn test_server_info_is_default() -> Result<()> {
    let f = fixture()?;
    let (status, _, body) = call(&f, "/").await?;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert!(json["available_methods"]["download"].is_string());
    Ok(())
}
