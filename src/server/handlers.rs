use super::AppState;
use crate::core::{DownloadRequest, Result, Tv5Error};
use crate::utils::attachment_header;
use axum::body::Body;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, warn};

/// Flat string parameters of one request.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(values)
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// All of `names`, or one error listing every missing parameter.
    pub fn require<const N: usize>(&self, names: [&str; N]) -> Result<[&str; N]> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.optional(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Tv5Error::MissingParameter(format!(
                "Missing required parameters: {}",
                missing.join(", ")
            )));
        }
        Ok(names.map(|name| self.optional(name).unwrap_or_default()))
    }

    fn download_request(&self) -> Result<DownloadRequest> {
        let [player_id, season, episode, voice_id, quality] =
            self.require(["player_id", "season", "episode", "voice_id", "quality"])?;
        let quality = quality
            .trim_end_matches('p')
            .parse()
            .map_err(|_| Tv5Error::InvalidParameter(format!("Invalid quality: {quality}")))?;

        Ok(DownloadRequest {
            player_id: player_id.to_string(),
            season: season.to_string(),
            episode: episode.to_string(),
            voice_id: voice_id.to_string(),
            quality,
        })
    }
}

struct ApiError(StatusCode, Tv5Error);

impl From<Tv5Error> for ApiError {
    fn from(err: Tv5Error) -> Self {
        Self(StatusCode::BAD_REQUEST, err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(status, err) = self;
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }
        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}

pub(super) async fn dispatch_get(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    dispatch(&state, Params::new(query)).await
}

/// Query string parameters win over form fields of the same name.
pub(super) async fn dispatch_post(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    form: std::result::Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let mut values = form.map(|Form(form)| form).unwrap_or_default();
    values.extend(query);
    dispatch(&state, Params::new(values)).await
}

async fn dispatch(state: &AppState, params: Params) -> Response {
    let method = params.optional("method").unwrap_or("info");

    let result = match method {
        "search" => search(state, &params).await,
        "get_tv_show" => get_tv_show(state, &params).await,
        "get_player_data" => get_player_data(state, &params).await,
        "get_available_qualities" => get_available_qualities(state, &params).await,
        "get_series_data" => get_series_data(state, &params).await,
        "get_episode_data" => get_episode_data(state, &params).await,
        "get_next_episode" => get_next_episode(state, &params).await,
        "download" => return download(state, &params).await,
        "download_m3u8" => return download_m3u8(state, &params).await,
        _ => Ok(info()),
    };

    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn search(state: &AppState, params: &Params) -> Result<Value> {
    let [query] = params.require(["query"])?;
    Ok(serde_json::to_value(state.extractor.search(query).await?)?)
}

async fn get_tv_show(state: &AppState, params: &Params) -> Result<Value> {
    let [query] = params.require(["query"])?;
    let title = state
        .extractor
        .resolve_title(query, params.optional("player_id"))
        .await?;
    Ok(serde_json::to_value(title)?)
}

async fn get_player_data(state: &AppState, params: &Params) -> Result<Value> {
    let [player_id] = params.require(["player_id"])?;
    let manifest = state.extractor.fetch_player_manifest(player_id).await?;
    Ok(manifest.raw().clone())
}

async fn get_available_qualities(state: &AppState, params: &Params) -> Result<Value> {
    let [player_id, season, episode, voice_id] =
        params.require(["player_id", "season", "episode", "voice_id"])?;
    let qualities = state
        .extractor
        .resolve_qualities(player_id, season, episode, voice_id)
        .await?;
    Ok(serde_json::to_value(qualities)?)
}

async fn get_series_data(state: &AppState, params: &Params) -> Result<Value> {
    let [player_id] = params.require(["player_id"])?;
    Ok(serde_json::to_value(state.extractor.series_summary(player_id).await?)?)
}

async fn get_episode_data(state: &AppState, params: &Params) -> Result<Value> {
    let [player_id, season, episode] = params.require(["player_id", "season", "episode"])?;
    let variants = state
        .extractor
        .episode_variants(player_id, season, episode)
        .await?;
    Ok(serde_json::to_value(variants)?)
}

async fn get_next_episode(state: &AppState, params: &Params) -> Result<Value> {
    let [player_id, season, episode] = params.require(["player_id", "season", "episode"])?;
    let next = state
        .extractor
        .next_episode(player_id, season, episode)
        .await?;
    Ok(serde_json::to_value(next)?)
}

async fn download(state: &AppState, params: &Params) -> Response {
    let request = match params.download_request() {
        Ok(request) => request,
        Err(err) => return ApiError::from(err).into_response(),
    };

    let video = match state.downloader.download(&request).await {
        Ok(video) => video,
        Err(err) => return ApiError::from(err).into_response(),
    };

    // Headers go out only for a file that exists and whose size is known.
    let size = match tokio::fs::metadata(video.path()).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            let err = Tv5Error::Mux("Output file not created".to_string());
            return ApiError(StatusCode::INTERNAL_SERVER_ERROR, err).into_response();
        }
    };
    let disposition = attachment_header(video.file_name());

    let stream = match video.into_stream().await {
        Ok(stream) => stream,
        Err(err) => return ApiError(StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, size.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn download_m3u8(state: &AppState, params: &Params) -> Response {
    let url = match params.download_request() {
        Ok(request) => state.downloader.playlist_url(&request).await,
        Err(err) => Err(err),
    };

    match url {
        Ok(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn info() -> Value {
    json!({
        "message": "TV5 Video Downloader API",
        "version": env!("CARGO_PKG_VERSION"),
        "available_methods": {
            "search": "Search content - ?method=search&query=Title",
            "get_tv_show": "Get TV show info - ?method=get_tv_show&query=Title&player_id=12345",
            "get_player_data": "Get player data - ?method=get_player_data&player_id=12345",
            "get_available_qualities": "Get available qualities - ?method=get_available_qualities&player_id=12345&season=1&episode=1&voice_id=152",
            "get_series_data": "Seasons and voices - ?method=get_series_data&player_id=12345",
            "get_episode_data": "Voices of one episode - ?method=get_episode_data&player_id=12345&season=1&episode=1",
            "get_next_episode": "Next episode - ?method=get_next_episode&player_id=12345&season=1&episode=1",
            "download": "Download video (MP4) - ?method=download&player_id=12345&season=1&episode=1&voice_id=152&quality=720",
            "download_m3u8": "Redirect to M3U8 playlist - ?method=download_m3u8&player_id=12345&season=1&episode=1&voice_id=152&quality=720"
        }
    })
}
