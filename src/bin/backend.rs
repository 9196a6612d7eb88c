#![forbid(unsafe_code)]

//! Axum backend for the metadata warehouse.
//!
//! Exposes the four harvest actions, the fixed report menu, and the stored
//! tables as a JSON API, and serves the bundled browser UI from the www
//! root. Harvest requests hit the YouTube Data API synchronously: the HTTP
//! response returns once the fetch-map-write sequence has finished.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yt_warehouse::config::{RuntimeConfig, RuntimeOverrides, resolve_runtime_config};
use yt_warehouse::harvest::{
    HarvestSummary, harvest_channel, harvest_comments, harvest_playlists, harvest_videos,
};
use yt_warehouse::mapper::{ChannelRow, CommentRow, PlaylistRow, VideoRow};
use yt_warehouse::reports::{REPORT_QUERIES, find_report};
use yt_warehouse::security::ensure_unprivileged;
use yt_warehouse::store::{ReportTable, Warehouse};
use yt_warehouse::youtube::YouTubeClient;

#[derive(Debug, Clone)]
struct BackendArgs {
    config: RuntimeConfig,
    listen_host: IpAddr,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = RuntimeOverrides::default();
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline_value) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            let mut take_value = |flag: &str| -> Result<String> {
                match inline_value.clone() {
                    Some(value) => Ok(value),
                    None => args
                        .next()
                        .ok_or_else(|| anyhow!("{flag} requires a value")),
                }
            };

            match flag.as_str() {
                "--api-key" => overrides.api_key = Some(take_value("--api-key")?),
                "--db" => overrides.db_path = Some(PathBuf::from(take_value("--db")?)),
                "--www-root" => {
                    overrides.www_root = Some(PathBuf::from(take_value("--www-root")?));
                }
                "--host" => overrides.host = Some(take_value("--host")?),
                "--port" => overrides.port = Some(parse_port_arg(&take_value("--port")?)?),
                "--env-file" => {
                    overrides.env_path = Some(PathBuf::from(take_value("--env-file")?));
                }
                _ => return Err(anyhow!("unknown argument: {flag}")),
            }
        }

        let config = resolve_runtime_config(overrides)?;
        let listen_host = parse_host_arg(&config.host)?;
        Ok(Self {
            config,
            listen_host,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/WAREHOUSE_HOST")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    warehouse: Warehouse,
    client: Arc<YouTubeClient>,
    www_root: Arc<PathBuf>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarvestRequest {
    channel_id: String,
}

#[derive(Serialize)]
struct ReportInfo {
    id: u8,
    question: &'static str,
}

#[derive(Serialize)]
struct ReportPayload {
    id: u8,
    question: &'static str,
    #[serde(flatten)]
    table: ReportTable,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let BackendArgs {
        config,
        listen_host,
    } = BackendArgs::parse()?;

    ensure_unprivileged("backend")?;

    let warehouse = Warehouse::open(&config.db_path)
        .await
        .context("opening the warehouse database")?;
    let client = Arc::new(YouTubeClient::new(&config));

    let state = AppState {
        warehouse,
        client,
        www_root: Arc::new(config.www_root.clone()),
    };

    let app = Router::new()
        .route("/api/harvest/channel", post(harvest_channel_action))
        .route("/api/harvest/videos", post(harvest_videos_action))
        .route("/api/harvest/playlists", post(harvest_playlists_action))
        .route("/api/harvest/comments", post(harvest_comments_action))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/{id}", get(run_report))
        .route("/api/channels", get(list_channels))
        .route("/api/videos", get(list_videos))
        .route("/api/playlists", get(list_playlists))
        .route("/api/comments", get(list_comments))
        .fallback(static_fallback)
        .with_state(state);

    let addr = SocketAddr::new(listen_host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("warehouse backend listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running the backend")?;

    Ok(())
}

async fn shutdown_signal() {
    // Failure here only affects graceful shutdown; Ctrl+C still kills the
    // process.
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {err}");
    }
}

fn validated_channel_id(payload: HarvestRequest) -> ApiResult<String> {
    let channel_id = payload.channel_id.trim().to_string();
    if channel_id.is_empty() {
        return Err(ApiError::bad_request("channelId must not be empty"));
    }
    Ok(channel_id)
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(format!("{err:#}"))
}

async fn harvest_channel_action(
    State(state): State<AppState>,
    Json(payload): Json<HarvestRequest>,
) -> ApiResult<Json<HarvestSummary>> {
    let channel_id = validated_channel_id(payload)?;
    let summary = harvest_channel(&state.client, &state.warehouse, &channel_id)
        .await
        .map_err(internal)?;
    Ok(Json(summary))
}

async fn harvest_videos_action(
    State(state): State<AppState>,
    Json(payload): Json<HarvestRequest>,
) -> ApiResult<Json<HarvestSummary>> {
    let channel_id = validated_channel_id(payload)?;
    let summary = harvest_videos(&state.client, &state.warehouse, &channel_id)
        .await
        .map_err(internal)?;
    Ok(Json(summary))
}

async fn harvest_playlists_action(
    State(state): State<AppState>,
    Json(payload): Json<HarvestRequest>,
) -> ApiResult<Json<HarvestSummary>> {
    let channel_id = validated_channel_id(payload)?;
    let summary = harvest_playlists(&state.client, &state.warehouse, &channel_id)
        .await
        .map_err(internal)?;
    Ok(Json(summary))
}

async fn harvest_comments_action(
    State(state): State<AppState>,
    Json(payload): Json<HarvestRequest>,
) -> ApiResult<Json<HarvestSummary>> {
    let channel_id = validated_channel_id(payload)?;
    let summary = harvest_comments(&state.client, &state.warehouse, &channel_id)
        .await
        .map_err(internal)?;
    Ok(Json(summary))
}

async fn list_reports() -> Json<Vec<ReportInfo>> {
    Json(
        REPORT_QUERIES
            .iter()
            .map(|report| ReportInfo {
                id: report.id,
                question: report.question,
            })
            .collect(),
    )
}

async fn run_report(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<u8>,
) -> ApiResult<Json<ReportPayload>> {
    let report = find_report(id).ok_or_else(|| ApiError::not_found("unknown report"))?;
    let table = state
        .warehouse
        .run_report(report.sql, report.columns)
        .await
        .map_err(internal)?;
    Ok(Json(ReportPayload {
        id: report.id,
        question: report.question,
        table,
    }))
}

async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelRow>>> {
    Ok(Json(state.warehouse.list_channels().await.map_err(internal)?))
}

async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<Vec<VideoRow>>> {
    Ok(Json(state.warehouse.list_videos().await.map_err(internal)?))
}

async fn list_playlists(State(state): State<AppState>) -> ApiResult<Json<Vec<PlaylistRow>>> {
    Ok(Json(state.warehouse.list_playlists().await.map_err(internal)?))
}

async fn list_comments(State(state): State<AppState>) -> ApiResult<Json<Vec<CommentRow>>> {
    Ok(Json(state.warehouse.list_comments().await.map_err(internal)?))
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => send_file(root.join("index.html")).await,
        Ok(_) => send_file(target).await,
        Err(_) => {
            if should_fallback_to_index(request_path) {
                send_file(root.join("index.html")).await
            } else {
                Err(ApiError::not_found("file not found"))
            }
        }
    }
}

async fn send_file(path: PathBuf) -> ApiResult<Response> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mime = MimeGuess::from_path(&path).first_or_octet_stream();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(bytes))
        .map_err(|err| ApiError::internal(err.to_string()))
}

/// Maps a request path to a file under the www root, rejecting anything
/// that climbs out of it.
fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return true;
    }
    Path::new(trimmed).extension().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_env(values: &[&str]) -> Result<BackendArgs> {
        // Every test routes through an env file that satisfies the required
        // API key so the args themselves stay the subject under test.
        let mut env = tempfile::NamedTempFile::new().unwrap();
        writeln!(env, "YT_API_KEY=\"test-key\"").unwrap();
        let mut full: Vec<String> = vec![
            "--env-file".to_string(),
            env.path().to_string_lossy().into_owned(),
        ];
        full.extend(values.iter().map(|value| value.to_string()));
        let parsed = BackendArgs::from_iter(full);
        drop(env);
        parsed
    }

    #[test]
    fn parses_space_separated_flags() {
        let args = args_with_env(&["--db", "/tmp/x.db", "--port", "9001"]).unwrap();
        assert_eq!(args.config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(args.config.port, 9001);
        assert_eq!(args.config.api_key, "test-key");
    }

    #[test]
    fn parses_equals_form_flags() {
        let args =
            args_with_env(&["--host=0.0.0.0", "--www-root=/srv/ui", "--api-key=override"])
                .unwrap();
        assert_eq!(args.listen_host, "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(args.config.www_root, PathBuf::from("/srv/ui"));
        assert_eq!(args.config.api_key, "override");
    }

    #[test]
    fn rejects_unknown_arguments() {
        let err = args_with_env(&["--frobnicate"]).unwrap_err();
        assert!(err.to_string().contains("unknown argument"));
    }

    #[test]
    fn rejects_missing_flag_value() {
        let err = args_with_env(&["--port"]).unwrap_err();
        assert!(err.to_string().contains("requires a value"));
    }

    #[test]
    fn rejects_invalid_port() {
        let err = args_with_env(&["--port", "seventy"]).unwrap_err();
        assert!(err.to_string().contains("numeric port"));
    }

    #[test]
    fn resolve_www_path_maps_root_to_index() {
        let root = Path::new("/srv/www");
        let resolved = resolve_www_path(root, "/").unwrap();
        assert_eq!(resolved, root.join("index.html"));
    }

    #[test]
    fn resolve_www_path_rejects_traversal() {
        let root = Path::new("/srv/www");
        assert!(resolve_www_path(root, "/../etc/passwd").is_err());
        assert!(resolve_www_path(root, "/a/../../etc/passwd").is_err());
    }

    #[test]
    fn extensionless_paths_fall_back_to_index() {
        assert!(should_fallback_to_index("/reports"));
        assert!(should_fallback_to_index("/"));
        assert!(!should_fallback_to_index("/app.js"));
    }
}
