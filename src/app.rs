use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::aggregate::{self, RankedEntry};
use crate::auth::ManagerGate;
use crate::cache::DatasetCache;
use crate::chat::{self, ChatContext, ChatReply};
use crate::config::Config;
use crate::downloader;
use crate::error::{DashboardError, Result};
use crate::graph::{self, GraphOptions};
use crate::record::{DateFilter, Dimension, Measure, SalesDataset};
use crate::report;
use crate::view::{self, ChartKind, Profile, ViewContext, ViewModel};

pub struct AppState {
    cache: Mutex<DatasetCache>,
    config: Config,
    gate: ManagerGate,
    /// Unlock tokens and when they were issued
    unlocked: Mutex<HashMap<Uuid, Instant>>,
    token_ttl: Duration,
}

/// Live unlock tokens kept at most; the oldest is dropped first
const MAX_TOKENS: usize = 256;

#[derive(Deserialize, Default)]
pub struct RangeQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
pub struct ViewQuery {
    profile: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    dimension: Option<String>,
    key: Option<String>,
    threshold: Option<f64>,
    token: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct RankQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    measure: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    question: String,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
    records: Option<usize>,
}

#[derive(Serialize)]
struct UnlockResponse {
    status: String,
    token: Uuid,
    provider: String,
}

/// Error body returned by every endpoint
pub struct ApiError(DashboardError);

impl From<DashboardError> for ApiError {
    fn from(e: DashboardError) -> Self {
        ApiError(e)
    }
}

pub fn error_status(e: &DashboardError) -> StatusCode {
    match e {
        DashboardError::Schema { .. }
        | DashboardError::Parse { .. }
        | DashboardError::DivisionUndefined(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DashboardError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DashboardError::AuthenticationFailure(_) => StatusCode::FORBIDDEN,
        DashboardError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DashboardError::Config(_) | DashboardError::Render(_) | DashboardError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            error_status(&self.0),
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(self.0.user_message()),
                records: None,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<DateFilter> {
    match (start, end) {
        (None, None) => None,
        (start, end) => Some(DateFilter::new(
            start.unwrap_or(NaiveDate::MIN),
            end.unwrap_or(NaiveDate::MAX),
        )),
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Series, chart type and title for a named chart
pub fn chart_series(
    name: &str,
    data: &SalesDataset,
) -> Option<(Vec<aggregate::GroupTotal>, ChartKind, String)> {
    let amount = Measure::Amount;
    let chart = match name {
        "weekday" => (
            aggregate::day_of_week_bucket(data, amount).entries,
            ChartKind::Line,
            "Sales by weekday".to_string(),
        ),
        "month" => (
            aggregate::month_bucket(data, amount).entries,
            ChartKind::Line,
            "Sales by month".to_string(),
        ),
        "hour" => (
            aggregate::hour_bucket(data, amount).entries,
            ChartKind::Bar,
            "Sales by hour".to_string(),
        ),
        "top-products" => (
            aggregate::top_by(data, Dimension::Product, amount, Some(5)),
            ChartKind::Pie,
            "Top 5 products".to_string(),
        ),
        other => {
            let dimension = Dimension::from_name(other)?;
            (
                aggregate::top_by(data, dimension, amount, None),
                ChartKind::Bar,
                format!("Sales by {}", dimension.label().to_lowercase()),
            )
        }
    };
    Some(chart)
}

impl AppState {
    pub fn new(config: Config, gate: ManagerGate) -> Self {
        AppState {
            cache: Mutex::new(DatasetCache::new(config.header_aliases())),
            token_ttl: config.token_ttl(),
            config,
            gate,
            unlocked: Mutex::new(HashMap::new()),
        }
    }

    /// The current dataset, loading the configured file on first use
    pub fn dataset(&self) -> Result<Arc<SalesDataset>> {
        let mut cache = locked(&self.cache);
        match cache.current() {
            Some(data) => Ok(data),
            None => cache.get_or_load(&self.config.data_path()),
        }
    }

    pub fn reload(&self) -> Result<Arc<SalesDataset>> {
        locked(&self.cache).reload(&self.config.data_path())
    }

    pub fn upload(&self, name: &str, bytes: &[u8]) -> Result<Arc<SalesDataset>> {
        locked(&self.cache).replace_with_upload(name, bytes)
    }

    /// Whether `token` was issued by the gate and has not expired
    pub fn is_unlocked(&self, token: Option<Uuid>) -> bool {
        let Some(token) = token else {
            return false;
        };
        let mut tokens = locked(&self.unlocked);
        let expired = match tokens.get(&token) {
            Some(issued) => issued.elapsed() >= self.token_ttl,
            None => return false,
        };
        if expired {
            tokens.remove(&token);
        }
        !expired
    }

    /// Runs the face gate and hands out a token on success
    pub fn unlock(&self, photo: Vec<u8>) -> Result<(Uuid, String)> {
        let grant = self.gate.check(photo)?;
        let token = Uuid::new_v4();
        let mut tokens = locked(&self.unlocked);
        let ttl = self.token_ttl;
        tokens.retain(|_, issued| issued.elapsed() < ttl);
        if tokens.len() >= MAX_TOKENS {
            let oldest = tokens.iter().min_by_key(|(_, issued)| **issued).map(|(t, _)| *t);
            if let Some(oldest) = oldest {
                tokens.remove(&oldest);
            }
        }
        tokens.insert(token, Instant::now());
        Ok((token, grant.provider))
    }

    pub fn view(&self, query: &ViewQuery) -> Result<ViewModel> {
        let profile = match &query.profile {
            Some(name) => Profile::from_name(name).ok_or_else(|| {
                DashboardError::BadRequest(format!("unknown profile '{}'", name))
            })?,
            None => Profile::SalesDirector,
        };
        let mut ctx = ViewContext::new(profile)
            .with_range(date_range(query.start, query.end))
            .with_threshold(query.threshold.or(self.config.alerts.threshold))
            .unlocked(self.is_unlocked(query.token));
        if let (Some(dimension), Some(key)) = (&query.dimension, &query.key) {
            ctx = ctx.with_entity(parse_dimension(dimension)?, key);
        }
        Ok(view::build_view(&self.dataset()?, &ctx))
    }

    pub fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let ctx = ChatContext {
            range: date_range(request.start, request.end),
            alert_threshold: self.config.alerts.threshold,
        };
        Ok(chat::answer(&request.question, &self.dataset()?, &ctx))
    }
}

fn parse_dimension(name: &str) -> Result<Dimension> {
    Dimension::from_name(name)
        .ok_or_else(|| DashboardError::BadRequest(format!("unknown dimension '{}'", name)))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_landing))
        .route("/api/view", get(get_view))
        .route("/api/rank/:dimension", get(get_rank))
        .route("/api/chat", post(post_chat))
        .route("/api/chart/:name", get(get_chart))
        .route("/api/report.pdf", get(get_report))
        .route("/api/export.xlsx", get(get_export))
        .route("/api/upload", post(upload_dataset))
        .route("/api/reload", post(reload_dataset))
        .route("/api/unlock", post(unlock_manager))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind = config.server.bind.clone();
    let gate = config.manager_gate()?;
    let state = Arc::new(AppState::new(config, gate));

    match state.dataset() {
        Ok(data) => info!("serving {} sales records", data.len()),
        Err(e) => warn!("starting without data: {}", e.user_message()),
    }

    let listener = TcpListener::bind(&bind).await?;
    println!("Listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn serve_landing() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

async fn get_view(
    Query(query): Query<ViewQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ViewModel>> {
    Ok(Json(state.view(&query)?))
}

async fn get_rank(
    Path(dimension): Path<String>,
    Query(query): Query<RankQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<RankedEntry>>> {
    let dimension = parse_dimension(&dimension)?;
    let measure = match query.measure.as_deref() {
        Some("target") | Some("meta") => Measure::Target,
        _ => Measure::Amount,
    };
    let data = aggregate::filter_range(&state.dataset()?, date_range(query.start, query.end));
    Ok(Json(aggregate::rank(&data, dimension, measure)))
}

async fn post_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    Ok(Json(state.chat(&request)?))
}

async fn get_chart(
    Path(name): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let data = aggregate::filter_range(&state.dataset()?, date_range(query.start, query.end));
    if name == "product-by-branch" {
        let table =
            aggregate::cross_sum(&data, Dimension::Product, Dimension::Branch, Measure::Amount);
        let options = GraphOptions::new("Sales by product and branch", ChartKind::Bar);
        let png = graph::render_grouped_png(&table, &options)?;
        return Ok(([(header::CONTENT_TYPE, "image/png")], Bytes::from(png)).into_response());
    }
    let Some((series, kind, title)) = chart_series(&name, &data) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let png = graph::render_png(&series, &GraphOptions::new(&title, kind))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], Bytes::from(png)).into_response())
}

async fn get_report(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let pdf = report::build_report(
        &state.dataset()?,
        date_range(query.start, query.end),
        Local::now().date_naive(),
    )?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"sales-report.pdf\""),
        ],
        Bytes::from(pdf),
    )
        .into_response())
}

async fn get_export(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let data = aggregate::filter_range(&state.dataset()?, date_range(query.start, query.end));
    let xlsx = downloader::to_xlsx(&data)?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"sales.xlsx\""),
        ],
        Bytes::from(xlsx),
    )
        .into_response())
}

async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<StatusResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    let unreadable = |e: MultipartError| DashboardError::BadRequest(e.body_text());
    while let Some(field) = multipart.next_field().await.map_err(unreadable)? {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field.bytes().await.map_err(unreadable)?.to_vec();
            upload = Some((name, bytes));
        }
    }

    let Some((name, bytes)) = upload.filter(|(_, b)| !b.is_empty()) else {
        return Err(DashboardError::BadRequest("no file data received".into()).into());
    };

    let data = state.upload(&name, &bytes)?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        message: Some(format!("Loaded {}", name)),
        records: Some(data.len()),
    }))
}

async fn reload_dataset(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let data = state.reload()?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        message: None,
        records: Some(data.len()),
    }))
}

async fn unlock_manager(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<UnlockResponse>> {
    let photo = body.to_vec();
    let (token, provider) = tokio::task::spawn_blocking(move || state.unlock(photo))
        .await
        .map_err(|e| DashboardError::SourceUnavailable(e.to_string()))??;
    Ok(Json(UnlockResponse {
        status: "ok".to_string(),
        token,
        provider,
    }))
}
