//! HTTP shell: the single page, the session cookie and the JSON actions
//! behind the page's controls.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, FromRequestParts,
        Multipart, State,
    },
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::choices::{Mode, Options};
use crate::history::CaptionRecord;
use crate::pipeline::{Generation, Pipeline, Settings};
use crate::session::{Session, SessionHandle, SessionRegistry};
use crate::synth::SynthesisError;
use crate::upload::{IngestError, UploadedImage};

pub const SESSION_COOKIE: &str = "vd_session";

const INDEX_HTML: &str = include_str!("index.html");

pub struct AppState {
    pipeline: Pipeline,
    sessions: SessionRegistry,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Pipeline, sessions: SessionRegistry, max_upload_bytes: usize) -> Self {
        Self {
            pipeline,
            sessions,
            max_upload_bytes,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/api/options", get(options))
        .route("/api/image", post(upload_image))
        .route("/api/generate", post(generate))
        .route("/api/history", get(history))
        .route("/api/history/clear", post(clear_history))
        .route("/api/session/end", post(end_session))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("upload has no image field")]
    MissingImage,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("no image uploaded in this session")]
    NoImage,

    #[error("caption generation failed")]
    Synthesis(#[from] SynthesisError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Multipart(e) => e.status(),
            AppError::MissingImage | AppError::Ingest(IngestError::Empty) => StatusCode::BAD_REQUEST,
            AppError::Ingest(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::NoImage => StatusCode::CONFLICT,
            AppError::Synthesis(e) => {
                warn!(error = %e, "synthesis failed");
                StatusCode::BAD_GATEWAY
            }
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// The caller's session, created on the spot when the cookie is missing,
/// unknown or expired.
pub struct CurrentSession {
    id: Uuid,
    handle: SessionHandle,
    fresh: bool,
}

impl CurrentSession {
    /// `Set-Cookie` for sessions created by this request.
    fn cookie(&self) -> Option<[(HeaderName, HeaderValue); 1]> {
        if !self.fresh {
            return None;
        }
        let value = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, self.id
        );
        HeaderValue::from_str(&value).ok().map(|v| [(SET_COOKIE, v)])
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let requested = session_id(&parts.headers);
        let (id, handle, fresh) = state.sessions.resolve(requested);
        Ok(Self { id, handle, fresh })
    }
}

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

#[derive(Serialize)]
struct UploadResponse {
    mime: String,
    bytes: usize,
}

#[derive(Serialize)]
struct GenerateResponse {
    caption: Option<String>,
    mode: Mode,
    history: Vec<CaptionRecord>,
    processing_time_ms: u128,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<CaptionRecord>,
}

async fn index(session: CurrentSession) -> impl IntoResponse {
    (session.cookie(), Html(INDEX_HTML))
}

async fn options() -> Json<Options> {
    Json(Options::all())
}

async fn upload_image(session: CurrentSession, multipart: Multipart) -> Response {
    let result = store_upload(&session, multipart).await;
    (session.cookie(), result).into_response()
}

async fn store_upload(
    session: &CurrentSession,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;

        let image =
            UploadedImage::from_upload(data, content_type.as_deref(), file_name.as_deref())?;
        let response = UploadResponse {
            mime: image.mime(),
            bytes: image.byte_len(),
        };

        session.handle.lock().await.image = Some(image);
        debug!(session = %session.id, mime = %response.mime, bytes = response.bytes, "image stored");

        return Ok(Json(response));
    }

    Err(AppError::MissingImage)
}

async fn generate(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    settings: Result<Json<Settings>, JsonRejection>,
) -> Response {
    let result = match settings {
        Ok(Json(settings)) => run_generation(&state, &session, settings).await,
        Err(rejection) => return (session.cookie(), rejection).into_response(),
    };
    (session.cookie(), result).into_response()
}

async fn run_generation(
    state: &AppState,
    session: &CurrentSession,
    settings: Settings,
) -> Result<Json<GenerateResponse>, AppError> {
    let start = std::time::Instant::now();

    let mut guard = session.handle.lock().await;
    let Session { image, history } = &mut *guard;
    let image = image.as_ref().ok_or(AppError::NoImage)?;

    let caption = match state.pipeline.run(image, settings, history).await? {
        Generation::Captioned(record) => Some(record.content),
        Generation::NoDescription | Generation::EmptyCaption => None,
    };

    let elapsed = start.elapsed().as_millis();
    info!(
        session = %session.id,
        captioned = caption.is_some(),
        elapsed_ms = %elapsed,
        "generation finished"
    );

    Ok(Json(GenerateResponse {
        caption,
        mode: settings.mode,
        history: history.all().to_vec(),
        processing_time_ms: elapsed,
    }))
}

async fn history(session: CurrentSession) -> impl IntoResponse {
    let history = session.handle.lock().await.history.all().to_vec();
    (session.cookie(), Json(HistoryResponse { history }))
}

async fn clear_history(session: CurrentSession) -> impl IntoResponse {
    session.handle.lock().await.history.clear();
    debug!(session = %session.id, "history cleared");
    (
        session.cookie(),
        Json(HistoryResponse {
            history: Vec::new(),
        }),
    )
}

async fn end_session(State(state): State<Arc<AppState>>, session: CurrentSession) -> Response {
    state.sessions.end(session.id);
    let expired = format!("{}=; Path=/; Max-Age=0", SESSION_COOKIE);
    match HeaderValue::from_str(&expired) {
        Ok(value) => (StatusCode::NO_CONTENT, [(SET_COOKIE, value)]).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}
