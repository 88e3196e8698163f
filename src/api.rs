use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::Error;
use crate::lifecycle::{ImageUpload, NoteService};
use crate::note::{Note, NoteDraft};
use crate::rate_limit::{MethodClass, RequestQuotas};

/// Headroom over the image cap so an oversized image is still read in full
/// and rejected with the explicit message instead of a framework 413.
const BODY_LIMIT_MARGIN: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<NoteService>,
    /// `None` disables throttling (tests, trusted deployments).
    pub quotas: Option<Arc<RequestQuotas>>,
    pub max_image_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_image_bytes + BODY_LIMIT_MARGIN;
    Router::new()
        .route("/api/notes", get(list_notes).post(create_note))
        .route(
            "/api/notes/:id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), throttle))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Error mapping ---

/// Boundary wrapper turning the core error taxonomy into HTTP responses.
/// Every failure body is JSON with a `message` field; dependency failures
/// are logged here and surfaced as a generic 500.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Note not found".to_string()),
            Error::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Error::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string()),
            Error::Upload(_) | Error::StoreUnavailable(_) | Error::Storage(_) | Error::Serde(_) => {
                error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

// --- Rate limiting middleware ---

async fn throttle(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(quotas) = &state.quotas {
        if let Some(class) = classify(req.method()) {
            let client = client_ip(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());
            quotas.check(class, client)?;
        }
    }
    Ok(next.run(req).await)
}

fn classify(method: &Method) -> Option<MethodClass> {
    if *method == Method::GET {
        Some(MethodClass::Read)
    } else if *method == Method::POST {
        Some(MethodClass::Create)
    } else if *method == Method::PUT || *method == Method::DELETE {
        Some(MethodClass::Mutate)
    } else {
        None
    }
}

/// First hop of `X-Forwarded-For` when present (the service runs behind a
/// trusted proxy in production), otherwise the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse().ok())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

// --- Handlers ---

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_notes(State(state): State<AppState>) -> Result<Json<Vec<Note>>, ApiError> {
    Ok(Json(state.notes.list().await?))
}

async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    Ok(Json(state.notes.get(&id).await?))
}

async fn create_note(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = NoteForm::read(multipart).await?;
    let note = state.notes.create(form.draft()?, form.upload).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Note>, ApiError> {
    let form = NoteForm::read(multipart).await?;
    let note = state.notes.update(&id, form.draft()?, form.upload).await?;
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.notes.delete(&id).await?;
    Ok(Json(json!({ "message": "Note deleted successfully" })))
}

// --- Multipart form ---

#[derive(Default)]
struct NoteForm {
    title: Option<String>,
    content: Option<String>,
    subtitle: Option<String>,
    upload: Option<ImageUpload>,
}

impl NoteForm {
    async fn read(mut multipart: Multipart) -> Result<Self, Error> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(read_error)? {
            let name = field.name().map(ToString::to_string);
            match name.as_deref() {
                Some("title") => form.title = Some(field.text().await.map_err(read_error)?),
                Some("content") => form.content = Some(field.text().await.map_err(read_error)?),
                Some("subtitle") => {
                    let text = field.text().await.map_err(read_error)?;
                    form.subtitle = (!text.is_empty()).then_some(text);
                }
                Some("image") => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(read_error)?;
                    // Browsers submit an empty part for a file input that
                    // was left blank; that is "no image", not a zero-byte
                    // upload.
                    if !bytes.is_empty() {
                        form.upload = Some(ImageUpload {
                            bytes: bytes.to_vec(),
                            content_type,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }

    fn draft(&self) -> Result<NoteDraft, Error> {
        Ok(NoteDraft {
            title: self
                .title
                .clone()
                .ok_or_else(|| Error::validation("title is required"))?,
            content: self
                .content
                .clone()
                .ok_or_else(|| Error::validation("content is required"))?,
            subtitle: self.subtitle.clone(),
        })
    }
}

fn read_error(err: axum::extract::multipart::MultipartError) -> Error {
    Error::validation(format!("could not read multipart body: {err}"))
}
