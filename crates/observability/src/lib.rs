//! Logging setup and per-request correlation for focuslog binaries.
//!
//! `init_tracing` installs the global subscriber: an `EnvFilter` (overridable
//! with `RUST_LOG`), a compact or JSON stdout layer, and optionally a daily
//! rolling JSON file under `log_dir`. The request-id pieces plug into
//! tower-http so every HTTP span carries an `x-request-id` ULID.

use std::path::PathBuf;

use http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::MakeSpan;
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub const DEFAULT_FILTER: &str = "warn,focuslog_server=info,focuslog_db=info";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
const LOG_FILE_PREFIX: &str = "focuslog.log";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Emit JSON lines on stdout instead of the compact human format.
    pub json: bool,
    /// Also write daily-rotated JSON logs here.
    pub log_dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            log_dir: None,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns the file writer's guard when `log_dir` is set; keep it alive for
/// the life of the process or buffered lines are lost on exit.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.json {
        layers.push(fmt::layer().json().with_current_span(true).boxed());
    } else {
        layers.push(fmt::layer().compact().with_target(true).boxed());
    }

    let guard = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(guard)
}

/// Generates a fresh ULID for requests that arrive without an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidRequestId;

impl MakeRequestId for UlidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&ulid::Ulid::new().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layers that assign an `x-request-id` (keeping a caller-supplied one) and
/// echo it on the response.
pub fn request_id_layers() -> (SetRequestIdLayer<UlidRequestId>, PropagateRequestIdLayer) {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    (
        SetRequestIdLayer::new(header.clone(), UlidRequestId),
        PropagateRequestIdLayer::new(header),
    )
}

/// Span per HTTP request, tagged with method, path and request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id,
        )
    }
}
