//! Structured logging setup, ported from the teacher's `utils/tracing.rs`:
//! a `Logging` level feeding a `tracing_subscriber` filter, plus an opt-in
//! `tower-http` `TraceLayer` for per-request spans at the most verbose level.

use std::time::Duration;

use axum::{extract::Request, response::Response, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, debug_span, field, Level, Span};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Logging {
    None,
    Info,
    Debug,
    All,
}

impl Default for Logging {
    fn default() -> Self {
        Logging::Info
    }
}

/// Initializes the global `tracing` subscriber for the calling binary.
///
/// `target` is the crate-local module path to scope the level filter to
/// (`"syncwatch_director"` or `"syncwatch_node"`), matching the teacher's
/// single-target filter in `utils/tracing.rs`.
pub fn init_tracing(target: &'static str, logging: Logging) {
    let (levelfilter, level) = match logging {
        Logging::None => (LevelFilter::OFF, Level::ERROR),
        Logging::Info => (LevelFilter::INFO, Level::INFO),
        Logging::Debug => (LevelFilter::DEBUG, Level::DEBUG),
        Logging::All => (LevelFilter::DEBUG, Level::DEBUG),
    };

    let filter = tracing_subscriber::filter::Targets::new().with_target(target, level);

    let format = time::format_description::parse(
        "[year]-[month padding:zero]-[day padding:zero] [hour]:[minute]:[second]",
    )
    .expect("hardcoded time format is valid");
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);

    let custom_layer = fmt::layer()
        .with_target(false)
        .with_timer(OffsetTime::new(offset, format))
        .with_filter(levelfilter)
        .with_filter(filter);

    tracing_subscriber::registry().with(custom_layer).init();
}

pub trait TraceLayerExt<S> {
    fn tracing_layer(self, logging: Logging) -> Self;
}

impl<S> TraceLayerExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn tracing_layer(self, logging: Logging) -> Self {
        if !matches!(logging, Logging::All) {
            return self;
        }

        self.layer(
            TraceLayer::new_for_http()
                .make_span_with(|_request: &Request| {
                    debug_span!("request", method = field::Empty, uri = field::Empty)
                })
                .on_request(|req: &Request, span: &Span| {
                    span.record("method", req.method().to_string());
                    span.record("uri", req.uri().to_string());
                    debug!("received request");
                })
                .on_response(|res: &Response, latency: Duration, _span: &Span| {
                    let status = res.status();
                    debug!("took {latency:?} to respond with status '{status}'");
                }),
        )
    }
}
