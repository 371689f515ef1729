//! The permissive CORS policy shared by both binaries' HTTP surfaces (§6).

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

pub fn permissive() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ORIGIN,
            header::ACCEPT,
            header::RANGE,
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
        ])
}
