use std::{any::Any, net::SocketAddr};

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth,
    config::{AppConfig, CorsMode},
    error::AppError,
    state::AppState,
};

pub fn build_app(state: AppState) -> Router {
    let cors = state.config.cors.clone();
    let api = Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .route("/health", get(health).post(health)),
        )
        .fallback(not_found)
        .with_state(state);
    with_middleware(api, &cors)
}

/// Cross-cutting layers, innermost first: panic guard, CORS, preflight
/// short-circuit, request tracing.
fn with_middleware(router: Router, cors: &CorsMode) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(cors))
        .layer(middleware::from_fn(preflight))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = res.status();
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn not_found() -> AppError {
    AppError::NotFound("Not found".into())
}

pub fn cors_layer(mode: &CorsMode) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);
    match mode {
        CorsMode::Any => base.allow_origin(cors::Any),
        CorsMode::AllowList(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::warn!(origin = %o, error = %e, "ignoring unusable CORS origin");
                        None
                    }
                })
                .collect();
            base.allow_origin(AllowOrigin::list(origins))
        }
    }
}

/// Every OPTIONS request ends as an empty 204, keeping whatever CORS headers
/// the inner layers attached.
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }
    let (mut parts, _) = next.run(req).await.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
