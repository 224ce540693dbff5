//! The API router. Returns a composable `Router` mounted under `/api`.

use axum::http::header::{HeaderValue, CACHE_CONTROL};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use super::endpoints;
use super::types::ApiContext;

/// Build the router. Every route requires an `X-Caller-Id` header except
/// `/api/health`.
pub fn api_router(ctx: ApiContext) -> Router {
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/medication-events/:id/taken",
            post(endpoints::events::taken),
        )
        .route("/medication-events/:id/skip", post(endpoints::events::skip))
        .route(
            "/medication-events/archived",
            get(endpoints::events::archived),
        )
        .route(
            "/medication-events/daily-summaries/:date",
            get(endpoints::events::daily_summary),
        )
        .route(
            "/medication-events/trigger-daily-reset",
            post(endpoints::events::trigger_daily_reset),
        )
        .route(
            "/medication-views/today-buckets",
            get(endpoints::views::today_buckets),
        )
        .route(
            "/time-buckets/compute-schedule",
            post(endpoints::views::compute_schedule),
        )
        .route(
            "/patients/:id/time-preferences",
            get(endpoints::preferences::get_time_preferences)
                .put(endpoints::preferences::put_time_preferences),
        )
        .route(
            "/patients/:id/grace-config",
            get(endpoints::preferences::get_grace_config)
                .put(endpoints::preferences::put_grace_config),
        )
        .route("/medication-schedules", post(endpoints::schedules::create))
        .route(
            "/medication-schedules/:id/pause",
            post(endpoints::schedules::pause),
        )
        .route(
            "/medication-schedules/:id/resume",
            post(endpoints::schedules::resume),
        )
        .with_state(ctx)
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive());

    Router::new().nest("/api", routes)
}
