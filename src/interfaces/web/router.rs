use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, header},
    middleware,
    middleware::Next,
    routing::get,
};

use super::AppState;
use super::handlers::presence;

pub(crate) fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/query/{agent}", get(presence::query_endpoint))
        .route(
            "/report/{agent}/{action}",
            get(presence::report_endpoint).post(presence::report_endpoint),
        )
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
