use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::super::AppState;
use crate::core::presence::{Action, display_duration};

pub const NO_ACTION: &str = "MAA has no action since the server started.\n";

pub(crate) async fn query_endpoint(Path(agent): Path<String>, State(state): State<AppState>) -> String {
    match state.presence.query(&agent).await {
        Some(seen) => format!(
            "MAA last {} {} ago.\n",
            seen.action,
            display_duration(seen.elapsed)
        ),
        None => NO_ACTION.to_string(),
    }
}

/// Records the report. The reporter always gets 200 for a valid action, even
/// when the offline notice could not be mailed.
pub(crate) async fn report_endpoint(
    Path((agent, action)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    let Some(action) = Action::parse(&action) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Err(e) = state.presence.report(&agent, action).await {
        warn!("Failed to send offline notice for [{}]: {}", agent, e);
    }
    (StatusCode::OK, String::new()).into_response()
}
