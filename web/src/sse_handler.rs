use crate::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;
use sse::Session;
use std::convert::Infallible;

/// GET a stream of timeline events
///
/// The first event is `connected` with the subscriber id, followed by
/// `new_post` events as posts are inserted and a `keepalive` every 30
/// seconds. Each event's data is one JSON object.
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "Event stream opened", content_type = "text/event-stream")
    )
)]
pub(crate) async fn events(State(app_state): State<AppState>) -> impl IntoResponse {
    let session = Session::open(&app_state.broadcaster);

    let stream = session
        .into_stream(app_state.shutdown.clone())
        .map(|frame| Ok::<_, Infallible>(Event::default().data(String::from_utf8_lossy(&frame))));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream),
    )
}
