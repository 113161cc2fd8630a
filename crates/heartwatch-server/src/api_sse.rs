//! SSE alert stream handler.

use crate::AppState;
use axum::{
    extract::Extension,
    response::{sse::Event, Sse},
};
use futures_util::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Handler for `GET /events/alerts`.
///
/// Streams every liveness alert raised after the client connects. The
/// stream ends when the server begins shutting down.
pub async fn get_alert_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.alert_tx.subscribe();

    let alerts = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(alert) => match Event::default().event("alert").json_data(&alert) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::error!("failed to serialize alert event: {}", e);
                None
            }
        },
        Err(lagged) => {
            tracing::warn!(
                error = %lagged,
                "alert SSE stream lagged; alerts were dropped for this subscriber"
            );
            None
        }
    });

    let alerts = futures_util::StreamExt::take_until(alerts, state.shutdown.clone().cancelled_owned());

    Sse::new(alerts).keep_alive(axum::response::sse::KeepAlive::default())
}
