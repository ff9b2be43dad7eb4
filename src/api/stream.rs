//! Live turn output as a chunked text body

use crate::turn::LiveRecord;
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderName;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Stream encoded live records until the turn drops its sender
pub fn live_response(records: mpsc::Receiver<LiveRecord>) -> Response {
    let body = ReceiverStream::new(records).map(|record| Ok::<_, Infallible>(record.encode()));

    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
