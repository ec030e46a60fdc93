//! Response rendering
//!
//! JSON objects, `Table`s and watch streams. Errors are rendered by
//! `IntoResponse for Error`.

use axum::body::{Body, Bytes};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::{Response, StatusCode};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::status::Status;
use crate::table::Table;

const JSON_CONTENT_TYPE: &str = "application/json";

/// One event of a watch stream, as watch clients expect it on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent<T> {
    /// `ADDED`, `MODIFIED`, `DELETED`, `BOOKMARK` or `ERROR`
    #[serde(rename = "type")]
    pub event_type: String,
    /// The object, or a `Status` for `ERROR`
    pub object: T,
}

impl WatchEvent<Value> {
    /// `ERROR` event carrying a Status
    pub fn error(status: &Status) -> Self {
        Self {
            event_type: "ERROR".to_string(),
            object: serde_json::to_value(status).unwrap_or(Value::Null),
        }
    }
}

/// Stream of watch events from a member
pub type WatchStream = BoxStream<'static, Result<WatchEvent<Value>>>;

/// 200 with a JSON body
pub fn json_response<T: Serialize>(value: &T) -> Result<Response<Body>> {
    let body = serde_json::to_vec(value)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(Body::from(body))
        .map_err(Error::from)
}

/// 200 with a Table body, TypeMeta forced to `meta.k8s.io/v1` `Table`
pub fn table_response(table: Table) -> Result<Response<Body>> {
    json_response(&table.normalized())
}

/// Encode one watch event as a CRLF-terminated JSON line
pub fn encode_watch_event<T: Serialize>(event: &WatchEvent<T>) -> Result<Bytes> {
    let mut line = serde_json::to_vec(event)?;
    line.extend_from_slice(b"\r\n");
    Ok(Bytes::from(line))
}

/// Chunked watch response. Headers go out before the first event and every
/// event is written as its own chunk. A stream error is delivered as a
/// final `ERROR` event.
pub fn watch_response(events: WatchStream) -> Result<Response<Body>> {
    let body = events
        .scan(false, |failed, event| {
            let next = if *failed {
                None
            } else {
                let event = event.unwrap_or_else(|e| {
                    debug!(error = %e, "Ending watch with error event");
                    *failed = true;
                    WatchEvent::error(&e.to_status())
                });
                Some(encode_watch_event(&event).map_err(std::io::Error::other))
            };
            futures::future::ready(next)
        })
        .boxed();

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(TRANSFER_ENCODING, "chunked")
        .header(CACHE_CONTROL, "no-cache, private")
        .body(Body::from_stream(body))
        .map_err(Error::from)
}
