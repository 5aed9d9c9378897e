use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use tracing::debug;

use crate::handlers::http::RequestBody;

/// Request bodies larger than this are rejected unread.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Collect a request body, or `None` if it is too large or the connection
/// failed mid-read.
pub async fn read_body(body: RequestBody) -> Option<Bytes> {
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            None
        }
    }
}
