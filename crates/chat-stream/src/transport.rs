//! Blocking delivery of a reply stream to a byte sink.

use std::io::{self, Write};

use tracing::debug;

use crate::bridge::DeliveryBridge;

/// Response headers for a server-sent-event reply.
pub const SSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("X-Accel-Buffering", "no"),
    ("Connection", "keep-alive"),
];

/// Writes every frame of `bridge` to `out`, flushing after each one.
///
/// Returns the number of frames written. A write failure is treated as the
/// consumer going away and returned as is; dropping the bridge afterwards
/// cancels the stream. On success the bridge is drained and its summary is
/// ready via [`DeliveryBridge::finish`].
pub fn pump<W: Write>(bridge: &mut DeliveryBridge, out: &mut W) -> io::Result<usize> {
    let mut written = 0;
    while let Some(unit) = bridge.next_unit() {
        if let Err(err) = out.write_all(unit.as_bytes()).and_then(|()| out.flush()) {
            debug!(
                message_id = %bridge.message_id(),
                frames = written,
                error = %err,
                "client went away; cancelling stream"
            );
            return Err(err);
        }
        written += 1;
    }
    Ok(written)
}
