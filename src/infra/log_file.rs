//! JSON-lines log sink
//!
//! Subscribes to the pipeline's broadcast channel and appends one JSON object
//! per [`LogLine`] until every sender is gone.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::domain::stage::LogLine;
use crate::error::ShipResult;

/// Write every received line to `out`; returns the number of lines written.
///
/// A lagging receiver skips the lines it missed and keeps going.
pub async fn write_json_lines<W>(mut out: W, mut rx: broadcast::Receiver<LogLine>) -> ShipResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    loop {
        match rx.recv().await {
            Ok(line) => {
                let mut json = serde_json::to_vec(&line)?;
                json.push(b'\n');
                out.write_all(&json).await?;
                written += 1;
            }
            Err(RecvError::Lagged(n)) => {
                warn!(lagged = n, "Log file writer lagged, lines dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    out.flush().await?;
    Ok(written)
}
