//! Line-delimited JSON capture records.
//!
//! Each non-empty line holds one segment: `{"origin":"server","data":"<hex>"}`.
//! This is the hand-off format between an external capture tool and the
//! replay driver.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::packet::{IpcPacket, Origin};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub origin: Origin,
    pub data: String,
}

impl CaptureRecord {
    pub fn from_packet(packet: &IpcPacket) -> Self {
        Self {
            origin: packet.origin,
            data: hex::encode(&packet.data),
        }
    }

    pub fn into_packet(self) -> Result<IpcPacket> {
        let bytes = hex::decode(self.data.trim())
            .map_err(|e| Error::InvalidCapture(format!("bad hex payload: {e}")))?;
        IpcPacket::parse(self.origin, bytes)
    }
}

/// Parse one capture line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<IpcPacket>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let record: CaptureRecord =
        serde_json::from_str(line).map_err(|e| Error::InvalidCapture(e.to_string()))?;
    record.into_packet().map(Some)
}

/// Stream a capture file into `tx` in file order.
///
/// Malformed lines are logged and skipped; returns the number of packets sent.
pub async fn stream_file(path: impl AsRef<Path>, tx: mpsc::Sender<IpcPacket>) -> Result<usize> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    let mut lines = BufReader::new(file).lines();
    let mut sent = 0;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_line(&line) {
            Ok(Some(packet)) => {
                if tx.send(packet).await.is_err() {
                    tracing::debug!(sent, "capture consumer dropped, stopping");
                    break;
                }
                sent += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(line = line_no, error = %e, "skipping capture record"),
        }
    }

    Ok(sent)
}
