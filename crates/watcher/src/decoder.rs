// Path: crates/watcher/src/decoder.rs
//! Decoder for the telemetry feed's compact event stream.
//!
//! Each frame is a JSON array of alternating `command, payload` values:
//!
//! | command | meaning         | payload                          |
//! |---------|-----------------|----------------------------------|
//! | 3       | node added      | `[id, [name, ...], ...]`         |
//! | 4       | node removed    | `id`                             |
//! | 6       | block imported  | `[id, [height, hash, ...]]`      |
//! | 7       | block finalized | `[id, height, hash]`             |
//!
//! All other commands are ignored. A malformed record is dropped without affecting
//! the rest of the frame; a malformed frame is dropped whole.

use crate::chain_state::ChainStateStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use telewatch_telemetry::metrics;
use tokio::sync::{mpsc, watch};

const ADDED_NODE: u64 = 3;
const REMOVED_NODE: u64 = 4;
const IMPORTED_BLOCK: u64 = 6;
const FINALIZED_BLOCK: u64 = 7;

/// A single decoded telemetry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// A node joined the feed under `id`.
    NodeAdded {
        /// Feed-local node id.
        id: u64,
        /// Human-readable node name.
        name: String,
    },
    /// The node with `id` left the feed.
    NodeRemoved {
        /// Feed-local node id.
        id: u64,
    },
    /// The node imported a new best block.
    BlockImported {
        /// Feed-local node id.
        id: u64,
        /// Imported height.
        height: u64,
    },
    /// The node finalized a block.
    BlockFinalized {
        /// Feed-local node id.
        id: u64,
        /// Finalized height.
        height: u64,
    },
}

/// Why a record was dropped. Used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The whole frame was not a JSON array.
    MalformedFrame,
    /// The command slot did not hold a number.
    NonNumericCommand,
    /// The payload did not have the shape the command requires.
    MalformedPayload,
}

impl DropReason {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "malformed_frame",
            Self::NonNumericCommand => "non_numeric_command",
            Self::MalformedPayload => "malformed_payload",
        }
    }
}

/// Result of decoding one frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Records understood, in stream order.
    pub events: Vec<TelemetryEvent>,
    /// Records (or the whole frame) that were dropped.
    pub dropped: Vec<DropReason>,
}

fn as_number(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

/// Command codes must be integral; a fractional code matches nothing.
fn as_command(value: &Value) -> Option<Option<u64>> {
    if let Some(code) = value.as_u64() {
        return Some(Some(code));
    }
    let code = value.as_f64()?;
    Some((code.is_finite() && code >= 0.0 && code.fract() == 0.0).then(|| code as u64))
}

fn decode_record(command: u64, payload: &Value) -> Result<Option<TelemetryEvent>, DropReason> {
    let bad = DropReason::MalformedPayload;
    let event = match command {
        ADDED_NODE => {
            let id = payload.get(0).and_then(as_number).ok_or(bad)?;
            let name = payload
                .get(1)
                .and_then(|details| details.get(0))
                .and_then(Value::as_str)
                .ok_or(bad)?;
            TelemetryEvent::NodeAdded {
                id,
                name: name.to_string(),
            }
        }
        REMOVED_NODE => TelemetryEvent::NodeRemoved {
            id: as_number(payload).ok_or(bad)?,
        },
        IMPORTED_BLOCK => {
            let id = payload.get(0).and_then(as_number).ok_or(bad)?;
            let height = payload
                .get(1)
                .and_then(|block| block.get(0))
                .and_then(as_number)
                .ok_or(bad)?;
            TelemetryEvent::BlockImported { id, height }
        }
        FINALIZED_BLOCK => {
            let id = payload.get(0).and_then(as_number).ok_or(bad)?;
            // Some feed versions nest the height like the imported payload does.
            let height = payload
                .get(1)
                .and_then(|h| as_number(h).or_else(|| h.get(0).and_then(as_number)))
                .ok_or(bad)?;
            TelemetryEvent::BlockFinalized { id, height }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Decodes one raw frame into records.
pub fn decode_frame(bytes: &[u8]) -> DecodedFrame {
    let mut decoded = DecodedFrame::default();
    let messages: Vec<Value> = match serde_json::from_slice(bytes) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::debug!(target: "decoder", error = %e, "Dropping undecodable frame");
            decoded.dropped.push(DropReason::MalformedFrame);
            return decoded;
        }
    };
    // A trailing unpaired command is ignored.
    for pair in messages.chunks_exact(2) {
        let (Some(command), Some(payload)) = (pair.first(), pair.get(1)) else {
            continue;
        };
        let command = match as_command(command) {
            Some(Some(code)) => code,
            Some(None) => continue,
            None => {
                decoded.dropped.push(DropReason::NonNumericCommand);
                continue;
            }
        };
        match decode_record(command, payload) {
            Ok(Some(event)) => decoded.events.push(event),
            Ok(None) => {}
            Err(reason) => decoded.dropped.push(reason),
        }
    }
    decoded
}

/// Applies decoded telemetry to the [`ChainStateStore`].
///
/// Owns the id-to-name table exclusively: only the decoder task ever touches it.
#[derive(Debug)]
pub struct TelemetryDecoder {
    names: HashMap<u64, String>,
    store: Arc<ChainStateStore>,
}

impl TelemetryDecoder {
    /// Creates a decoder writing into `store`.
    pub fn new(store: Arc<ChainStateStore>) -> Self {
        Self {
            names: HashMap::new(),
            store,
        }
    }

    /// Name registered for `id`. Unknown ids resolve to the empty name.
    pub fn name_of(&self, id: u64) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or("")
    }

    /// Applies one event.
    pub fn apply(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::NodeAdded { id, name } => {
                tracing::trace!(target: "decoder", id, name = %name, "Node added");
                self.names.insert(id, name);
                self.store.node_added();
            }
            TelemetryEvent::NodeRemoved { id } => {
                tracing::trace!(target: "decoder", id, name = %self.name_of(id), "Node removed");
                self.names.remove(&id);
                self.store.node_removed();
            }
            TelemetryEvent::BlockImported { id, height } => {
                let name = self.name_of(id);
                self.store.record_imported(name, height);
            }
            TelemetryEvent::BlockFinalized { id, height } => {
                let name = self.name_of(id);
                self.store.record_finalized(name, height);
            }
        }
    }

    /// Decodes and applies one raw frame. Returns the number of records applied.
    pub fn apply_frame(&mut self, bytes: &[u8]) -> usize {
        let DecodedFrame { events, dropped } = decode_frame(bytes);
        for reason in dropped {
            metrics().inc_records_dropped(reason.as_str());
        }
        let applied = events.len();
        for event in events {
            self.apply(event);
        }
        applied
    }

    /// Consumes frames until the queue closes or shutdown is signalled.
    pub async fn run(mut self, mut frames: mpsc::Receiver<Vec<u8>>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(target: "decoder", "Telemetry decoder started");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                frame = frames.recv() => match frame {
                    Some(bytes) => {
                        self.apply_frame(&bytes);
                    }
                    None => break,
                },
            }
        }
        tracing::info!(target: "decoder", "Telemetry decoder stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_decodes_known_commands_and_skips_others() {
        let decoded = decode_frame(&frame(json!([
            0, 32,
            3, [7, ["alpha", "impl", "1.0"], "x"],
            6, [7, [120, "0xhash", 5]],
            7, [7, 118, "0xfin"],
            4, 7
        ])));
        assert!(decoded.dropped.is_empty());
        assert_eq!(
            decoded.events,
            vec![
                TelemetryEvent::NodeAdded {
                    id: 7,
                    name: "alpha".into()
                },
                TelemetryEvent::BlockImported { id: 7, height: 120 },
                TelemetryEvent::BlockFinalized { id: 7, height: 118 },
                TelemetryEvent::NodeRemoved { id: 7 },
            ]
        );
    }

    #[test]
    fn test_fractional_command_codes_are_ignored() {
        let decoded = decode_frame(br#"[3.5, [1, ["ghost"]], 6.9, [1, [100, "h"]], 6.0, [1, [12, "h"]]]"#);
        assert!(decoded.dropped.is_empty());
        assert_eq!(
            decoded.events,
            vec![TelemetryEvent::BlockImported { id: 1, height: 12 }]
        );
    }

    #[test]
    fn test_finalized_accepts_nested_height() {
        let decoded = decode_frame(&frame(json!([7, [1, [99, "0xfin"]]])));
        assert_eq!(
            decoded.events,
            vec![TelemetryEvent::BlockFinalized { id: 1, height: 99 }]
        );
    }

    #[test]
    fn test_bad_record_does_not_poison_frame() {
        let decoded = decode_frame(&frame(json!([
            "six", [1, [5]],
            6, "garbage",
            6, [1, [10, "0x"]]
        ])));
        assert_eq!(
            decoded.dropped,
            vec![DropReason::NonNumericCommand, DropReason::MalformedPayload]
        );
        assert_eq!(
            decoded.events,
            vec![TelemetryEvent::BlockImported { id: 1, height: 10 }]
        );
    }

    #[test]
    fn test_non_array_frame_is_dropped() {
        let decoded = decode_frame(b"{\"not\":\"an array\"}");
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.dropped, vec![DropReason::MalformedFrame]);
    }

    #[test]
    fn test_updates_reach_store_by_name() {
        let store = Arc::new(ChainStateStore::new());
        let mut decoder = TelemetryDecoder::new(store.clone());
        decoder.apply_frame(&frame(json!([3, [1, ["alpha"]], 3, [2, ["beta"]]])));
        decoder.apply_frame(&frame(json!([6, [1, [100, "h"]], 6, [2, [104, "h"]], 7, [1, 98, "f"]])));
        decoder.apply_frame(&frame(json!([6, [1, [90, "h"]]])));

        assert_eq!(store.heights("alpha").imported, 100);
        assert_eq!(store.heights("alpha").finalized, 98);
        assert_eq!(store.heights("beta").imported, 104);
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_unknown_and_removed_ids_land_on_empty_name() {
        let store = Arc::new(ChainStateStore::new());
        let mut decoder = TelemetryDecoder::new(store.clone());
        decoder.apply_frame(&frame(json!([3, [1, ["alpha"]], 4, 1, 6, [1, [50, "h"]], 6, [9, [60, "h"]]])));

        assert_eq!(decoder.name_of(1), "");
        assert_eq!(store.heights("alpha").imported, 0);
        assert_eq!(store.heights("").imported, 60);
        assert_eq!(store.node_count(), 0);
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_closed() {
        let store = Arc::new(ChainStateStore::new());
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(TelemetryDecoder::new(store.clone()).run(rx, shutdown_rx));

        tx.send(frame(json!([3, [4, ["gamma"]]]))).await.unwrap();
        tx.send(frame(json!([6, [4, [12, "h"]]]))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(store.heights("gamma").imported, 12);
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_sender_is_gone() {
        let store = Arc::new(ChainStateStore::new());
        let (_tx, rx) = mpsc::channel::<Vec<u8>>(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(TelemetryDecoder::new(store).run(rx, shutdown_rx));
        drop(shutdown_tx);
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
