//! Turns raw chunks into [`LayerEvent`]s.
//!
//! Every chunk is treated as one complete JSON document.  Chunks that do not
//! parse, or that parse but carry no `LayerChange.new` string, are dropped
//! with a warning; the stream keeps going.

use crate::event::LayerEvent;
use crate::kanata::connection::{Chunk, ReadError};
use crate::traits::ChunkSource;
use log::{debug, warn};
use serde::Deserialize;

/// Why a chunk did not yield a [`LayerEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing LayerChange.new")]
    MissingLayer,
}

//  Minimal serde structs for the JSON we care about

/// Any message kanata sends.  Only `LayerChange` is interesting; other
/// top-level keys are ignored.
#[derive(Deserialize)]
struct ServerMessage {
    #[serde(rename = "LayerChange")]
    layer_change: Option<LayerChange>,
}

#[derive(Deserialize)]
struct LayerChange {
    new: Option<String>,
}

/// Decode one chunk.
///
/// Invalid UTF-8 is replaced rather than rejected, so a stray byte in a layer
/// name still shows up as something readable.
pub fn decode_chunk(bytes: &[u8]) -> Result<LayerEvent, DecodeError> {
    let text = String::from_utf8_lossy(bytes);
    let message: ServerMessage = serde_json::from_str(&text)?;
    message
        .layer_change
        .and_then(|change| change.new)
        .map(LayerEvent::new)
        .ok_or(DecodeError::MissingLayer)
}

/// Lazy sequence of layer events pulled from a [`ChunkSource`].
///
/// Yields `Ok(event)` per valid chunk and at most one `Err` for a failed
/// read.  Ends (`None`) on end-of-stream or after an error.
pub struct StreamDecoder<'a, S: ChunkSource> {
    source: &'a mut S,
    finished: bool,
}

impl<'a, S: ChunkSource> StreamDecoder<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            finished: false,
        }
    }
}

impl<S: ChunkSource> Iterator for StreamDecoder<'_, S> {
    type Item = Result<LayerEvent, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.source.read_chunk() {
                Ok(Chunk::Data(bytes)) => match decode_chunk(&bytes) {
                    Ok(event) => {
                        debug!("layer change: {}", event.layer_name);
                        return Some(Ok(event));
                    }
                    Err(e) => {
                        warn!(
                            "ignore invalid input from kanata: {} ({})",
                            e,
                            String::from_utf8_lossy(&bytes).trim()
                        );
                    }
                },
                Ok(Chunk::EndOfStream) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

//  Tests
