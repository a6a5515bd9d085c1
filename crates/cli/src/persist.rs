//! JSON-lines persistence of acquired frames.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labflow_core::task::Metadata;
use labflow_core::{Payload, PersistError, Persistence};

/// One line of the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub seq: u64,
    pub description: Option<String>,
    pub shape: Vec<usize>,
    pub mean: f64,
    pub metadata: Metadata,
    pub saved_at: DateTime<Utc>,
}

impl FrameRecord {
    pub fn from_payload(seq: u64, payload: &Payload) -> Self {
        let mean = if payload.data.is_empty() {
            0.0
        } else {
            payload.data.iter().map(|&v| f64::from(v)).sum::<f64>() / payload.data.len() as f64
        };
        Self {
            seq,
            description: payload.description.clone(),
            shape: payload.shape.clone(),
            mean,
            metadata: payload.metadata.clone(),
            saved_at: Utc::now(),
        }
    }
}

/// Appends one JSON object per frame. Lines are written whole under a lock,
/// so concurrent workers never interleave.
pub struct JsonLinesStore {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesStore {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl Persistence<Payload> for JsonLinesStore {
    fn persist(&self, seq: u64, payload: Payload) -> Result<(), PersistError> {
        let record = FrameRecord::from_payload(seq, &payload);
        let mut line =
            serde_json::to_vec(&record).map_err(|e| PersistError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}
