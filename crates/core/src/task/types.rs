//! Task kinds and acquired payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Key/value metadata attached to a payload.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// What a task does, as far as scheduling and reconciliation care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Fluorescence capture: light excitation that bleaches the sample over time.
    Fluorescence { excitation_nm: f64 },
    /// Any other light-based capture (brightfield, reflected light, ...).
    Optical,
    /// Plain electron-beam capture.
    Electron,
    /// Multi-detector capture complementing an electron-beam capture.
    Composite,
    /// Cross-modality alignment; produces correction records for the others.
    Overlay,
    /// Not recognized by the ordering policy.
    Other { name: String },
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fluorescence { .. } => "fluorescence",
            Self::Optical => "optical",
            Self::Electron => "electron",
            Self::Composite => "composite",
            Self::Overlay => "overlay",
            Self::Other { name } => name,
        }
    }

    /// Captures that receive the optical correction record.
    pub fn is_light_based(&self) -> bool {
        matches!(self, Self::Fluorescence { .. } | Self::Optical)
    }

    /// Captures that receive the electron-beam correction record.
    pub fn is_electron_based(&self) -> bool {
        matches!(self, Self::Electron | Self::Composite)
    }

    pub fn is_correction_producer(&self) -> bool {
        matches!(self, Self::Overlay)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fluorescence { excitation_nm } => write!(f, "fluorescence@{}nm", excitation_nm),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One acquired frame with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Human-readable label. Back-filled with the task name when absent.
    pub description: Option<String>,
    pub metadata: Metadata,
    pub shape: Vec<usize>,
    pub data: Arc<[u16]>,
}

impl Payload {
    pub fn new(shape: Vec<usize>, data: impl Into<Arc<[u16]>>) -> Self {
        Self {
            description: None,
            metadata: Metadata::new(),
            shape,
            data: data.into(),
        }
    }

    /// A data-less payload that only carries metadata, e.g. a correction record.
    pub fn metadata_only(metadata: Metadata) -> Self {
        Self {
            description: None,
            metadata,
            shape: Vec::new(),
            data: Arc::from(Vec::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Merge `record` into this payload's metadata, overwriting existing keys.
    pub fn apply_metadata(&mut self, record: &Metadata) {
        self.metadata
            .extend(record.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}
