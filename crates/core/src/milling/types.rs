use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// One step of a milling workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MillingPhase {
    /// Move the stage to the item.
    Positioning,
    /// Image-based realignment on the item's reference.
    Aligning,
    /// The milling actuation itself.
    Acting,
    /// Capture of the post-milling reference image.
    Imaging,
}

impl MillingPhase {
    pub const ALL: [MillingPhase; 4] = [
        MillingPhase::Positioning,
        MillingPhase::Aligning,
        MillingPhase::Acting,
        MillingPhase::Imaging,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positioning => "positioning",
            Self::Aligning => "aligning",
            Self::Acting => "acting",
            Self::Imaging => "imaging",
        }
    }
}

impl fmt::Display for MillingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named sequence of phases run on every work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MillingWorkflow {
    pub name: String,
    pub phases: Vec<MillingPhase>,
}

impl MillingWorkflow {
    pub fn new(name: impl Into<String>, phases: Vec<MillingPhase>) -> Self {
        Self {
            name: name.into(),
            phases,
        }
    }

    /// Move, align, mill and image.
    pub fn full(name: impl Into<String>) -> Self {
        Self::new(name, MillingPhase::ALL.to_vec())
    }
}

/// A site to be milled, with a status other components observe.
///
/// Clones share the same status.
#[derive(Debug)]
pub struct WorkItem<S> {
    name: String,
    status: Arc<Mutex<S>>,
}

impl<S> Clone for WorkItem<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            status: Arc::clone(&self.status),
        }
    }
}

impl<S> WorkItem<S> {
    pub fn new(name: impl Into<String>, status: S) -> Self {
        Self {
            name: name.into(),
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_status(&self, status: S) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl<S: Clone> WorkItem<S> {
    pub fn status(&self) -> S {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Status written onto an item once a given workflow completed on it.
#[derive(Debug, Clone)]
pub struct StatusTable<S> {
    statuses: HashMap<String, S>,
}

impl<S> Default for StatusTable<S> {
    fn default() -> Self {
        Self {
            statuses: HashMap::new(),
        }
    }
}

impl<S> StatusTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, workflow: impl Into<String>, status: S) -> Self {
        self.insert(workflow, status);
        self
    }

    pub fn insert(&mut self, workflow: impl Into<String>, status: S) {
        self.statuses.insert(workflow.into(), status);
    }

    pub fn get(&self, workflow: &str) -> Option<&S> {
        self.statuses.get(workflow)
    }
}
