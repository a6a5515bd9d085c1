use crate::future::TaskError;
use crate::task::{Payload, TaskKind};

/// Payloads produced by one task of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    /// Position of the task in the submitted list.
    pub index: usize,
    pub task: String,
    pub kind: TaskKind,
    pub payloads: Vec<Payload>,
}

/// Results of a batch, keyed by originating task and ordered by the
/// position the task had in the submitted list, whatever order it ran in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionResults {
    entries: Vec<ResultEntry>,
}

impl AcquisitionResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry at its input position, replacing one with the same index.
    pub fn insert(&mut self, entry: ResultEntry) {
        match self.entries.binary_search_by_key(&entry.index, |e| e.index) {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ResultEntry] {
        &mut self.entries
    }

    pub fn into_entries(self) -> Vec<ResultEntry> {
        self.entries
    }

    /// Payloads of the task submitted at `index`.
    pub fn for_index(&self, index: usize) -> Option<&[Payload]> {
        self.entries
            .binary_search_by_key(&index, |e| e.index)
            .ok()
            .map(|pos| self.entries[pos].payloads.as_slice())
    }

    /// Payloads of the first task named `task`.
    pub fn get(&self, task: &str) -> Option<&[Payload]> {
        self.entries
            .iter()
            .find(|e| e.task == task)
            .map(|e| e.payloads.as_slice())
    }

    /// Whether any entry came from a task of `kind`'s family.
    pub fn contains_kind(&self, kind: &TaskKind) -> bool {
        self.entries.iter().any(|e| &e.kind == kind)
    }

    /// Remove and return every entry matching `predicate`, keeping order.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<ResultEntry>
    where
        F: FnMut(&ResultEntry) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| predicate(e));
        self.entries = kept;
        removed
    }

    /// All payloads flattened in entry order.
    pub fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.entries.iter().flat_map(|e| e.payloads.iter())
    }
}

/// Value of a batch's top-level future.
///
/// `error` is set when the batch stopped early after at least one task
/// succeeded; a batch that stopped before producing anything fails its
/// future with the error instead.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionOutcome {
    pub results: AcquisitionResults,
    pub error: Option<TaskError>,
}

impl AcquisitionOutcome {
    /// Every task ran to completion.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}
