//! Metadata reconciliation across the results of one batch.
//!
//! An overlay task produces two correction records: the first aligns
//! light-based captures, the second electron-based ones. The records are
//! folded into the other results and the overlay entry itself is dropped.

use tracing::{debug, warn};

use crate::task::Metadata;

use super::types::AcquisitionResults;

/// Number of records a correction producer must yield.
const CORRECTION_RECORDS: usize = 2;

/// Apply corrections and back-fill labels in place.
pub fn reconcile(results: &mut AcquisitionResults) {
    let mut producers = results.remove_where(|e| e.kind.is_correction_producer());

    if !producers.is_empty() {
        let producer = producers.remove(0);
        for extra in &producers {
            warn!(
                task = %extra.task,
                used = %producer.task,
                "Ignoring additional correction producer"
            );
        }

        if producer.payloads.len() == CORRECTION_RECORDS {
            let light = &producer.payloads[0].metadata;
            let electron = &producer.payloads[1].metadata;
            apply_corrections(results, light, electron);
            debug!(task = %producer.task, "Applied correction records");
        } else {
            warn!(
                task = %producer.task,
                records = producer.payloads.len(),
                "Expected {} correction records, leaving results uncorrected",
                CORRECTION_RECORDS
            );
        }
    }

    backfill_descriptions(results);
}

fn apply_corrections(results: &mut AcquisitionResults, light: &Metadata, electron: &Metadata) {
    for entry in results.entries_mut() {
        let record = if entry.kind.is_light_based() {
            light
        } else if entry.kind.is_electron_based() {
            electron
        } else {
            continue;
        };
        for payload in &mut entry.payloads {
            payload.apply_metadata(record);
        }
    }
}

fn backfill_descriptions(results: &mut AcquisitionResults) {
    for entry in results.entries_mut() {
        for payload in &mut entry.payloads {
            if payload.description.is_none() {
                payload.description = Some(entry.task.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ResultEntry;
    use crate::task::{Payload, TaskKind};
    use serde_json::json;

    fn record(key: &str, value: f64) -> Payload {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), json!(value));
        Payload::metadata_only(metadata)
    }

    fn entry(index: usize, task: &str, kind: TaskKind, payloads: Vec<Payload>) -> ResultEntry {
        ResultEntry {
            index,
            task: task.to_string(),
            kind,
            payloads,
        }
    }

    fn frame() -> Payload {
        Payload::new(vec![2, 2], vec![0u16; 4])
    }

    #[test]
    fn test_corrections_applied_and_overlay_removed() {
        let mut results = AcquisitionResults::new();
        results.insert(entry(0, "optical", TaskKind::Optical, vec![frame()]));
        results.insert(entry(1, "sem", TaskKind::Electron, vec![frame()]));
        results.insert(entry(
            2,
            "overlay",
            TaskKind::Overlay,
            vec![record("shift_light", 1.5), record("shift_electron", -0.5)],
        ));

        reconcile(&mut results);

        assert_eq!(results.len(), 2);
        assert!(!results.contains_kind(&TaskKind::Overlay));

        let optical = &results.get("optical").unwrap()[0];
        assert_eq!(optical.metadata.get("shift_light"), Some(&json!(1.5)));
        assert!(optical.metadata.get("shift_electron").is_none());

        let sem = &results.get("sem").unwrap()[0];
        assert_eq!(sem.metadata.get("shift_electron"), Some(&json!(-0.5)));
        assert!(sem.metadata.get("shift_light").is_none());
    }

    #[test]
    fn test_without_overlay_only_backfills() {
        let mut results = AcquisitionResults::new();
        results.insert(entry(
            0,
            "fm-488",
            TaskKind::Fluorescence { excitation_nm: 488.0 },
            vec![frame(), frame().with_description("custom")],
        ));
        let before = results.clone();

        reconcile(&mut results);

        let payloads = results.get("fm-488").unwrap();
        assert_eq!(payloads[0].description.as_deref(), Some("fm-488"));
        assert_eq!(payloads[1].description.as_deref(), Some("custom"));
        assert_eq!(payloads[0].metadata, before.entries()[0].payloads[0].metadata);
    }

    #[test]
    fn test_composite_takes_electron_record() {
        let mut results = AcquisitionResults::new();
        results.insert(entry(0, "bse", TaskKind::Composite, vec![frame()]));
        results.insert(entry(
            1,
            "overlay",
            TaskKind::Overlay,
            vec![record("light", 1.0), record("electron", 2.0)],
        ));

        reconcile(&mut results);
        let bse = &results.get("bse").unwrap()[0];
        assert_eq!(bse.metadata.get("electron"), Some(&json!(2.0)));
    }

    #[test]
    fn test_malformed_producer_is_removed_without_correction() {
        let mut results = AcquisitionResults::new();
        results.insert(entry(0, "optical", TaskKind::Optical, vec![frame()]));
        results.insert(entry(1, "overlay", TaskKind::Overlay, vec![record("only", 1.0)]));

        reconcile(&mut results);

        assert_eq!(results.len(), 1);
        assert!(results.get("optical").unwrap()[0].metadata.is_empty());
    }

    #[test]
    fn test_first_producer_wins() {
        let mut results = AcquisitionResults::new();
        results.insert(entry(0, "optical", TaskKind::Optical, vec![frame()]));
        results.insert(entry(
            1,
            "overlay-a",
            TaskKind::Overlay,
            vec![record("source", 1.0), record("source", 1.0)],
        ));
        results.insert(entry(
            2,
            "overlay-b",
            TaskKind::Overlay,
            vec![record("source", 2.0), record("source", 2.0)],
        ));

        reconcile(&mut results);

        assert_eq!(results.len(), 1);
        let optical = &results.get("optical").unwrap()[0];
        assert_eq!(optical.metadata.get("source"), Some(&json!(1.0)));
    }
}
