//! Simulated microscope used by the binary.
//!
//! Stands in for hardware drivers: tasks "expose" by polling a timer, push
//! every frame to the save queue as a driver callback would, and return
//! the frames to the orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

use labflow_core::task::Metadata;
use labflow_core::{
    AcquisitionTask, ConnectionError, Connector, HardwareConnection, Payload, ProgressiveFuture,
    SaveHandle, TaskKind, TaskRunner,
};

const FRAME_SIDE: usize = 8;

/// Acquires `frames` synthetic frames of `exposure` each.
pub struct SimulatedTask {
    name: String,
    kind: TaskKind,
    exposure: Duration,
    frames: u32,
    saver: SaveHandle<Payload>,
    next_seq: Arc<AtomicU64>,
}

impl SimulatedTask {
    pub fn new(
        name: &str,
        kind: TaskKind,
        exposure: Duration,
        frames: u32,
        saver: SaveHandle<Payload>,
        next_seq: Arc<AtomicU64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            exposure,
            frames,
            saver,
            next_seq,
        }
    }
}

impl AcquisitionTask for SimulatedTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        self.kind.clone()
    }

    fn estimated_duration(&self) -> Duration {
        self.exposure * self.frames
    }

    fn acquire(&self, runner: &TaskRunner) -> ProgressiveFuture<Vec<Payload>> {
        let exposure = self.exposure;
        let frames = self.frames;
        let saver = self.saver.clone();
        let next_seq = Arc::clone(&self.next_seq);

        runner.run(&self.name, self.estimated_duration(), move |ctx| {
            let mut payloads = Vec::with_capacity(frames as usize);
            for index in 0..frames {
                ctx.check_cancelled()?;
                let started = Instant::now();
                let frame = ctx
                    .poll(exposure, || {
                        Ok((started.elapsed() >= exposure).then(|| synthetic_frame(index)))
                    })?
                    .into_result()?;

                let seq = next_seq.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = saver.push(seq, frame.clone()) {
                    warn!(seq, "Frame not queued for saving: {}", e);
                }
                payloads.push(frame);
                ctx.set_remaining(exposure * (frames - index - 1));
            }
            Ok(payloads)
        })
    }
}

/// Produces the light and electron correction records.
pub struct SimulatedOverlay {
    exposure: Duration,
}

impl AcquisitionTask for SimulatedOverlay {
    fn name(&self) -> &str {
        "overlay"
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Overlay
    }

    fn estimated_duration(&self) -> Duration {
        self.exposure
    }

    fn acquire(&self, runner: &TaskRunner) -> ProgressiveFuture<Vec<Payload>> {
        let exposure = self.exposure;
        runner.run("overlay", exposure, move |ctx| {
            ctx.set_message("registering modalities");
            std::thread::sleep(exposure);
            Ok(vec![correction("light", 0.4, -1.2), correction("electron", -0.1, 0.3)])
        })
    }
}

fn correction(modality: &str, dx: f64, dy: f64) -> Payload {
    let mut metadata = Metadata::new();
    metadata.insert("correction".to_string(), json!({ "modality": modality, "dx": dx, "dy": dy }));
    Payload::metadata_only(metadata)
}

fn synthetic_frame(index: u32) -> Payload {
    let data: Vec<u16> = (0..FRAME_SIDE * FRAME_SIDE)
        .map(|i| ((i as u32 * 31 + index * 7) % 4096) as u16)
        .collect();
    Payload::new(vec![FRAME_SIDE, FRAME_SIDE], data)
        .with_metadata("frame_index", json!(index))
}

/// A mixed correlative batch, deliberately submitted out of order.
pub fn correlative_batch(
    saver: &SaveHandle<Payload>,
    exposure: Duration,
) -> Vec<Arc<dyn AcquisitionTask>> {
    let next_seq = Arc::new(AtomicU64::new(0));
    let task = |name: &str, kind: TaskKind, frames: u32| -> Arc<dyn AcquisitionTask> {
        Arc::new(SimulatedTask::new(
            name,
            kind,
            exposure,
            frames,
            saver.clone(),
            Arc::clone(&next_seq),
        ))
    };

    vec![
        task("sem-se", TaskKind::Electron, 3),
        Arc::new(SimulatedOverlay { exposure }) as Arc<dyn AcquisitionTask>,
        task("fm-488", TaskKind::Fluorescence { excitation_nm: 488.0 }, 2),
        task("sem-bse", TaskKind::Composite, 2),
        task("brightfield", TaskKind::Optical, 1),
        task("fm-647", TaskKind::Fluorescence { excitation_nm: 647.0 }, 2),
    ]
}

/// Connection to the simulated microscope.
pub struct SimulatedConnection {
    target: String,
}

impl HardwareConnection for SimulatedConnection {
    fn target(&self) -> &str {
        &self.target
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn abort(&self) -> Result<(), ConnectionError> {
        info!(target = %self.target, "Simulated hardware stopped");
        Ok(())
    }
}

pub struct SimulatedConnector;

impl Connector for SimulatedConnector {
    fn open(&self, target: &str) -> Result<Arc<dyn HardwareConnection>, ConnectionError> {
        Ok(Arc::new(SimulatedConnection {
            target: target.to_string(),
        }))
    }
}
