//! Bounded hardware polling.
//!
//! Timeouts and cancellation are ordinary outcomes of a poll, not errors:
//! [`poll_until`] reports them through [`PollOutcome`] and reserves `Err` for
//! failures of the probe itself.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::PollConfig;

use super::types::TaskError;

/// How often to probe and how much slack to give beyond the expected duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub margin: Duration,
}

impl PollSettings {
    /// Hard wall-clock limit for an operation expected to take `expected`.
    pub fn limit_for(&self, expected: Duration) -> Duration {
        expected.saturating_add(self.margin)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            margin: Duration::from_secs(config.timeout_margin_secs),
        }
    }
}

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { limit: Duration },
    Cancelled,
}

impl<T> PollOutcome<T> {
    /// Fold into the future error taxonomy, keeping timeout and cancellation apart.
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::TimedOut { limit } => Err(TaskError::Timeout { limit }),
            Self::Cancelled => Err(TaskError::Cancelled),
        }
    }
}

/// Probe until it yields a value, cancellation is observed, or the limit
/// derived from `expected` passes.
pub fn poll_until<T, C, P>(
    settings: &PollSettings,
    expected: Duration,
    is_cancelled: C,
    mut probe: P,
) -> Result<PollOutcome<T>, TaskError>
where
    C: Fn() -> bool,
    P: FnMut() -> Result<Option<T>, TaskError>,
{
    let limit = settings.limit_for(expected);
    let started = Instant::now();

    loop {
        if is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        if let Some(value) = probe()? {
            return Ok(PollOutcome::Ready(value));
        }

        let elapsed = started.elapsed();
        if elapsed >= limit {
            return Ok(PollOutcome::TimedOut { limit });
        }
        thread::sleep(settings.interval.min(limit - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(2),
            margin: Duration::from_millis(30),
        }
    }

    #[test]
    fn test_ready_after_a_few_probes() {
        let calls = Cell::new(0);
        let outcome = poll_until(&fast(), Duration::ZERO, || false, || {
            calls.set(calls.get() + 1);
            Ok((calls.get() == 3).then_some("there"))
        })
        .unwrap();
        assert_eq!(outcome, PollOutcome::Ready("there"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_times_out_with_margin() {
        let settings = fast();
        let started = Instant::now();
        let outcome: PollOutcome<()> =
            poll_until(&settings, Duration::from_millis(10), || false, || Ok(None)).unwrap();
        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                limit: Duration::from_millis(40)
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_cancel_checked_before_probe() {
        let outcome: PollOutcome<()> =
            poll_until(&fast(), Duration::ZERO, || true, || panic!("probed")).unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[test]
    fn test_probe_error_propagates() {
        let result: Result<PollOutcome<()>, _> = poll_until(&fast(), Duration::ZERO, || false, || {
            Err(TaskError::failed("encoder fault"))
        });
        assert_eq!(result, Err(TaskError::failed("encoder fault")));
    }

    #[test]
    fn test_into_result_mapping() {
        assert_eq!(PollOutcome::Ready(1).into_result(), Ok(1));
        assert_eq!(
            PollOutcome::<u8>::TimedOut {
                limit: Duration::from_secs(2)
            }
            .into_result(),
            Err(TaskError::Timeout {
                limit: Duration::from_secs(2)
            })
        );
        assert_eq!(
            PollOutcome::<u8>::Cancelled.into_result(),
            Err(TaskError::Cancelled)
        );
    }
}
