// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The background install worker.
//!
//! Switch I/O is slow; install and clear-all jobs run on a dedicated
//! worker thread fed through an ordered queue so the event dispatcher
//! stays responsive. Fenced jobs sleep a short coalescing interval and
//! then compare their captured generation against the live counter: a
//! burst of topology events collapses into the single newest install,
//! stale jobs return before touching any switch.

use crate::pipeline::{install_classifier, reset_switches};
use net::{SwitchBackend, SwitchId};
use policy::Classifier;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tracing::{debug, error};

use crate::errors::RuntimeError;

/// Coalescing interval a fenced job waits before re-checking the
/// generation counter.
pub const COALESCE_DELAY: Duration = Duration::from_millis(100);

// capacity of the job channel; updates are rare compared to its depth
const JOB_CHANNEL_CAPACITY: usize = 100;

/// A unit of switch work. `fence` carries the generation that issued the
/// job; `None` disables fencing (policy-change recompiles are never
/// stale by construction).
pub(crate) enum InstallJob {
    Install {
        classifier: Classifier,
        switches: Vec<SwitchId>,
        fence: Option<u64>,
    },
    ClearAll {
        switches: Vec<SwitchId>,
        fence: Option<u64>,
    },
    Finish,
}

/// Handle to the worker thread.
pub struct InstallWorker {
    tx: Sender<InstallJob>,
    handle: Option<JoinHandle<()>>,
}

impl InstallWorker {
    /// Spawn the worker thread.
    pub(crate) fn start(
        backend: Arc<dyn SwitchBackend>,
        generation: Arc<AtomicU64>,
    ) -> Result<InstallWorker, RuntimeError> {
        let (tx, rx) = channel::<InstallJob>(JOB_CHANNEL_CAPACITY);
        let worker_loop = move || run_jobs(rx, backend, generation);
        let handle = thread::Builder::new()
            .name("flow-install".to_string())
            .spawn(worker_loop)
            .map_err(|_| RuntimeError::Worker("failure spawning worker thread"))?;
        Ok(InstallWorker {
            tx,
            handle: Some(handle),
        })
    }

    /// Queue a job. Jobs run in submission order.
    pub(crate) fn submit(&self, job: InstallJob) {
        if self.tx.try_send(job).is_err() {
            error!("install worker queue unavailable; job dropped");
        }
    }

    /// Terminate the worker after draining queued jobs.
    ///
    /// # Errors
    /// Fails if the channel has been dropped or the thread cannot be
    /// joined.
    pub fn finish(&mut self) -> Result<(), RuntimeError> {
        debug!("requesting install worker to stop..");
        self.tx
            .try_send(InstallJob::Finish)
            .map_err(|_| RuntimeError::Worker("error sending over job channel"))?;
        let handle = self.handle.take();
        if let Some(handle) = handle {
            debug!("waiting for the install worker to terminate..");
            handle
                .join()
                .map_err(|_| RuntimeError::Worker("error joining worker thread"))?;
            debug!("install worker ended successfully");
            Ok(())
        } else {
            Err(RuntimeError::Worker("no handle"))
        }
    }
}

fn run_jobs(mut rx: Receiver<InstallJob>, backend: Arc<dyn SwitchBackend>, current: Arc<AtomicU64>) {
    while let Some(job) = rx.blocking_recv() {
        match job {
            InstallJob::Finish => break,
            InstallJob::Install {
                classifier,
                switches,
                fence,
            } => {
                if superseded(&current, fence) {
                    continue;
                }
                reset_switches(backend.as_ref(), &switches);
                install_classifier(backend.as_ref(), &switches, classifier);
            }
            InstallJob::ClearAll { switches, fence } => {
                if superseded(&current, fence) {
                    continue;
                }
                reset_switches(backend.as_ref(), &switches);
            }
        }
    }
}

/// The generation fence: sleep out the coalescing interval, then cancel
/// when a newer network update has been issued meanwhile.
fn superseded(current: &AtomicU64, fence: Option<u64>) -> bool {
    let Some(this_generation) = fence else {
        return false;
    };
    thread::sleep(COALESCE_DELAY);
    let live = current.load(Ordering::SeqCst);
    if this_generation == live {
        false
    } else {
        debug!("job of generation {this_generation} superseded by {live}; cancelled");
        true
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use net::FlowAction;
    use net::backend::{BackendCall, RecordingBackend};
    use policy::{Classifier, Predicate, Rule};

    fn punt_classifier() -> Classifier {
        Classifier::from_rules(vec![Rule::new(
            Predicate::Any,
            vec![policy::Action::Controller],
        )])
    }

    #[test]
    fn stale_generation_cancels_before_any_switch_io() {
        let backend = Arc::new(RecordingBackend::new());
        let generation = Arc::new(AtomicU64::new(6));
        let mut worker = InstallWorker::start(backend.clone(), generation.clone()).unwrap();

        // job A was issued at generation 5; the counter has moved on
        worker.submit(InstallJob::Install {
            classifier: punt_classifier(),
            switches: vec![1],
            fence: Some(5),
        });
        // job B carries the live generation
        worker.submit(InstallJob::Install {
            classifier: punt_classifier(),
            switches: vec![1],
            fence: Some(6),
        });
        worker.finish().unwrap();

        let calls = backend.calls();
        // exactly one reset + install sequence: A contributed nothing
        assert_eq!(
            calls.iter().filter(|c| matches!(c, BackendCall::Clear(1))).count(),
            1
        );
        let installs: Vec<_> = calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Install { actions, .. } => Some(actions.clone()),
                _ => None,
            })
            .collect();
        // the punt entry from the reset plus the classifier rule
        assert_eq!(installs.len(), 2);
        assert!(
            installs
                .iter()
                .all(|a| a.as_slice() == [FlowAction::PuntToController])
        );
    }

    #[test]
    fn unfenced_jobs_always_run() {
        let backend = Arc::new(RecordingBackend::new());
        let generation = Arc::new(AtomicU64::new(42));
        let mut worker = InstallWorker::start(backend.clone(), generation).unwrap();
        worker.submit(InstallJob::ClearAll {
            switches: vec![1, 2],
            fence: None,
        });
        worker.finish().unwrap();
        let clears = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Clear(_)))
            .count();
        assert_eq!(clears, 2);
    }

    #[test]
    fn jobs_drain_in_submission_order() {
        let backend = Arc::new(RecordingBackend::new());
        let generation = Arc::new(AtomicU64::new(0));
        let mut worker = InstallWorker::start(backend.clone(), generation).unwrap();
        worker.submit(InstallJob::ClearAll {
            switches: vec![1],
            fence: None,
        });
        worker.submit(InstallJob::ClearAll {
            switches: vec![2],
            fence: None,
        });
        worker.finish().unwrap();
        let clears: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::Clear(_)))
            .collect();
        assert_eq!(clears, vec![BackendCall::Clear(1), BackendCall::Clear(2)]);
    }
}
