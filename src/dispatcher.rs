//! Fixed-size worker pool draining a queue of sources into the installer.

use std::path::Path;
use std::thread::ScopedJoinHandle;

use crossbeam_channel::Receiver;

use crate::error::Error;
use crate::installer::{InstallReport, Installer};

/// Outcome of a full dispatch. Order reflects completion, not submission.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Descriptors whose unit failed, with the error that stopped them.
    pub failures: Vec<(String, Error)>,
    /// Reports of the units that finished.
    pub reports: Vec<InstallReport>,
}

/// One queued source. The ordinal only names the unit's scratch directory.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Source descriptor as listed in the manifest.
    pub descriptor: String,
    /// Position in the submitted list.
    pub ordinal: usize,
}

/// Install every descriptor using `workers` threads and one temporary root.
///
/// Each unit fetches into its own subdirectory of the root, which is removed
/// when dispatch returns. A failing unit is logged and recorded, and the
/// remaining units still run. Returns once every worker has exited.
///
/// # Errors
///
/// Returns `Error::Io` if the temporary root cannot be created,
/// or `Error::WorkerPanicked` if a worker thread panicked.
pub fn dispatch(
    descriptors: &[String],
    installer: &Installer<'_>,
    workers: usize,
) -> Result<DispatchSummary, Error> {
    let tmp_root = tempfile::Builder::new().prefix("grammar-sync-").tempdir()?;

    let (tx, rx) = crossbeam_channel::unbounded();
    for (ordinal, descriptor) in descriptors.iter().enumerate() {
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(WorkUnit { descriptor: descriptor.clone(), ordinal });
    }
    drop(tx);

    let root = tmp_root.path();
    let results = std::thread::scope(|s| {
        let handles: Vec<ScopedJoinHandle<'_, DispatchSummary>> = (0..workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                return s.spawn(move || return drain_queue(&rx, root, installer));
            })
            .collect();
        return handles.into_iter().map(ScopedJoinHandle::join).collect::<Vec<_>>();
    });

    let mut summary = DispatchSummary::default();
    for result in results {
        let partial = result.map_err(|_panic| return Error::WorkerPanicked)?;
        summary.failures.extend(partial.failures);
        summary.reports.extend(partial.reports);
    }

    tmp_root.close()?;
    return Ok(summary);
}

/// Worker loop: take units until the queue is empty, never blocking.
fn drain_queue(rx: &Receiver<WorkUnit>, root: &Path, installer: &Installer<'_>) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    while let Ok(unit) = rx.try_recv() {
        match run_unit(&unit, root, installer) {
            Err(e) => {
                tracing::error!(descriptor = %unit.descriptor, error = %e, "source failed");
                summary.failures.push((unit.descriptor, e));
            },
            Ok(report) => summary.reports.push(report),
        }
    }

    return summary;
}

/// Run one unit in its own scratch directory.
///
/// # Errors
///
/// Returns `Error::Io` if the scratch directory cannot be created,
/// or any installer error.
fn run_unit(unit: &WorkUnit, root: &Path, installer: &Installer<'_>) -> Result<InstallReport, Error> {
    let workdir = root.join(unit.ordinal.to_string());
    std::fs::create_dir_all(&workdir)?;
    return installer.install(&workdir, &unit.descriptor);
}
