//! Scoped decode pool for subdomain files.
//!
//! Workers pull job indices from a crossbeam channel, decode one file
//! each, and send the block back. The calling thread reorders results
//! so the sink sees blocks in job order, which keeps "last subdomain
//! wins" well defined for overlapping cells and scalars.
//!
//! ```text
//!   main ──[task_tx: idx]──▶ worker 0..N ──[result_tx: (idx, block)]──▶ main
//!                                                       reorder buffer ─▶ sink
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::debug;
use varcube_core::Real;
use varcube_record::{read_block_file, BlockSpec, RawBlock};

use crate::config::CancelToken;
use crate::error::ReadError;

/// One file to decode.
#[derive(Clone, Debug)]
pub(crate) struct DecodeJob {
    pub path: PathBuf,
    pub spec: BlockSpec,
}

fn decode<T: Real>(job: &DecodeJob) -> Result<RawBlock<T>, ReadError> {
    read_block_file(&job.path, &job.spec).map_err(|e| ReadError::record(&job.path, e))
}

/// Decode every job and hand the blocks to `sink` in job order.
///
/// Stops at the first decode or sink error, or when `cancel` fires.
/// Workers that are mid-file finish that file and then exit.
pub(crate) fn decode_in_order<T, F>(
    jobs: &[DecodeJob],
    workers: usize,
    cancel: &CancelToken,
    mut sink: F,
) -> Result<(), ReadError>
where
    T: Real,
    F: FnMut(usize, RawBlock<T>) -> Result<(), ReadError>,
{
    if cancel.is_cancelled() {
        return Err(ReadError::Cancelled);
    }
    if jobs.is_empty() {
        return Ok(());
    }
    let workers = workers.clamp(1, jobs.len());
    if workers == 1 {
        for (idx, job) in jobs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            sink(idx, decode(job)?)?;
        }
        return Ok(());
    }

    let abort = AtomicBool::new(false);
    let (task_tx, task_rx) = crossbeam_channel::bounded::<usize>(jobs.len());
    let (result_tx, result_rx) =
        crossbeam_channel::bounded::<(usize, Result<RawBlock<T>, ReadError>)>(workers * 2);
    for idx in 0..jobs.len() {
        // Capacity equals the job count, so this never blocks.
        task_tx
            .send(idx)
            .map_err(|_| ReadError::WorkerFailed {
                detail: "task queue closed before dispatch".into(),
            })?;
    }
    drop(task_tx);

    thread::scope(|scope| {
        for worker in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let abort = &abort;
            scope.spawn(move || {
                while let Ok(idx) = task_rx.recv() {
                    if abort.load(Ordering::Acquire) || cancel.is_cancelled() {
                        break;
                    }
                    let block = decode(&jobs[idx]);
                    if result_tx.send((idx, block)).is_err() {
                        break;
                    }
                }
                debug!(worker, "decode worker exiting");
            });
        }
        drop(result_tx);

        let mut pending = BTreeMap::new();
        let mut next = 0;
        let mut outcome = Ok(());
        'recv: for (idx, block) in result_rx.iter() {
            pending.insert(idx, block);
            while let Some(block) = pending.remove(&next) {
                let placed = block.and_then(|b| sink(next, b));
                next += 1;
                if let Err(e) = placed {
                    outcome = Err(e);
                    break 'recv;
                }
            }
            if cancel.is_cancelled() {
                outcome = Err(ReadError::Cancelled);
                break;
            }
        }
        abort.store(true, Ordering::Release);
        // Unblock workers waiting to send.
        drop(result_rx);

        outcome?;
        if next < jobs.len() {
            if cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            return Err(ReadError::WorkerFailed {
                detail: format!("{} of {} subdomains never reported", jobs.len() - next, jobs.len()),
            });
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use varcube_core::Precision;
    use varcube_test_utils::RecordWriter;

    fn write_jobs(dir: &std::path::Path, n: usize) -> Vec<DecodeJob> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("block{i}"));
                let mut w = RecordWriter::new(std::fs::File::create(&path).unwrap());
                w.write_reals(&[i as f64, 2.0 * i as f64], Precision::Double)
                    .unwrap();
                w.write_reals(&[i as f64, 0.0, 0.0, 0.0, 0.0, 0.1, 0.2, 0.3], Precision::Double)
                    .unwrap();
                DecodeJob {
                    path,
                    spec: BlockSpec {
                        precision: Precision::Double,
                        mx: 2,
                        my: 1,
                        mz: 1,
                        cells: 2,
                        total_vars: 1,
                        shear: false,
                        read_persist: false,
                    },
                }
            })
            .collect()
    }

    #[test]
    fn sink_sees_blocks_in_job_order() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = write_jobs(dir.path(), 23);
        let mut seen = Vec::new();
        decode_in_order::<f64, _>(&jobs, 4, &CancelToken::new(), |idx, block| {
            assert_eq!(block.coords.t, idx as f64);
            seen.push(idx);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn first_error_stops_the_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut jobs = write_jobs(dir.path(), 8);
        jobs[3].path = dir.path().join("missing");
        let mut seen = Vec::new();
        let err = decode_in_order::<f64, _>(&jobs, 3, &CancelToken::new(), |idx, _| {
            seen.push(idx);
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, ReadError::FileNotFound { .. }));
        assert_eq!(seen, [0, 1, 2]);
    }

    #[test]
    fn sink_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = write_jobs(dir.path(), 6);
        let err = decode_in_order::<f32, _>(&jobs, 2, &CancelToken::new(), |idx, _| {
            if idx == 2 {
                Err(ReadError::layout("bad block"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(matches!(err, ReadError::Layout { .. }));
    }

    #[test]
    fn cancellation_stops_the_read() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = write_jobs(dir.path(), 12);
        let cancel = CancelToken::new();
        let err = decode_in_order::<f64, _>(&jobs, 2, &cancel, |idx, _| {
            if idx == 1 {
                cancel.cancel();
            }
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, ReadError::Cancelled));
    }

    #[test]
    fn cancelled_token_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = write_jobs(dir.path(), 3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = decode_in_order::<f64, _>(&jobs, 1, &cancel, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, ReadError::Cancelled));
    }
}
