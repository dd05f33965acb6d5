/// Bounded worker pool for one database pipeline.
///
/// `limit` worker threads are spawned inside a `std::thread::scope` and pull
/// jobs from a zero-capacity (rendezvous) crossbeam channel. A send only
/// completes when an idle worker receives the job, so:
///
/// - [`WorkerPool::dispatch`] blocks while all `limit` workers are busy and
///   resumes as soon as one finishes its job.
/// - At most `limit` jobs are ever in flight.
/// - [`WorkerPool::join`] closes the channel and waits for every worker to
///   drain out. Once it returns, no job is running; this is the barrier the
///   pipeline waits on before finalising its report.
///
/// Each worker is built by a factory closure, so per-worker state (a store
/// connection, for instance) lives inside the worker and is never shared.
use crossbeam_channel::{bounded, SendError, Sender};
use std::io;
use std::thread::{self, Scope, ScopedJoinHandle};
use tracing::warn;

pub struct WorkerPool<'scope, T> {
    tx: Sender<T>,
    workers: Vec<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope, T: Send + 'scope> WorkerPool<'scope, T> {
    /// Spawn `limit` workers (at least one). `make_worker(i)` builds the job
    /// handler for worker `i`; threads are named `{name}-{i}`.
    pub fn spawn<'env, F, W>(
        scope: &'scope Scope<'scope, 'env>,
        name: &str,
        limit: usize,
        mut make_worker: F,
    ) -> io::Result<Self>
    where
        F: FnMut(usize) -> W,
        W: FnMut(T) + Send + 'scope,
    {
        let (tx, rx) = bounded::<T>(0);
        let limit = limit.max(1);
        let mut workers = Vec::with_capacity(limit);

        for i in 0..limit {
            let rx = rx.clone();
            let mut handle_job = make_worker(i);
            let worker = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn_scoped(scope, move || {
                    for job in rx.iter() {
                        handle_job(job);
                    }
                });
            match worker {
                Ok(worker) => workers.push(worker),
                // Workers already running exit once `tx` drops on return.
                Err(err) => return Err(err),
            }
        }

        Ok(Self { tx, workers })
    }

    /// Number of worker threads.
    pub fn limit(&self) -> usize {
        self.workers.len()
    }

    /// Hand `job` to the next idle worker, blocking until one is free.
    ///
    /// Fails only if every worker has exited, which means they panicked.
    pub fn dispatch(&self, job: T) -> Result<(), SendError<T>> {
        self.tx.send(job)
    }

    /// Close the pool and wait for all in-flight jobs to finish.
    ///
    /// Returns the number of workers that panicked.
    pub fn join(self) -> usize {
        let Self { tx, workers } = self;
        drop(tx);
        let mut panicked = 0;
        for worker in workers {
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            warn!("{panicked} worker thread(s) panicked");
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn every_job_runs_exactly_once() {
        let done = AtomicUsize::new(0);
        let sum = AtomicUsize::new(0);
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, "test", 4, |_| {
                let (done, sum) = (&done, &sum);
                move |n: usize| {
                    sum.fetch_add(n, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
            for n in 1..=100 {
                pool.dispatch(n).unwrap();
            }
            assert_eq!(pool.join(), 0);
        });
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(sum.load(Ordering::SeqCst), 5_050);
    }

    #[test]
    fn in_flight_jobs_never_exceed_limit() {
        const LIMIT: usize = 3;
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, "bounded", LIMIT, |_| {
                let (in_flight, peak) = (&in_flight, &peak);
                move |_: ()| {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .unwrap();
            assert_eq!(pool.limit(), LIMIT);
            for _ in 0..30 {
                pool.dispatch(()).unwrap();
            }
            pool.join();
        });
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= LIMIT, "peak {peak} exceeded limit {LIMIT}");
        assert!(peak >= 1);
    }

    /// `join` is a barrier: every job has finished by the time it returns.
    #[test]
    fn join_waits_for_slow_jobs() {
        let finished = AtomicUsize::new(0);
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, "slow", 2, |_| {
                let finished = &finished;
                move |delay: u64| {
                    thread::sleep(Duration::from_millis(delay));
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
            pool.dispatch(30).unwrap();
            pool.dispatch(10).unwrap();
            pool.join();
            assert_eq!(finished.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn zero_limit_still_gets_one_worker() {
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, "min", 0, |_| |_: u8| {}).unwrap();
            assert_eq!(pool.limit(), 1);
            pool.dispatch(1).unwrap();
            pool.join();
        });
    }
}
