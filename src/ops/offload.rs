//! Background execution for the `*_async` entry points.
//!
//! Jobs run on the rayon pool and hand their result back through a shared
//! slot that the returned [`BackgroundTask`] polls. The job closure is kept by
//! the task as well: if the worker panics, the task recomputes the result on
//! the awaiting thread, so callers always get the same value the synchronous
//! path would have produced.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

type Job<T> = Arc<dyn Fn() -> T + Send + Sync>;

enum Slot<T> {
    Running(Option<Waker>),
    Done(T),
    Failed,
    Taken,
}

/// Handle to a job that may be running on a worker thread.
///
/// Awaiting it (or calling [`wait`](Self::wait)) yields the job's output.
pub struct BackgroundTask<T> {
    slot: Arc<Mutex<Slot<T>>>,
    job: Option<Job<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Run `job` on the rayon pool.
    pub fn spawn<F>(job: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let job: Job<T> = Arc::new(job);
        let slot = Arc::new(Mutex::new(Slot::Running(None)));

        let worker_job = job.clone();
        let worker_slot = slot.clone();
        rayon::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| worker_job()));
            let waker = {
                let mut guard = lock(&worker_slot);
                let prev = std::mem::replace(
                    &mut *guard,
                    match outcome {
                        Ok(value) => Slot::Done(value),
                        Err(_) => Slot::Failed,
                    },
                );
                match prev {
                    Slot::Running(waker) => waker,
                    _ => None,
                }
            };
            if let Some(w) = waker {
                w.wake();
            }
        });

        Self { slot, job: Some(job) }
    }

    /// Run `job` right here; the task is complete on return.
    pub fn inline<F>(job: F) -> Self
    where
        F: FnOnce() -> T,
    {
        Self::ready(job())
    }

    /// Offload when `background` is set, otherwise run inline.
    pub fn run<F>(background: bool, job: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        if background {
            Self::spawn(job)
        } else {
            Self::inline(job)
        }
    }

    /// Block the current thread until the result is available.
    pub fn wait(self) -> T {
        pollster::block_on(self)
    }
}

impl<T> BackgroundTask<T> {
    /// An already-completed task.
    pub fn ready(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Done(value))),
            job: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(*lock(&self.slot), Slot::Running(_))
    }
}

impl<T> Future for BackgroundTask<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let state = {
            let mut guard = lock(&self.slot);
            match std::mem::replace(&mut *guard, Slot::Taken) {
                Slot::Running(_) => {
                    *guard = Slot::Running(Some(cx.waker().clone()));
                    return Poll::Pending;
                }
                other => other,
            }
        };

        match state {
            Slot::Done(value) => Poll::Ready(value),
            Slot::Failed => {
                tracing::warn!("background job failed, retrying on the calling thread");
                match self.job.take() {
                    Some(job) => Poll::Ready(job()),
                    None => panic!("background job failed with no fallback available"),
                }
            }
            Slot::Taken => panic!("BackgroundTask polled after completion"),
            Slot::Running(_) => unreachable!(),
        }
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn spawned_job_returns_its_value() {
        let task = BackgroundTask::spawn(|| (0..1000u64).sum::<u64>());
        assert_eq!(task.wait(), 499_500);
    }

    #[test]
    fn inline_and_background_agree() {
        let data: Arc<Vec<u8>> = Arc::new((0..=255).collect());
        let d1 = data.clone();
        let bg = BackgroundTask::run(true, move || d1.iter().map(|&b| b as u32).sum::<u32>());
        let d2 = data.clone();
        let fg = BackgroundTask::run(false, move || d2.iter().map(|&b| b as u32).sum::<u32>());
        assert!(fg.is_finished());
        assert_eq!(bg.wait(), fg.wait());
    }

    #[test]
    fn panicking_worker_falls_back_to_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = BackgroundTask::spawn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                panic!("simulated worker failure");
            }
            42
        });
        assert_eq!(task.wait(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
