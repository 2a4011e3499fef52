use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;

use super::PieceWork;

/// Pieces waiting to be downloaded, shared by every worker of a torrent.
///
/// A piece is either queued here or leased by exactly one worker. A
/// [`Lease`] that is dropped without being completed puts its piece back in
/// the queue, so a piece can't be lost when a worker errors or is cancelled.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    queued: VecDeque<PieceWork>,
    in_flight: usize,
}

impl WorkQueue {
    pub fn new(work: impl IntoIterator<Item = PieceWork>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                queued: work.into_iter().collect(),
                in_flight: 0,
            }),
            notify: Notify::new(),
        })
    }

    /// How many pieces are waiting in the queue.
    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many pieces are leased by workers.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Lease the first queued piece for which `can_serve` returns true,
    /// pieces before it stay in the queue untouched.
    ///
    /// If there is no such piece but other workers are holding leases, wait
    /// until one of them is released, the piece might come back. Returns
    /// `None` once nothing that `can_serve` accepts can ever be queued
    /// again.
    pub async fn next_matching(
        self: &Arc<Self>,
        mut can_serve: impl FnMut(u32) -> bool,
    ) -> Option<Lease> {
        loop {
            // created before looking at the state, a release that happens
            // after the lock is dropped still wakes us up.
            let notified = self.notify.notified();

            {
                let mut state = self.lock();

                let pos = state.queued.iter().position(|w| can_serve(w.index));

                if let Some(work) = pos.and_then(|pos| state.queued.remove(pos)) {
                    state.in_flight += 1;
                    return Some(Lease {
                        queue: Arc::clone(self),
                        work,
                        completed: false,
                    });
                }

                if state.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    fn release(&self, work: Option<PieceWork>) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            if let Some(work) = work {
                state.queued.push_back(work);
            }
        }
        self.notify.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // the state is consistent after every statement, a panic in another
        // worker doesn't invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A piece owned by one worker.
#[derive(Debug)]
pub struct Lease {
    queue: Arc<WorkQueue>,
    work: PieceWork,
    completed: bool,
}

impl Lease {
    pub fn work(&self) -> &PieceWork {
        &self.work
    }

    /// The piece was verified and handed to the collector, it will not be
    /// queued again.
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let work = (!self.completed).then(|| self.work.clone());
        self.queue.release(work);
    }
}
