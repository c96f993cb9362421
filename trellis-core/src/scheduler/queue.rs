//! Flush Queues
//!
//! The scheduler batches work into three queues that are drained together
//! on the next microtask checkpoint.
//!
//! # Algorithm
//!
//! 1. Drain the pre-flush callbacks, repeatedly, until none are pending
//! 2. Sort the main queue by job id (jobs without an id last)
//! 3. Run each main job in order, skipping invalidated slots; jobs queued
//!    meanwhile are inserted at their sorted position after the current one
//! 4. Drain the post-flush callbacks, deduplicated and sorted by id
//! 5. Repeat from 1 while anything is still pending
//!
//! Every run of a job or callback within one flush is counted. Passing the
//! recursion limit aborts the flush with `RecursiveUpdateExceeded`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, trace};

use super::job::Job;
use crate::error::{ErrorPhase, Result, RuntimeError};
use crate::reactive::Runtime;

/// Per-flush occurrence counts, keyed by job serial.
pub(crate) type Seen = HashMap<u64, usize>;

/// The pre, main and post queues of one runtime.
pub struct Scheduler {
    recursion_limit: usize,

    queue: RefCell<Vec<Option<Job>>>,
    flush_index: Cell<usize>,
    is_flushing: Cell<bool>,
    is_flush_pending: Cell<bool>,

    pending_pre: RefCell<Vec<Job>>,
    active_pre: RefCell<Option<Vec<Job>>>,
    pre_index: Cell<usize>,
    pre_parent: RefCell<Option<Job>>,

    pending_post: RefCell<Vec<Job>>,
    active_post: RefCell<Option<Vec<Job>>>,
    post_index: Cell<usize>,

    /// Bumped after every flush, successful or not.
    settled: watch::Sender<u64>,
}

impl Scheduler {
    pub fn new(recursion_limit: usize) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            recursion_limit,
            queue: RefCell::new(Vec::new()),
            flush_index: Cell::new(0),
            is_flushing: Cell::new(false),
            is_flush_pending: Cell::new(false),
            pending_pre: RefCell::new(Vec::new()),
            active_pre: RefCell::new(None),
            pre_index: Cell::new(0),
            pre_parent: RefCell::new(None),
            pending_post: RefCell::new(Vec::new()),
            active_post: RefCell::new(None),
            post_index: Cell::new(0),
            settled,
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.is_flushing.get()
    }

    pub fn is_flush_pending(&self) -> bool {
        self.is_flush_pending.get()
    }

    /// Number of live jobs in the main queue.
    pub fn queued_jobs(&self) -> usize {
        self.queue.borrow().iter().flatten().count()
    }

    /// Add a job to the main queue. Returns `false` if it was rejected as a
    /// duplicate or as the current pre-flush parent.
    pub fn queue_job(&self, job: &Job) -> bool {
        let flushing = self.is_flushing.get();
        let start = if flushing && job.allow_recurse() {
            self.flush_index.get() + 1
        } else {
            self.flush_index.get()
        };

        {
            let mut queue = self.queue.borrow_mut();
            let present = queue.iter().skip(start).flatten().any(|queued| queued == job);
            let is_parent = self.pre_parent.borrow().as_ref() == Some(job);
            if present || is_parent {
                trace!(job = %job.label(), "job already queued");
                return false;
            }

            if flushing {
                let at = self.insertion_index(&queue, job);
                queue.insert(at, Some(job.clone()));
            } else {
                queue.push(Some(job.clone()));
            }
        }

        self.queue_flush();
        true
    }

    /// Sorted position for a job queued mid-flush. Only the not yet executed
    /// tail of the queue is considered.
    fn insertion_index(&self, queue: &[Option<Job>], job: &Job) -> usize {
        let key = job.sort_key();
        let from = (self.flush_index.get() + 1).min(queue.len());
        queue[from..]
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|queued| queued.sort_key() > key))
            .map_or(queue.len(), |offset| from + offset)
    }

    /// Withdraw a job that has not started yet.
    pub fn invalidate_job(&self, job: &Job) {
        let mut queue = self.queue.borrow_mut();
        let Some(index) = queue.iter().position(|slot| slot.as_ref() == Some(job)) else {
            return;
        };

        if !self.is_flushing.get() {
            queue.remove(index);
        } else if index > self.flush_index.get() {
            queue[index] = None;
        }
    }

    pub fn queue_pre_flush(&self, cb: &Job) {
        self.queue_cb(cb, &self.active_pre, &self.pending_pre, self.pre_index.get());
    }

    pub fn queue_post_flush(&self, cb: &Job) {
        self.queue_cb(cb, &self.active_post, &self.pending_post, self.post_index.get());
    }

    /// Queue several post-flush callbacks without the active-list check.
    pub fn queue_post_flush_all(&self, cbs: impl IntoIterator<Item = Job>) {
        self.pending_post.borrow_mut().extend(cbs);
        self.queue_flush();
    }

    fn queue_cb(
        &self,
        cb: &Job,
        active: &RefCell<Option<Vec<Job>>>,
        pending: &RefCell<Vec<Job>>,
        index: usize,
    ) {
        let start = if cb.allow_recurse() { index + 1 } else { index };
        let already_active = active
            .borrow()
            .as_ref()
            .is_some_and(|list| list.iter().skip(start).any(|queued| queued == cb));

        if !already_active {
            pending.borrow_mut().push(cb.clone());
        }
        self.queue_flush();
    }

    fn queue_flush(&self) {
        if !self.is_flushing.get() && !self.is_flush_pending.get() {
            self.is_flush_pending.set(true);
            trace!("flush scheduled");
        }
    }

    /// Microtask checkpoint: run the pending flush, if any.
    pub fn tick(&self, rt: &Runtime) -> Result<bool> {
        if !self.is_flush_pending.get() || self.is_flushing.get() {
            return Ok(false);
        }
        self.flush_jobs(rt)?;
        Ok(true)
    }

    /// Run a complete flush now.
    pub fn flush_jobs(&self, rt: &Runtime) -> Result<()> {
        self.is_flush_pending.set(false);
        self.is_flushing.set(true);
        debug!(queued = self.queued_jobs(), "flush started");

        let mut seen = Seen::new();
        let result = loop {
            if let Err(err) = self.flush_pass(rt, &mut seen) {
                break Err(err);
            }
            let idle = self.queue.borrow().is_empty()
                && self.pending_pre.borrow().is_empty()
                && self.pending_post.borrow().is_empty();
            if idle {
                break Ok(());
            }
        };

        if result.is_err() {
            self.abort();
        }
        self.is_flushing.set(false);
        self.settled.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        debug!(ok = result.is_ok(), "flush settled");
        result
    }

    fn flush_pass(&self, rt: &Runtime, seen: &mut Seen) -> Result<()> {
        self.drain_pre(rt, seen, None)?;

        {
            let mut queue = self.queue.borrow_mut();
            queue.retain(Option::is_some);
            queue.sort_by_key(|slot| slot.as_ref().map_or((true, i64::MAX), Job::sort_key));
        }

        let mut index = 0;
        loop {
            self.flush_index.set(index);
            let slot = match self.queue.borrow().get(index) {
                Some(slot) => slot.clone(),
                None => break,
            };
            if let Some(job) = slot {
                self.check_recursive(seen, &job)?;
                trace!(job = %job.label(), "running job");
                if let Err(err) = job.run() {
                    rt.handle_error(err, job.phase())?;
                }
            }
            index += 1;
        }

        self.flush_index.set(0);
        self.queue.borrow_mut().clear();
        self.drain_post(rt, seen)
    }

    /// Drain pre-flush callbacks outside of a flush, e.g. right before a
    /// parent-forced child update. `parent` cannot be re-queued meanwhile.
    pub fn flush_pre_flush_cbs(&self, rt: &Runtime, parent: Option<&Job>) -> Result<()> {
        let mut seen = Seen::new();
        let result = self.drain_pre(rt, &mut seen, parent);
        if result.is_err() {
            self.reset_pre();
        }
        result
    }

    fn drain_pre(&self, rt: &Runtime, seen: &mut Seen, parent: Option<&Job>) -> Result<()> {
        loop {
            let pending = std::mem::take(&mut *self.pending_pre.borrow_mut());
            if pending.is_empty() {
                return Ok(());
            }

            *self.pre_parent.borrow_mut() = parent.cloned();
            let active = dedupe(pending);
            let len = active.len();
            *self.active_pre.borrow_mut() = Some(active);

            for index in 0..len {
                self.pre_index.set(index);
                let cb = match self.active_pre.borrow().as_ref().and_then(|list| list.get(index)) {
                    Some(cb) => cb.clone(),
                    None => break,
                };
                self.check_recursive(seen, &cb)?;
                if let Err(err) = cb.run() {
                    rt.handle_error(err, ErrorPhase::PreFlushCallback)?;
                }
            }

            self.reset_pre();
        }
    }

    fn reset_pre(&self) {
        *self.active_pre.borrow_mut() = None;
        self.pre_index.set(0);
        *self.pre_parent.borrow_mut() = None;
    }

    /// Drain post-flush callbacks now.
    ///
    /// A drain requested while another is in progress appends to the active
    /// list instead of starting a second loop.
    pub fn flush_post_flush_cbs(&self, rt: &Runtime) -> Result<()> {
        let mut seen = Seen::new();
        let nested = self.active_post.borrow().is_some();
        let result = self.drain_post(rt, &mut seen);
        if result.is_err() && !nested {
            *self.active_post.borrow_mut() = None;
            self.post_index.set(0);
        }
        result
    }

    fn drain_post(&self, rt: &Runtime, seen: &mut Seen) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending_post.borrow_mut());
        if pending.is_empty() {
            return Ok(());
        }
        let mut deduped = dedupe(pending);

        if let Some(active) = self.active_post.borrow_mut().as_mut() {
            active.extend(deduped);
            return Ok(());
        }

        deduped.sort_by_key(Job::sort_key);
        *self.active_post.borrow_mut() = Some(deduped);

        let mut index = 0;
        loop {
            let cb = match self.active_post.borrow().as_ref().and_then(|list| list.get(index)) {
                Some(cb) => cb.clone(),
                None => break,
            };
            self.post_index.set(index);
            self.check_recursive(seen, &cb)?;
            if let Err(err) = cb.run() {
                rt.handle_error(err, ErrorPhase::PostFlushCallback)?;
            }
            index += 1;
        }

        *self.active_post.borrow_mut() = None;
        self.post_index.set(0);
        Ok(())
    }

    fn check_recursive(&self, seen: &mut Seen, job: &Job) -> Result<()> {
        let count = seen.entry(job.serial()).or_insert(0);
        *count += 1;
        if *count > self.recursion_limit {
            return Err(RuntimeError::RecursiveUpdateExceeded {
                job: job.label(),
                limit: self.recursion_limit,
            });
        }
        Ok(())
    }

    /// Reset after a flush aborted with an error.
    ///
    /// Main and pre-flush work is discarded. Post-flush callbacks that did
    /// not get to run stay pending for the next checkpoint.
    fn abort(&self) {
        self.queue.borrow_mut().clear();
        self.flush_index.set(0);
        self.pending_pre.borrow_mut().clear();
        self.reset_pre();

        if let Some(active) = self.active_post.borrow_mut().take() {
            let unrun: Vec<Job> = active.into_iter().skip(self.post_index.get() + 1).collect();
            let mut pending = self.pending_post.borrow_mut();
            let later = std::mem::replace(&mut *pending, unrun);
            pending.extend(later);
        }
        self.post_index.set(0);
        self.is_flush_pending
            .set(!self.pending_post.borrow().is_empty());
    }

    /// A future that resolves once the pending flush has completed, or
    /// immediately if nothing is pending.
    pub fn next_flush_settled(&self) -> impl Future<Output = ()> + 'static {
        let busy = self.is_flush_pending.get() || self.is_flushing.get();
        let mut settled = self.settled.subscribe();
        async move {
            if busy {
                let _ = settled.changed().await;
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued_jobs", &self.queued_jobs())
            .field("is_flushing", &self.is_flushing.get())
            .field("is_flush_pending", &self.is_flush_pending.get())
            .finish()
    }
}

/// Drop repeated jobs, keeping the first occurrence.
fn dedupe(jobs: Vec<Job>) -> Vec<Job> {
    let mut seen = HashSet::new();
    jobs.into_iter().filter(|job| seen.insert(job.serial())).collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
