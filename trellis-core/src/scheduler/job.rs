//! Scheduler Jobs
//!
//! A [`Job`] is a shared, identity-compared unit of work. Two clones of the
//! same job are the same job for deduplication purposes; two jobs built from
//! identical closures are not.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorPhase, Result};

/// Generate a new unique job serial.
///
/// Serials identify a job in per-flush bookkeeping; they are not used for
/// ordering.
fn next_serial() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct JobInner {
    serial: u64,
    id: Option<i64>,
    allow_recurse: bool,
    label: Option<Cow<'static, str>>,
    phase: ErrorPhase,
    run: Box<dyn Fn() -> Result<()>>,
}

/// A unit of work for the scheduler queues.
///
/// # Example
///
/// ```rust,ignore
/// let job = Job::builder().id(3).label("list update").build(|| Ok(()));
/// runtime.enqueue_job(&job);
/// ```
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

impl Job {
    /// Create a job without an ordering id. It sorts after every job that
    /// has one.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self::builder().build(run)
    }

    /// Create a job with an ordering id.
    pub fn with_id<F>(id: i64, run: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self::builder().id(id).build(run)
    }

    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    /// The ordering id, if any.
    pub fn id(&self) -> Option<i64> {
        self.inner.id
    }

    /// Whether the job may be re-queued while it is running.
    pub fn allow_recurse(&self) -> bool {
        self.inner.allow_recurse
    }

    /// Human readable name used in diagnostics.
    pub fn label(&self) -> String {
        match &self.inner.label {
            Some(label) => label.to_string(),
            None => format!("job#{}", self.inner.serial),
        }
    }

    /// Phase reported when the job fails in the main queue.
    pub fn phase(&self) -> ErrorPhase {
        self.inner.phase
    }

    /// Execute the job.
    pub fn run(&self) -> Result<()> {
        (self.inner.run)()
    }

    pub(crate) fn serial(&self) -> u64 {
        self.inner.serial
    }

    /// Ascending by id, jobs without an id last.
    pub(crate) fn sort_key(&self) -> (bool, i64) {
        (self.inner.id.is_none(), self.inner.id.unwrap_or(0))
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label())
            .field("id", &self.inner.id)
            .field("allow_recurse", &self.inner.allow_recurse)
            .finish()
    }
}

/// Builder for [`Job`].
#[derive(Debug)]
pub struct JobBuilder {
    id: Option<i64>,
    allow_recurse: bool,
    label: Option<Cow<'static, str>>,
    phase: ErrorPhase,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self {
            id: None,
            allow_recurse: false,
            label: None,
            phase: ErrorPhase::SchedulerJob,
        }
    }
}

impl JobBuilder {
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Report failures of this job under `phase` instead of
    /// [`ErrorPhase::SchedulerJob`].
    pub fn phase(mut self, phase: ErrorPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn build<F>(self, run: F) -> Job
    where
        F: Fn() -> Result<()> + 'static,
    {
        Job {
            inner: Rc::new(JobInner {
                serial: next_serial(),
                id: self.id,
                allow_recurse: self.allow_recurse,
                label: self.label,
                phase: self.phase,
                run: Box::new(run),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn identity_is_by_pointer() {
        let a = Job::new(|| Ok(()));
        let b = Job::new(|| Ok(()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn jobs_without_id_sort_last() {
        let none = Job::new(|| Ok(()));
        let high = Job::with_id(1_000, || Ok(()));
        let negative = Job::with_id(-1, || Ok(()));
        let mut jobs = vec![none.clone(), high.clone(), negative.clone()];
        jobs.sort_by_key(Job::sort_key);
        assert_eq!(jobs, vec![negative, high, none]);
    }

    #[test]
    fn run_invokes_closure() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let job = Job::builder().label("counter").build(move || {
            c.set(c.get() + 1);
            Ok(())
        });
        job.run().unwrap();
        job.clone().run().unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(job.label(), "counter");
        assert_eq!(job.phase(), ErrorPhase::SchedulerJob);
    }
}
