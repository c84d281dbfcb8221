//! Asynchronous transform followed by retransformation.
//!
//! When deciding on the hook's calling thread would block class loading for too long, the
//! [`RetransformingTransformer`] wraps a [`SyncTransformer`] and moves the decision onto a
//! dedicated background worker:
//!
//! ```text
//!  hook thread                         worker thread                 runtime
//!  ───────────                         ─────────────                 ───────
//!  transform(handle) ─► enqueue ─────► SyncTransformer::transform
//!        │                                   │
//!        ▼                                   ▼
//!  return original                     cache outcome for handle
//!                                            │
//!                                            ▼
//!                                      retransform(handle) ─────────► redeliver
//!  transform(handle) ◄──────────────────────────────────────────────────┘
//!        │
//!        ▼
//!  return cached rewrite
//! ```
//!
//! The worker processes tasks one at a time in submission order, and a pending set keeps
//! at most one task per handle in flight. A unit whose rewrite or retransformation fails
//! keeps its original form for good; nothing is retried.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, RwLock},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use dashmap::{DashMap, DashSet};
use tracing::{debug, info, warn};

use crate::{
    transform::{SyncTransformer, UnitTransformer},
    unit::{Binary, LoadingContext, ProtectionDomain, TypeHandle},
    Error, Result,
};

/// What the background worker concluded for one resolved unit.
#[derive(Debug, Clone)]
pub enum CachedOutcome {
    /// Install this binary when the unit is redelivered
    Rewritten(Binary),
    /// Keep whatever the runtime delivers
    Unchanged,
}

/// Everything the worker needs to run the pipeline for one unit.
struct RetransformTask {
    loader: LoadingContext,
    name: String,
    handle: TypeHandle,
    protection: Option<ProtectionDomain>,
    binary: Binary,
}

/// State shared between the hook and the worker.
struct Shared {
    inner: Arc<SyncTransformer>,
    outcomes: DashMap<TypeHandle, CachedOutcome>,
    pending: DashSet<TypeHandle>,
}

impl Shared {
    fn run(&self, receiver: &Receiver<RetransformTask>) {
        for task in receiver.iter() {
            let handle = task.handle.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| self.process(task))).is_err() {
                warn!(unit = handle.name(), "retransform task panicked, unit left unchanged");
                self.outcomes.insert(handle.clone(), CachedOutcome::Unchanged);
            }
            self.pending.remove(&handle);
        }
        debug!("retransform worker stopped");
    }

    fn process(&self, task: RetransformTask) {
        let rewritten = self.inner.transform(
            &task.loader,
            &task.name,
            Some(&task.handle),
            task.protection.as_ref(),
            &task.binary,
        );

        let Some(rewritten) = rewritten else {
            self.outcomes
                .insert(task.handle.clone(), CachedOutcome::Unchanged);
            return;
        };

        // The runtime calls back into the hook before `retransform` returns; the rewrite
        // must already be visible and no map guard may be held.
        self.outcomes
            .insert(task.handle.clone(), CachedOutcome::Rewritten(rewritten));

        info!(unit = %task.name, loader = %task.loader, "retransform requested");
        let instrumentation = self.inner.registration().instrumentation().clone();
        if let Err(error) = instrumentation.retransform(&task.handle) {
            warn!(
                unit = %task.name,
                loader = %task.loader,
                %error,
                "retransform failed, unit keeps its original form"
            );
            self.outcomes
                .insert(task.handle.clone(), CachedOutcome::Unchanged);
        }
    }
}

/// A transform hook that returns immediately and rewrites in the background.
///
/// Units delivered without a resolved handle cannot be retransformed later, so they are
/// passed through unchanged.
///
/// Outcomes stay cached for every handle the hook has seen until [`Self::forget`] drops them.
pub struct RetransformingTransformer {
    shared: Arc<Shared>,
    sender: RwLock<Option<Sender<RetransformTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RetransformingTransformer {
    /// Wraps `inner` and starts the background worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the worker thread cannot be spawned.
    pub fn new(inner: Arc<SyncTransformer>) -> Result<Self> {
        let config = inner.registration().config();
        let (sender, receiver) = bounded(config.retransform_queue_capacity.max(1));
        let worker_name = config.worker_name.clone();

        let shared = Arc::new(Shared {
            inner,
            outcomes: DashMap::new(),
            pending: DashSet::new(),
        });

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name(worker_name)
                .spawn(move || shared.run(&receiver))
                .map_err(|error| {
                    Error::Error(format!("unable to spawn retransform worker: {error}"))
                })?
        };

        Ok(RetransformingTransformer {
            shared,
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The wrapped synchronous pipeline.
    #[must_use]
    pub fn inner(&self) -> &Arc<SyncTransformer> {
        &self.shared.inner
    }

    /// The outcome cached for `handle`, if its task has completed.
    #[must_use]
    pub fn cached(&self, handle: &TypeHandle) -> Option<CachedOutcome> {
        self.shared
            .outcomes
            .get(handle)
            .map(|outcome| outcome.clone())
    }

    /// Returns `true` if a task for `handle` is queued or running.
    #[must_use]
    pub fn is_pending(&self, handle: &TypeHandle) -> bool {
        self.shared.pending.contains(handle)
    }

    /// Number of queued or running tasks.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    /// Returns `true` while the queue accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        read_lock!(self.sender).is_some()
    }

    /// Stops accepting work, lets the worker drain the queue, and waits for it.
    ///
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        write_lock!(self.sender).take();

        let worker = lock!(self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("retransform worker panicked");
            }
        }
    }

    /// Drops the outcome cached for `handle`, typically once the runtime reports the unit as
    /// unloaded. Returns the dropped outcome.
    ///
    /// A later hook call for the same handle schedules a new task.
    pub fn forget(&self, handle: &TypeHandle) -> Option<CachedOutcome> {
        self.shared
            .outcomes
            .remove(handle)
            .map(|(_, outcome)| outcome)
    }

    fn cached_binary(&self, handle: &TypeHandle, binary: &Binary) -> Option<Binary> {
        self.cached(handle).map(|outcome| match outcome {
            CachedOutcome::Rewritten(rewritten) => rewritten,
            CachedOutcome::Unchanged => binary.clone(),
        })
    }

    fn submit(&self, task: RetransformTask) -> Result<()> {
        let sender = read_lock!(self.sender);
        let Some(sender) = sender.as_ref() else {
            return Err(Error::QueueClosed);
        };

        sender.try_send(task).map_err(|error| match error {
            TrySendError::Full(_) => Error::QueueFull,
            TrySendError::Disconnected(_) => Error::QueueClosed,
        })
    }
}

impl UnitTransformer for RetransformingTransformer {
    fn transform(
        &self,
        loader: &LoadingContext,
        name: &str,
        redefined: Option<&TypeHandle>,
        protection: Option<&ProtectionDomain>,
        binary: &Binary,
    ) -> Option<Binary> {
        let Some(handle) = redefined else {
            debug!(unit = name, "no resolved handle, unit passed through");
            return Some(binary.clone());
        };

        if let Some(installed) = self.cached_binary(handle, binary) {
            return Some(installed);
        }

        if !self.shared.pending.insert(handle.clone()) {
            return Some(binary.clone());
        }

        // The worker stores the outcome before it clears the pending mark, so a task that
        // finished since the first lookup is visible here.
        if let Some(installed) = self.cached_binary(handle, binary) {
            self.shared.pending.remove(handle);
            return Some(installed);
        }

        let task = RetransformTask {
            loader: loader.clone(),
            name: name.to_string(),
            handle: handle.clone(),
            protection: protection.cloned(),
            binary: binary.clone(),
        };
        if let Err(error) = self.submit(task) {
            self.shared.pending.remove(handle);
            warn!(unit = name, %error, "retransform not scheduled, unit left unchanged");
        }

        Some(binary.clone())
    }
}

impl Drop for RetransformingTransformer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{
        config::TransformConfig,
        matcher::PatternMatcher,
        test::factories::{
            app_loader, registration_with_runtime, wait_for, FakeInstrumentation, StubBuilder,
            StubWeaver,
        },
    };

    fn wrapper(
        config: TransformConfig,
        instrumentation: Arc<FakeInstrumentation>,
    ) -> Arc<RetransformingTransformer> {
        let registration = registration_with_runtime(
            Arc::new(PatternMatcher::new("com.example.*", "*")),
            config,
            instrumentation.clone(),
        );
        let builder = Arc::new(
            StubBuilder::new()
                .with_unit("com.example.Baz", &["qux"])
                .with_unit("com.example.Plain", &[]),
        );
        let sync = Arc::new(SyncTransformer::new(
            registration,
            builder,
            Arc::new(StubWeaver::new()),
        ));
        let wrapper = Arc::new(RetransformingTransformer::new(sync).unwrap());
        let hook: Arc<dyn UnitTransformer> = wrapper.clone();
        instrumentation.attach(&hook);
        wrapper
    }

    #[test]
    fn first_call_returns_original_then_installs_rewrite() {
        let instrumentation = Arc::new(FakeInstrumentation::new());
        let wrapper = wrapper(TransformConfig::default(), instrumentation.clone());
        let handle = TypeHandle::new(21, "com.example.Baz", app_loader());
        let binary = StubBuilder::encode("com.example.Baz", &["qux"]);
        instrumentation.load(&handle, binary.clone());

        let first = wrapper
            .transform(&app_loader(), "com.example.Baz", Some(&handle), None, &binary)
            .unwrap();
        assert!(first.same_storage(&binary));

        assert!(wait_for(Duration::from_secs(5), || instrumentation
            .installed(&handle)
            .is_some_and(|installed| !installed.same_storage(&binary))));
        assert_eq!(instrumentation.retransforms(), vec![handle.clone()]);

        let again = wrapper
            .transform(&app_loader(), "com.example.Baz", Some(&handle), None, &binary)
            .unwrap();
        assert!(matches!(
            wrapper.cached(&handle),
            Some(CachedOutcome::Rewritten(cached)) if cached.same_storage(&again)
        ));
        assert_eq!(wrapper.inner().registration().statistic().snapshot().rewrites, 1);
    }

    #[test]
    fn no_match_is_not_retransformed() {
        let instrumentation = Arc::new(FakeInstrumentation::new());
        let wrapper = wrapper(TransformConfig::default(), instrumentation.clone());
        let handle = TypeHandle::new(22, "com.example.Plain", app_loader());
        let binary = StubBuilder::encode("com.example.Plain", &[]);

        wrapper.transform(&app_loader(), "com.example.Plain", Some(&handle), None, &binary);
        assert!(wait_for(Duration::from_secs(5), || matches!(
            wrapper.cached(&handle),
            Some(CachedOutcome::Unchanged)
        )));
        assert!(instrumentation.retransforms().is_empty());
    }

    #[test]
    fn rejected_retransform_keeps_original() {
        let instrumentation = Arc::new(FakeInstrumentation::new());
        let wrapper = wrapper(TransformConfig::default(), instrumentation.clone());
        let handle = TypeHandle::new(23, "com.example.Baz", app_loader());
        let binary = StubBuilder::encode("com.example.Baz", &["qux"]);
        instrumentation.reject(&handle);

        wrapper.transform(&app_loader(), "com.example.Baz", Some(&handle), None, &binary);
        assert!(wait_for(Duration::from_secs(5), || matches!(
            wrapper.cached(&handle),
            Some(CachedOutcome::Unchanged)
        ) && !wrapper.is_pending(&handle)));

        let later = wrapper
            .transform(&app_loader(), "com.example.Baz", Some(&handle), None, &binary)
            .unwrap();
        assert!(later.same_storage(&binary));
        assert_eq!(instrumentation.retransforms().len(), 1);
    }

    #[test]
    fn units_without_handle_pass_through() {
        let instrumentation = Arc::new(FakeInstrumentation::new());
        let wrapper = wrapper(TransformConfig::default(), instrumentation.clone());
        let binary = StubBuilder::encode("com.example.Baz", &["qux"]);

        let result = wrapper
            .transform(&app_loader(), "com.example.Baz", None, None, &binary)
            .unwrap();
        assert!(result.same_storage(&binary));
        assert_eq!(wrapper.pending_len(), 0);
    }

    #[test]
    fn forgotten_units_are_scheduled_again() {
        let instrumentation = Arc::new(FakeInstrumentation::new());
        let wrapper = wrapper(TransformConfig::default(), instrumentation.clone());
        let handle = TypeHandle::new(25, "com.example.Plain", app_loader());
        let binary = StubBuilder::encode("com.example.Plain", &[]);

        wrapper.transform(&app_loader(), "com.example.Plain", Some(&handle), None, &binary);
        assert!(wait_for(Duration::from_secs(5), || wrapper.cached(&handle).is_some()
            && !wrapper.is_pending(&handle)));

        assert!(matches!(wrapper.forget(&handle), Some(CachedOutcome::Unchanged)));
        assert!(wrapper.cached(&handle).is_none());
        assert!(wrapper.forget(&handle).is_none());

        wrapper.transform(&app_loader(), "com.example.Plain", Some(&handle), None, &binary);
        assert!(wait_for(Duration::from_secs(5), || wrapper.cached(&handle).is_some()));
    }

    #[test]
    fn shutdown_closes_the_queue() {
        let instrumentation = Arc::new(FakeInstrumentation::new());
        let wrapper = wrapper(TransformConfig::default(), instrumentation.clone());
        wrapper.shutdown();
        wrapper.shutdown();
        assert!(!wrapper.is_running());

        let handle = TypeHandle::new(24, "com.example.Baz", app_loader());
        let binary = StubBuilder::encode("com.example.Baz", &["qux"]);
        let result = wrapper
            .transform(&app_loader(), "com.example.Baz", Some(&handle), None, &binary)
            .unwrap();
        assert!(result.same_storage(&binary));
        assert!(!wrapper.is_pending(&handle));
        assert!(instrumentation.retransforms().is_empty());
    }
}
