//! Fake weavers, runtime and listener.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use dashmap::{DashMap, DashSet};

use crate::{
    config::TransformConfig,
    matcher::MatcherRc,
    transform::{
        Event, EventListener, Instrumentation, ListenerIds, Registration, UnitTransformer,
        WeaveRequest, Weaver,
    },
    unit::{Binary, TypeHandle},
    Error, Result,
};

const WOVEN_MAGIC: &[u8] = b"WOVEN|";

/// Prefixes binaries with a woven marker; already woven binaries come back unchanged.
#[derive(Default)]
pub struct StubWeaver {
    calls: AtomicUsize,
}

impl StubWeaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of weave requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Weaver for StubWeaver {
    fn weave(&self, request: &WeaveRequest<'_>) -> Result<Binary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.binary.starts_with(WOVEN_MAGIC) {
            return Ok(request.binary.clone());
        }

        let mut woven = WOVEN_MAGIC.to_vec();
        woven.extend_from_slice(request.binary.as_bytes());
        Ok(Binary::new(woven))
    }
}

/// Fails every weave request.
pub struct FailingWeaver;

impl Weaver for FailingWeaver {
    fn weave(&self, request: &WeaveRequest<'_>) -> Result<Binary> {
        Err(Error::Weave(format!("cannot rewrite {}", request.unit)))
    }
}

/// Panics on every weave request.
pub struct PanickingWeaver;

impl Weaver for PanickingWeaver {
    fn weave(&self, _request: &WeaveRequest<'_>) -> Result<Binary> {
        panic!("weaver bug")
    }
}

/// Records every event it receives.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        lock!(self.events).clone()
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &Event) {
        lock!(self.events).push(event.clone());
    }
}

/// A runtime that redelivers loaded units through an attached hook.
#[derive(Default)]
pub struct FakeInstrumentation {
    native_prefix_supported: bool,
    hook: Mutex<Option<Weak<dyn UnitTransformer>>>,
    loaded: DashMap<TypeHandle, Binary>,
    installed: DashMap<TypeHandle, Binary>,
    rejected: DashSet<TypeHandle>,
    retransforms: Mutex<Vec<TypeHandle>>,
    native_prefixes: Mutex<Vec<(u32, String)>>,
}

impl FakeInstrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native_prefix_support(mut self) -> Self {
        self.native_prefix_supported = true;
        self
    }

    /// Routes redeliveries through `hook`.
    pub fn attach(&self, hook: &Arc<dyn UnitTransformer>) {
        *lock!(self.hook) = Some(Arc::downgrade(hook));
    }

    /// Marks `handle` as loaded with `binary`.
    pub fn load(&self, handle: &TypeHandle, binary: Binary) {
        self.loaded.insert(handle.clone(), binary);
    }

    /// Makes retransform requests for `handle` fail.
    pub fn reject(&self, handle: &TypeHandle) {
        self.rejected.insert(handle.clone());
    }

    /// Every retransform request received, in order.
    pub fn retransforms(&self) -> Vec<TypeHandle> {
        lock!(self.retransforms).clone()
    }

    /// The binary the hook installed for `handle` on redelivery.
    pub fn installed(&self, handle: &TypeHandle) -> Option<Binary> {
        self.installed.get(handle).map(|binary| binary.clone())
    }

    pub fn native_prefixes(&self) -> Vec<(u32, String)> {
        lock!(self.native_prefixes).clone()
    }
}

impl Instrumentation for FakeInstrumentation {
    fn retransform(&self, handle: &TypeHandle) -> Result<()> {
        lock!(self.retransforms).push(handle.clone());
        if self.rejected.contains(handle) {
            return Err(Error::RetransformRejected {
                unit: handle.name().to_string(),
                reason: "unit was unloaded".to_string(),
            });
        }

        let hook = lock!(self.hook).as_ref().and_then(Weak::upgrade);
        let current = self.loaded.get(handle).map(|binary| binary.clone());
        if let (Some(hook), Some(current)) = (hook, current) {
            let installed = hook
                .transform(handle.loader(), handle.name(), Some(handle), None, &current)
                .unwrap_or(current);
            self.installed.insert(handle.clone(), installed);
        }
        Ok(())
    }

    fn is_native_method_prefix_supported(&self) -> bool {
        self.native_prefix_supported
    }

    fn set_native_method_prefix(&self, watch_id: u32, prefix: &str) -> Result<()> {
        lock!(self.native_prefixes).push((watch_id, prefix.to_string()));
        Ok(())
    }
}

/// A registration of `matcher` with a recording listener and a fresh fake runtime.
pub fn registration_with(matcher: MatcherRc, config: TransformConfig) -> Arc<Registration> {
    registration_with_runtime(matcher, config, Arc::new(FakeInstrumentation::new()))
}

/// A registration of `matcher` with a recording listener, installed into `runtime`.
pub fn registration_with_runtime(
    matcher: MatcherRc,
    config: TransformConfig,
    runtime: Arc<FakeInstrumentation>,
) -> Arc<Registration> {
    let registration = Registration::builder(
        1,
        "test-module",
        matcher,
        Arc::new(RecordingListener::default()),
        runtime,
    )
    .config(config)
    .build(&ListenerIds::new())
    .expect("test registration");
    Arc::new(registration)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
