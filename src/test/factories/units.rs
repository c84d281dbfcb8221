//! Units, views and a structure builder over a textual binary format.
//!
//! A stub binary reads `STUB|<unit name>|<behavior>,<behavior>`. A woven stub binary has
//! `WOVEN|` in front of that.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::{
    structure::StructureBuilder,
    unit::{
        AccessFlags, Behavior, Binary, LoadingContext, StructuralView, TypeHandle, ViewOrigin,
    },
    Error, Result,
};

const STUB_MAGIC: &str = "STUB|";
const WOVEN_MAGIC: &str = "WOVEN|";

/// The application loading context every fixture lives in.
pub fn app_loader() -> LoadingContext {
    LoadingContext::new(3, "app")
}

/// The resolved handle of `com.example.Foo`.
pub fn foo_handle() -> TypeHandle {
    TypeHandle::new(1, "com.example.Foo", app_loader())
}

/// `com.example.Foo`: a `Runnable` with a constructor and `bar()`.
pub fn foo_view() -> StructuralView {
    view_of("com.example.Foo", app_loader(), ViewOrigin::Parsed, &["bar"])
}

/// A public unit extending `Object` and implementing `Runnable`, with a public constructor
/// and one public `void` behavior per entry of `behaviors`.
pub fn view_of(
    name: &str,
    loader: LoadingContext,
    origin: ViewOrigin,
    behaviors: &[&str],
) -> StructuralView {
    let view = StructuralView::new(name, loader, origin)
        .with_access(AccessFlags::PUBLIC)
        .with_superclass("java.lang.Object")
        .with_interface("java.lang.Runnable")
        .with_behavior(Behavior::new("<init>", "void").with_access(AccessFlags::PUBLIC));

    behaviors.iter().fold(view, |view, behavior| {
        view.with_behavior(Behavior::new(*behavior, "void").with_access(AccessFlags::PUBLIC))
    })
}

/// Builds views from stub binaries, and from a table of loaded units for resolved handles.
pub struct StubBuilder {
    loaded: DashMap<String, Vec<String>>,
    resolved_builds: AtomicUsize,
    parsed_builds: AtomicUsize,
}

impl StubBuilder {
    /// A builder that knows `com.example.Foo` with `bar()` as loaded.
    pub fn new() -> Self {
        StubBuilder {
            loaded: DashMap::new(),
            resolved_builds: AtomicUsize::new(0),
            parsed_builds: AtomicUsize::new(0),
        }
        .with_unit("com.example.Foo", &["bar"])
    }

    /// Marks `name` as loaded with `behaviors`.
    pub fn with_unit(self, name: &str, behaviors: &[&str]) -> Self {
        self.loaded.insert(
            name.to_string(),
            behaviors.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Encodes a stub binary.
    pub fn encode(name: &str, behaviors: &[&str]) -> Binary {
        Binary::new(format!("{STUB_MAGIC}{name}|{}", behaviors.join(",")).into_bytes())
    }

    /// Number of views built from resolved handles.
    pub fn resolved_builds(&self) -> usize {
        self.resolved_builds.load(Ordering::SeqCst)
    }

    /// Number of views parsed from binaries.
    pub fn parsed_builds(&self) -> usize {
        self.parsed_builds.load(Ordering::SeqCst)
    }
}

impl StructureBuilder for StubBuilder {
    fn from_resolved(&self, handle: &TypeHandle) -> Result<StructuralView> {
        self.resolved_builds.fetch_add(1, Ordering::SeqCst);
        let behaviors = self
            .loaded
            .get(handle.name())
            .ok_or_else(|| Error::Error(format!("{} is not loaded", handle.name())))?;
        let behaviors: Vec<&str> = behaviors.iter().map(String::as_str).collect();

        Ok(view_of(
            handle.name(),
            handle.loader().clone(),
            ViewOrigin::Reflective,
            &behaviors,
        ))
    }

    fn from_binary(&self, binary: &Binary, loader: &LoadingContext) -> Result<StructuralView> {
        if binary.is_empty() {
            return Err(Error::Empty);
        }

        let text = std::str::from_utf8(binary.as_bytes())
            .map_err(|error| malformed_error!("stub binary is not text: {}", error))?;
        let text = text.strip_prefix(WOVEN_MAGIC).unwrap_or(text);
        let Some(body) = text.strip_prefix(STUB_MAGIC) else {
            return Err(malformed_error!("missing stub magic"));
        };
        let Some((name, behaviors)) = body.split_once('|') else {
            return Err(malformed_error!("missing behavior list"));
        };

        self.parsed_builds.fetch_add(1, Ordering::SeqCst);
        let behaviors: Vec<&str> = behaviors.split(',').filter(|b| !b.is_empty()).collect();
        Ok(view_of(name, loader.clone(), ViewOrigin::Parsed, &behaviors))
    }
}
