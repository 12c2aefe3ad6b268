//! Module discovery and process-wide binding.
//!
//! The host calls [`load`] once during startup. The first call opens
//! [`MODULE_NAME`](crate::ffi::MODULE_NAME) with lazy binding and local
//! visibility, resolves every required entry point, and publishes the
//! resulting [`Registry`]. Later calls return the same registry without
//! touching the module again.
//!
//! # State Machine
//!
//! ```text
//! UNLOADED ──load()──▶ LOADING ──ok──▶ BOUND
//!                         │
//!                         └──err──▶ diagnostic on stderr, abort
//! ```
//!
//! A missing or incompatible module is a deployment error. It is reported
//! as one line on stderr and the process aborts before the host can serve
//! any instruction. Hosts that want to handle the error themselves can
//! call [`Registry::open`] directly.

use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use libloading::Library;

use crate::binder::{BindError, EntryPoints, SymbolSource};
use crate::call::{AsipBackend, CallResult};
use crate::config::Config;

/// An opened extension module.
///
/// The library handle is leaked on open: the module stays mapped for the
/// life of the process even after every `AsipModule` is dropped, so entry
/// points copied out of it can never dangle.
#[derive(Debug)]
pub struct AsipModule {
    library: &'static Library,
    path: String,
}

impl AsipModule {
    /// Open the module at `path` with lazy, local symbol binding.
    ///
    /// A bare file name is resolved through the platform search path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BindError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        log::debug!("opening ASIP module {}", display);

        let library = open_library(path).map_err(|e| BindError::Open {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            library: Box::leak(Box::new(library)),
            path: display,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL};

    // SAFETY: running the module's initializers is the point of loading it.
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_LOCAL)? };
    Ok(library.into())
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: as above; the platform loader has no lazy/local distinction.
    unsafe { Library::new(path) }
}

// SAFETY: the module is never unloaded, and exporting the four entry points
// with the signatures in `ffi` is the module's side of the ABI.
unsafe impl SymbolSource for AsipModule {
    fn lookup(&self, name: &'static str) -> Result<NonNull<c_void>, BindError> {
        // SAFETY: only the symbol's address is read here; the binder gives
        // it a type.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }.map_err(|e| {
            BindError::MissingSymbol {
                symbol: name,
                reason: e.to_string(),
            }
        })?;

        NonNull::new(*symbol).ok_or_else(|| BindError::MissingSymbol {
            symbol: name,
            reason: "symbol resolves to null".to_string(),
        })
    }
}

/// A loaded module together with its bound entry points.
#[derive(Debug)]
pub struct Registry {
    entry_points: EntryPoints,
    module: AsipModule,
}

impl Registry {
    /// Open the module at `path` and bind every required entry point.
    ///
    /// This is the startup validation step: either the whole table is bound
    /// or nothing is returned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BindError> {
        let module = AsipModule::open(path)?;
        let entry_points = EntryPoints::resolve(&module)?;
        log::info!("bound ASIP module {}", module.path());
        Ok(Self {
            entry_points,
            module,
        })
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    pub fn module_path(&self) -> &str {
        self.module.path()
    }
}

impl AsipBackend for Registry {
    fn unpack_instruction(&self, opcode: u32) -> CallResult<String> {
        self.entry_points.unpack_instruction(opcode)
    }

    fn execute_instruction32(&self, op_name: &str, inputs: &[u32]) -> CallResult<u32> {
        self.entry_points.execute_instruction32(op_name, inputs)
    }

    fn execute_instruction64(&self, op_name: &str, inputs: &[u64]) -> CallResult<u64> {
        self.entry_points.execute_instruction64(op_name, inputs)
    }

    fn initialize_machine(&self, machine_path: &str) -> CallResult<()> {
        self.entry_points.initialize_machine(machine_path)
    }
}

/// A once-only binding cell.
///
/// The first [`get_or_bind`](Self::get_or_bind) runs the binder; every later
/// call returns the same value. A binder error is fatal.
pub struct BindingSlot<T> {
    cell: OnceLock<T>,
    attempts: AtomicUsize,
}

impl<T> BindingSlot<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Bound value, binding it with `bind` on first use.
    ///
    /// On error, prints `openasip: <error>` to stderr and aborts.
    pub fn get_or_bind<F>(&self, bind: F) -> &T
    where
        F: FnOnce() -> Result<T, BindError>,
    {
        self.cell.get_or_init(|| {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match bind() {
                Ok(value) => value,
                Err(err) => fatal(&err),
            }
        })
    }

    /// Bound value, if binding already happened.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// How many times a binder has run.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl<T> Default for BindingSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn fatal(err: &BindError) -> ! {
    eprintln!("openasip: {}", err);
    std::process::abort()
}

static REGISTRY: BindingSlot<Registry> = BindingSlot::new();

/// Load and bind the extension module for this process.
///
/// Idempotent. Aborts the process if the module cannot be opened or any
/// entry point is missing.
pub fn load() -> &'static Registry {
    REGISTRY.get_or_bind(|| Registry::open(Config::get().module_path()))
}

/// The process-wide registry, if [`load`] has already succeeded.
pub fn loaded() -> Option<&'static Registry> {
    REGISTRY.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestModule;

    #[test]
    fn test_binding_slot_binds_once() {
        let slot: BindingSlot<EntryPoints> = BindingSlot::new();
        assert!(slot.get().is_none());

        let first = slot.get_or_bind(|| TestModule::complete().entry_points()) as *const _;
        let second = slot.get_or_bind(|| TestModule::complete().entry_points()) as *const _;

        assert_eq!(first, second);
        assert_eq!(slot.attempts(), 1);
        assert!(slot.get().is_some());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::ffi::MODULE_NAME);
        let err = Registry::open(&path).unwrap_err();
        match err {
            BindError::Open { path: reported, .. } => {
                assert_eq!(reported, path.display().to_string());
            }
            other => panic!("expected open failure, got {:?}", other),
        }
    }
}
