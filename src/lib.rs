//! asip-bridge library
//!
//! Runtime binding layer between an instruction-set simulator host and an
//! externally built ASIP extension module (`libopenasip.so`). The module
//! supplies all instruction semantics; this crate finds it, binds its four
//! entry points into a typed table, and exposes them through
//! [`AsipBackend`].
//!
//! # Example
//!
//! ```ignore
//! use asip_bridge::AsipBackend;
//!
//! // During host startup. Aborts with a diagnostic if the module is unusable.
//! let asip = asip_bridge::load();
//! asip.initialize_machine("machines/tta.adf")?;
//!
//! let text = asip.unpack_instruction(0x0103_0102)?;
//! let sum = asip.execute_instruction32("add", &[2, 3])?;
//! ```

pub mod ffi;
pub mod message;
pub mod call;
pub mod binder;
pub mod loader;
pub mod config;
pub mod testing;

pub use binder::{BindError, EntryPoints, SymbolSource};
pub use call::{AsipBackend, CallError, CallResult, EntryPoint};
pub use config::Config;
pub use loader::{load, loaded, AsipModule, BindingSlot, Registry};
pub use message::ForeignString;
