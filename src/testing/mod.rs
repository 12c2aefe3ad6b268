//! In-process test double for an ASIP extension module.
//!
//! [`TestModule`] stands in for `libopenasip.so`: it is a symbol table
//! whose entries point at `extern "C"` functions compiled into this crate,
//! so binding and call contracts can be exercised without building a
//! shared library.
//!
//! Strings handed out by the double are tracked process-wide. Tables built
//! with [`TestModule::entry_points`] release through [`tracked_release`],
//! which counts releases per string instead of corrupting the heap.
//!
//! # Example
//!
//! ```
//! use asip_bridge::testing::TestModule;
//! use asip_bridge::AsipBackend;
//!
//! let entry_points = TestModule::complete().entry_points().unwrap();
//! assert_eq!(entry_points.execute_instruction32("add", &[2, 3]).unwrap(), 5);
//! ```

mod double;

pub use double::{alloc_string, is_live, release_count, tracked_release, TestModule};
