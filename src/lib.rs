//! # elf_module
//! Inspect ELF executables and shared objects that are loaded in a process.
//! ## Usage
//! A [`Module`] is built from the module's file image and the address it is loaded
//! at. It then answers, on demand and without caching, which libraries the module
//! needs, which symbols it imports and exports, and where those symbols live at
//! runtime. 32-bit and 64-bit images of either byte order are supported,
//! independent of the host.
//! ## Example
//! ```no_run
//! use core::ops::ControlFlow;
//! use elf_module::Module;
//!
//! let module = Module::new_from_memory("/usr/lib/libc.so.6", Some(0x7f00_0000_0000))?;
//! module.enumerate_exports(|export| {
//!     println!("{} @ 0x{:x}", export.name, export.address);
//!     ControlFlow::Continue(())
//! })?;
//! # Ok::<(), elf_module::Error>(())
//! ```
#![no_std]
extern crate alloc;

pub mod dynamic;
pub mod elf;
mod error;
pub mod export;
mod module;
mod os;
pub mod section;
pub mod segment;
pub mod symbol;

pub use dynamic::{DependencyDetails, DynamicEntries, DynamicEntry};
pub use error::Error;
pub use export::{ExportDetails, ImportDetails, SymbolKind};
pub use module::Module;
pub use section::{SectionDetails, SectionHeaders};
pub use segment::{AddressResolver, ProgramHeaders, ProtFlags, SegmentDetails};
pub use symbol::{Symbol, Symbols};

pub(crate) use error::{
    io_error, mmap_error, parse_dynamic_error, parse_ehdr_error, parse_phdr_error,
    parse_shdr_error, parse_symbol_error,
};

/// A type alias for `Result`s returned by `elf_module` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly specify
/// the `Error` type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;
