//! ELF (Executable and Linkable Format) data structures and utilities.

mod defs;
mod ehdr;
mod hash;
mod view;

pub(crate) use hash::{ElfGnuHash, ElfHash, HashTable};

// Public API exports
pub use defs::{ElfClass, ElfDyn, ElfPhdr, ElfShdr, ElfSym, Endian, SymbolBind, SymbolType};
pub use ehdr::{ElfHeader, ModuleType, TableLocation};
pub use view::ElfView;
/// ELF ABI constants and definitions from the elf crate.
pub use elf::abi::*;
