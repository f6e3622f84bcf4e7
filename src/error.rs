use alloc::borrow::Cow;
use core::fmt::Display;

/// Error types used throughout the `elf_module` library.
///
/// Construction of a [`Module`](crate::Module) fails with one of these errors when
/// the file cannot be mapped or its header is unusable. Enumerations only fail
/// when the data they walk is malformed; a missing optional structure is not an error.
#[derive(Debug)]
pub enum Error {
    /// An error occurred while opening or inspecting an ELF file.
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while mapping a file into memory.
    Mmap {
        /// A descriptive message about the memory mapping error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while parsing the ELF header.
    ///
    /// This error typically indicates issues with the ELF header such as:
    /// * Invalid magic bytes
    /// * Unsupported ELF class or data encoding
    /// * An object type other than `ET_EXEC` or `ET_DYN`
    ParseEhdr {
        /// A descriptive message about the ELF header parsing error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while parsing program headers.
    ParsePhdr {
        /// A descriptive message about the program header parsing error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while parsing section headers.
    ParseShdr {
        /// A descriptive message about the section header parsing error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while parsing the dynamic segment or a table it references.
    ParseDynamic {
        /// A descriptive message about the dynamic section parsing error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while reading a symbol or one of its names.
    ParseSymbol {
        /// A descriptive message about the symbol parsing error.
        msg: Cow<'static, str>,
    },

    /// A read fell outside the image.
    OutOfBounds {
        /// File offset of the attempted read.
        offset: u64,
        /// Length of the attempted read.
        len: u64,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
            Error::Mmap { msg } => write!(f, "Memory mapping error: {msg}"),
            Error::ParseEhdr { msg } => write!(f, "ELF header parsing error: {msg}"),
            Error::ParsePhdr { msg } => write!(f, "Program header parsing error: {msg}"),
            Error::ParseShdr { msg } => write!(f, "Section header parsing error: {msg}"),
            Error::ParseDynamic { msg } => write!(f, "Dynamic section parsing error: {msg}"),
            Error::ParseSymbol { msg } => write!(f, "Symbol parsing error: {msg}"),
            Error::OutOfBounds { offset, len } => write!(
                f,
                "read of {len} bytes at offset 0x{offset:x} is out of bounds"
            ),
        }
    }
}

impl core::error::Error for Error {}

#[cold]
#[inline(never)]
#[allow(unused)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}

#[cold]
#[inline(never)]
#[allow(unused)]
pub(crate) fn mmap_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Mmap { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_ehdr_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ParseEhdr { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_phdr_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ParsePhdr { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_shdr_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ParseShdr { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_dynamic_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ParseDynamic { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_symbol_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ParseSymbol { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn out_of_bounds(offset: u64, len: u64) -> Error {
    Error::OutOfBounds { offset, len }
}
