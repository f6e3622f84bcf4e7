//! ELF format definitions.
//!
//! This module provides class-independent representations of the ELF structures
//! the inspector walks: program headers, section headers, symbols and dynamic
//! entries. Each record is decoded from either its 32-bit or 64-bit on-disk layout
//! (see [`ElfView`](super::ElfView)) and widened to 64-bit fields, so nothing
//! downstream needs to branch on the file class again.

use elf::abi::{
    ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, SHN_UNDEF, STB_GLOBAL, STB_GNU_UNIQUE,
    STB_LOCAL, STB_WEAK, STT_COMMON, STT_FILE, STT_FUNC, STT_GNU_IFUNC, STT_NOTYPE, STT_OBJECT,
    STT_SECTION, STT_TLS,
};

/// The ELF file class, selected once when the header is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfClass {
    /// `ELFCLASS32`
    Elf32,
    /// `ELFCLASS64`
    Elf64,
}

impl ElfClass {
    pub(crate) fn from_ident(ei_class: u8) -> Option<Self> {
        match ei_class {
            ELFCLASS32 => Some(ElfClass::Elf32),
            ELFCLASS64 => Some(ElfClass::Elf64),
            _ => None,
        }
    }

    /// Size of the file header.
    #[inline]
    pub const fn ehdr_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    /// Size of one program header entry.
    #[inline]
    pub const fn phdr_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    /// Size of one section header entry.
    #[inline]
    pub const fn shdr_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    /// Size of one symbol table entry.
    #[inline]
    pub const fn sym_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 16,
            ElfClass::Elf64 => 24,
        }
    }

    /// Size of one dynamic entry.
    #[inline]
    pub const fn dyn_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 8,
            ElfClass::Elf64 => 16,
        }
    }

    /// Size of an address or `Xword`.
    #[inline]
    pub const fn word_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }
}

/// Byte order of the multi-byte fields in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// `ELFDATA2LSB`
    Little,
    /// `ELFDATA2MSB`
    Big,
}

impl Endian {
    pub(crate) fn from_ident(ei_data: u8) -> Option<Self> {
        match ei_data {
            ELFDATA2LSB => Some(Endian::Little),
            ELFDATA2MSB => Some(Endian::Big),
            _ => None,
        }
    }
}

/// ELF program header, widened to 64-bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElfPhdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ElfPhdr {
    /// Returns the file offset backing `vaddr..vaddr + len`, if this segment's file
    /// image covers the whole range.
    ///
    /// A segment whose file image does not fit in a file of `file_len` bytes
    /// backs nothing.
    #[inline]
    pub(crate) fn file_offset_of(&self, vaddr: u64, len: u64, file_len: u64) -> Option<u64> {
        if self.p_offset.checked_add(self.p_filesz)? > file_len {
            return None;
        }
        let start = vaddr.checked_sub(self.p_vaddr)?;
        let end = start.checked_add(len)?;
        if end > self.p_filesz {
            return None;
        }
        Some(self.p_offset + start)
    }
}

/// ELF section header, widened to 64-bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElfShdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// ELF symbol table entry, widened to 64-bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElfSym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl ElfSym {
    /// Returns the symbol binding.
    #[inline]
    pub fn st_bind(&self) -> u8 {
        self.st_info >> 4
    }

    /// Returns the symbol type.
    #[inline]
    pub fn st_type(&self) -> u8 {
        self.st_info & 0xf
    }

    /// Returns true if the symbol is undefined (not defined in this object file).
    #[inline]
    pub fn is_undef(&self) -> bool {
        self.st_shndx == SHN_UNDEF
    }
}

/// ELF dynamic entry. `d_tag` is sign-extended for 32-bit images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElfDyn {
    pub d_tag: i64,
    pub d_val: u64,
}

/// The type of a symbol, decoded from `st_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolType {
    NoType,
    Object,
    Function,
    Section,
    File,
    Common,
    Tls,
    GnuIndirectFunction,
    Other(u8),
}

impl From<u8> for SymbolType {
    fn from(value: u8) -> Self {
        match value {
            STT_NOTYPE => SymbolType::NoType,
            STT_OBJECT => SymbolType::Object,
            STT_FUNC => SymbolType::Function,
            STT_SECTION => SymbolType::Section,
            STT_FILE => SymbolType::File,
            STT_COMMON => SymbolType::Common,
            STT_TLS => SymbolType::Tls,
            STT_GNU_IFUNC => SymbolType::GnuIndirectFunction,
            other => SymbolType::Other(other),
        }
    }
}

/// The binding of a symbol, decoded from `st_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolBind {
    Local,
    Global,
    Weak,
    GnuUnique,
    Other(u8),
}

impl From<u8> for SymbolBind {
    fn from(value: u8) -> Self {
        match value {
            STB_LOCAL => SymbolBind::Local,
            STB_GLOBAL => SymbolBind::Global,
            STB_WEAK => SymbolBind::Weak,
            STB_GNU_UNIQUE => SymbolBind::GnuUnique,
            other => SymbolBind::Other(other),
        }
    }
}
