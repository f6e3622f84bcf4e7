//! ELF header parsing and validation
//!
//! This module parses the ELF file header at offset 0, determines the class and
//! byte order of the image and checks that the object type is one this crate
//! inspects. The program-header and section-header table locations are normalized
//! into [`TableLocation`]s so later stages never look at width-specific fields.

use super::{ElfClass, ElfView, Endian};
use crate::{Result, parse_ehdr_error};
use elf::abi::{EI_CLASS, EI_DATA, EI_VERSION, ELFMAGIC, ET_DYN, ET_EXEC, EV_CURRENT};

const EI_NIDENT: usize = 16;

/// Location of a table of fixed-size entries inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableLocation {
    /// File offset of the first entry.
    pub offset: u64,
    /// Number of entries.
    pub count: usize,
    /// Size in bytes of each entry.
    pub entry_size: usize,
}

impl TableLocation {
    /// File offset of entry `index`.
    #[inline]
    pub(crate) fn entry_offset(&self, index: usize) -> u64 {
        self.offset + (index as u64) * (self.entry_size as u64)
    }

    #[inline]
    fn byte_len(&self) -> Option<u64> {
        (self.count as u64).checked_mul(self.entry_size as u64)
    }
}

/// The object type of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// `ET_EXEC`
    Executable,
    /// `ET_DYN`, which covers both shared libraries and position-independent executables.
    SharedObject,
}

/// A parsed and validated ELF file header.
#[derive(Debug, Clone)]
pub struct ElfHeader {
    class: ElfClass,
    endian: Endian,
    module_type: ModuleType,
    e_machine: u16,
    e_flags: u32,
    e_entry: u64,
    e_shstrndx: u16,
    phdrs: TableLocation,
    shdrs: TableLocation,
}

impl ElfHeader {
    /// Parses the ELF header at the start of `data`.
    ///
    /// Fails if the buffer is too short, the magic, class, data encoding or
    /// version are unrecognized, the object type is neither `ET_EXEC` nor `ET_DYN`,
    /// or either header table lies outside the buffer.
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < EI_NIDENT {
            return Err(parse_ehdr_error("file is too short for an ELF header"));
        }
        if data[0..4] != ELFMAGIC {
            return Err(parse_ehdr_error("invalid ELF magic"));
        }
        let class = ElfClass::from_ident(data[EI_CLASS])
            .ok_or_else(|| parse_ehdr_error("unrecognized file class"))?;
        let endian = Endian::from_ident(data[EI_DATA])
            .ok_or_else(|| parse_ehdr_error("unrecognized data encoding"))?;
        if data[EI_VERSION] != EV_CURRENT {
            return Err(parse_ehdr_error("invalid ELF version"));
        }
        if data.len() < class.ehdr_size() {
            return Err(parse_ehdr_error("file is too short for an ELF header"));
        }

        let view = ElfView::new(data, class, endian);
        let module_type = match view.read_u16(16)? {
            ET_EXEC => ModuleType::Executable,
            ET_DYN => ModuleType::SharedObject,
            _ => {
                return Err(parse_ehdr_error(
                    "object type is neither an executable nor a shared object",
                ));
            }
        };
        let e_machine = view.read_u16(18)?;

        // Fields after e_version shift by the address width.
        let word = class.word_size() as u64;
        let e_entry = view.read_word(24)?;
        let e_phoff = view.read_word(24 + word)?;
        let e_shoff = view.read_word(24 + 2 * word)?;
        let tail = 24 + 3 * word;
        let e_flags = view.read_u32(tail)?;
        let e_phentsize = view.read_u16(tail + 6)?;
        let e_phnum = view.read_u16(tail + 8)?;
        let e_shentsize = view.read_u16(tail + 10)?;
        let e_shnum = view.read_u16(tail + 12)?;
        let e_shstrndx = view.read_u16(tail + 14)?;

        let phdrs = TableLocation {
            offset: e_phoff,
            count: e_phnum as usize,
            entry_size: e_phentsize as usize,
        };
        if phdrs.count > 0 && phdrs.entry_size < class.phdr_size() {
            return Err(parse_ehdr_error("program header entry size is too small"));
        }
        check_table(&phdrs, data.len(), "program header table is out of bounds")?;

        let mut shdrs = TableLocation {
            offset: e_shoff,
            count: e_shnum as usize,
            entry_size: e_shentsize as usize,
        };
        if e_shoff == 0 {
            shdrs.count = 0;
        } else if shdrs.count == 0 && shdrs.entry_size >= class.shdr_size() {
            // With 0 sections announced and a table present, the real count lives
            // in the sh_size field of the initial entry.
            if let Ok(initial) = view.read_shdr(e_shoff) {
                shdrs.count = usize::try_from(initial.sh_size)
                    .map_err(|_| parse_ehdr_error("section header count overflows"))?;
            }
        }
        if shdrs.count > 0 && shdrs.entry_size < class.shdr_size() {
            return Err(parse_ehdr_error("section header entry size is too small"));
        }
        check_table(&shdrs, data.len(), "section header table is out of bounds")?;

        Ok(Self {
            class,
            endian,
            module_type,
            e_machine,
            e_flags,
            e_entry,
            e_shstrndx,
            phdrs,
            shdrs,
        })
    }

    #[inline]
    pub fn class(&self) -> ElfClass {
        self.class
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    /// Checks if the ELF file is a shared object (`ET_DYN`).
    #[inline]
    pub fn is_dylib(&self) -> bool {
        self.module_type == ModuleType::SharedObject
    }

    #[inline]
    pub fn machine(&self) -> u16 {
        self.e_machine
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.e_flags
    }

    /// Link-time virtual address of the entry point.
    #[inline]
    pub fn entry(&self) -> u64 {
        self.e_entry
    }

    /// Index of the section holding section names.
    #[inline]
    pub fn shstrndx(&self) -> usize {
        self.e_shstrndx as usize
    }

    /// Location of the program header table.
    #[inline]
    pub fn phdr_table(&self) -> TableLocation {
        self.phdrs
    }

    /// Location of the section header table.
    #[inline]
    pub fn shdr_table(&self) -> TableLocation {
        self.shdrs
    }
}

fn check_table(table: &TableLocation, file_len: usize, msg: &'static str) -> Result<()> {
    if table.count == 0 {
        return Ok(());
    }
    let end = table
        .byte_len()
        .and_then(|len| table.offset.checked_add(len))
        .ok_or_else(|| parse_ehdr_error(msg))?;
    if end > file_len as u64 {
        return Err(parse_ehdr_error(msg));
    }
    Ok(())
}
