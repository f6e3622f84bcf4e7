//! Section header table access
//!
//! Sections are link-time metadata and are not needed to inspect a loaded
//! module, but the static symbol table (`.symtab`) is only reachable through
//! them. Stripped images may have no section header table at all, in which
//! case every lookup here comes back empty.

use crate::{
    Result,
    elf::{ElfHeader, ElfShdr, ElfView, SHN_UNDEF, SHN_XINDEX, SHT_NOBITS, TableLocation},
    parse_shdr_error,
    segment::AddressResolver,
    symbol::{StringTable, utf8_name},
};

/// Iterator over the section header table, yielding `(index, header)` pairs.
#[derive(Clone)]
pub struct SectionHeaders<'data> {
    view: ElfView<'data>,
    table: TableLocation,
    index: usize,
}

impl<'data> SectionHeaders<'data> {
    pub(crate) fn new(view: ElfView<'data>, header: &ElfHeader) -> Self {
        Self {
            view,
            table: header.shdr_table(),
            index: 0,
        }
    }

    /// Reads the header at `index`, failing if the table has no such entry.
    pub(crate) fn get(&self, index: usize) -> Result<ElfShdr> {
        if index >= self.table.count {
            return Err(parse_shdr_error(alloc::format!(
                "section index {index} is out of range"
            )));
        }
        self.view.read_shdr(self.table.entry_offset(index))
    }
}

impl Iterator for SectionHeaders<'_> {
    type Item = Result<(usize, ElfShdr)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.table.count {
            return None;
        }
        let index = self.index;
        self.index += 1;
        match self.view.read_shdr(self.table.entry_offset(index)) {
            Ok(shdr) => Some(Ok((index, shdr))),
            Err(err) => {
                self.index = self.table.count;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.table.count.saturating_sub(self.index)))
    }
}

/// Returns the first section whose type is `sh_type`, with its index.
///
/// The reserved entry 0 is never a match.
pub(crate) fn find_section_header(
    shdrs: SectionHeaders<'_>,
    sh_type: u32,
) -> Result<Option<(usize, ElfShdr)>> {
    for item in shdrs.skip(1) {
        let (index, shdr) = item?;
        if shdr.sh_type == sh_type {
            return Ok(Some((index, shdr)));
        }
    }
    Ok(None)
}

/// Returns the string table a section's `sh_link` points at.
pub(crate) fn linked_string_table<'data>(
    shdrs: &SectionHeaders<'data>,
    shdr: &ElfShdr,
) -> Result<StringTable<'data>> {
    let strtab = shdrs.get(shdr.sh_link as usize)?;
    string_table_of(shdrs.view, &strtab)
}

fn string_table_of<'data>(view: ElfView<'data>, shdr: &ElfShdr) -> Result<StringTable<'data>> {
    if shdr.sh_type == SHT_NOBITS {
        return Err(parse_shdr_error("string table section has no file data"));
    }
    view.bytes(shdr.sh_offset, shdr.sh_size)?;
    Ok(StringTable::new(view, shdr.sh_offset, Some(shdr.sh_size)))
}

/// Returns the section-name string table, if the header names one.
pub(crate) fn section_names<'data>(
    shdrs: &SectionHeaders<'data>,
    header: &ElfHeader,
) -> Result<Option<StringTable<'data>>> {
    let mut index = header.shstrndx();
    if index == SHN_UNDEF as usize {
        return Ok(None);
    }
    if index == SHN_XINDEX as usize {
        // The real index did not fit and lives in sh_link of the initial entry.
        index = shdrs.get(0)?.sh_link as usize;
    }
    let shdr = shdrs.get(index)?;
    string_table_of(shdrs.view, &shdr).map(Some)
}

/// A section header as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDetails<'m> {
    pub index: usize,
    /// Name from the section-name string table, empty when there is none or it
    /// is not valid UTF-8.
    pub name: &'m str,
    pub section_type: u32,
    pub flags: u64,
    /// Runtime address, or 0 for sections that are not loaded.
    pub address: u64,
    pub file_offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub alignment: u64,
    pub entry_size: u64,
}

impl<'m> SectionDetails<'m> {
    pub(crate) fn new(
        index: usize,
        shdr: &ElfShdr,
        names: Option<&StringTable<'m>>,
        resolver: AddressResolver,
    ) -> Result<Self> {
        let name = match names {
            Some(names) => utf8_name(names.get_cstr(shdr.sh_name.into())?),
            None => "",
        };
        let address = if shdr.sh_addr == 0 {
            0
        } else {
            resolver.resolve(shdr.sh_addr)
        };
        Ok(Self {
            index,
            name,
            section_type: shdr.sh_type,
            flags: shdr.sh_flags,
            address,
            file_offset: shdr.sh_offset,
            size: shdr.sh_size,
            link: shdr.sh_link,
            info: shdr.sh_info,
            alignment: shdr.sh_addralign,
            entry_size: shdr.sh_entsize,
        })
    }
}
