//! ELF symbol table handling
//!
//! A module can carry two symbol tables: the dynamic one (`.dynsym`), located
//! through dynamic entries, and the static one (`.symtab`), located through the
//! section headers. Both are walked by [`Symbols`] and produce the same
//! [`Symbol`] record; they differ only in where the entries and names live and
//! in whether the reserved entry 0 is reported.

use crate::{
    Result,
    elf::{ElfSym, ElfView, SHN_UNDEF, SymbolBind, SymbolType},
    parse_symbol_error,
    segment::AddressResolver,
};
use core::ffi::CStr;

/// ELF string table wrapper
///
/// Names are looked up by their offset into the table. When the table's size is
/// known, lookups never read past its end.
#[derive(Clone, Copy)]
pub(crate) struct StringTable<'data> {
    view: ElfView<'data>,
    /// File offset of the table.
    offset: u64,
    /// Absolute file offset the table ends at, when known.
    limit: Option<u64>,
}

impl<'data> StringTable<'data> {
    pub(crate) fn new(view: ElfView<'data>, offset: u64, size: Option<u64>) -> Self {
        Self {
            view,
            offset,
            limit: size.map(|size| offset.saturating_add(size)),
        }
    }

    /// Returns the string at `index`.
    pub(crate) fn get_cstr(&self, index: u64) -> Result<&'data CStr> {
        let start = self
            .offset
            .checked_add(index)
            .ok_or_else(|| parse_symbol_error("string offset overflows"))?;
        if self.limit.is_some_and(|limit| start >= limit) {
            return Err(parse_symbol_error(alloc::format!(
                "string offset 0x{index:x} lies outside its string table"
            )));
        }
        self.view.read_cstr(start, self.limit)
    }

    /// Returns the string at `index`, which must be valid UTF-8.
    pub(crate) fn get_str(&self, index: u64) -> Result<&'data str> {
        self.get_cstr(index)?
            .to_str()
            .map_err(|_| parse_symbol_error("name is not valid UTF-8"))
    }
}

/// The UTF-8 view of an ELF name, empty when the bytes are not UTF-8.
#[inline]
pub(crate) fn utf8_name(cname: &CStr) -> &str {
    cname.to_str().unwrap_or_default()
}

/// A symbol table entry as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<'m> {
    /// The symbol name, empty for unnamed entries and for names that are not
    /// valid UTF-8.
    pub name: &'m str,
    /// The symbol name exactly as stored in the string table.
    pub cname: &'m CStr,
    /// Runtime address (the resolved `st_value`).
    pub address: u64,
    pub size: u64,
    pub sym_type: SymbolType,
    pub bind: SymbolBind,
    /// Raw `st_other`, whose low two bits are the visibility.
    pub other: u8,
    /// The section the symbol is defined in, `SHN_UNDEF` when undefined.
    pub section_header_index: u16,
}

impl<'m> Symbol<'m> {
    fn from_raw(raw: &ElfSym, cname: &'m CStr, resolver: AddressResolver) -> Self {
        Self {
            name: utf8_name(cname),
            cname,
            address: resolver.resolve(raw.st_value),
            size: raw.st_size,
            sym_type: raw.st_type().into(),
            bind: raw.st_bind().into(),
            other: raw.st_other,
            section_header_index: raw.st_shndx,
        }
    }

    /// Returns true if the symbol is not defined by this module.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.section_header_index == SHN_UNDEF
    }
}

/// Where a symbol array lives in the file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SymbolArray {
    /// File offset of entry 0.
    pub(crate) offset: u64,
    pub(crate) entry_size: u64,
    pub(crate) count: usize,
}

impl SymbolArray {
    /// Validates a caller-supplied entry size against the class layout.
    pub(crate) fn new(view: &ElfView<'_>, offset: u64, entry_size: u64, count: usize) -> Result<Self> {
        if entry_size < view.class().sym_size() as u64 {
            return Err(parse_symbol_error(alloc::format!(
                "symbol entry size {entry_size} is smaller than a symbol"
            )));
        }
        let len = entry_size
            .checked_mul(count as u64)
            .ok_or_else(|| parse_symbol_error("symbol table size overflows"))?;
        // The whole array must be inside the image before anything is reported.
        view.bytes(offset, len)?;
        Ok(Self {
            offset,
            entry_size,
            count,
        })
    }

    /// A symbol array of unknown length, taken to span every whole entry
    /// between `offset` and the end of the image.
    pub(crate) fn fitting(view: &ElfView<'_>, offset: u64, entry_size: u64) -> Result<Self> {
        let available = (view.len() as u64).saturating_sub(offset);
        let count = usize::try_from(available / entry_size.max(1))
            .map_err(|_| parse_symbol_error("symbol table size overflows"))?;
        Self::new(view, offset, entry_size, count)
    }

    #[inline]
    fn entry_offset(&self, index: usize) -> u64 {
        self.offset + index as u64 * self.entry_size
    }
}

/// Iterator over a symbol table.
///
/// Returned by [`Module::dynamic_symbols`](crate::Module::dynamic_symbols),
/// which starts at index 1, and [`Module::symbols`](crate::Module::symbols),
/// which starts at index 0. Iteration stops after the first error.
#[derive(Clone)]
pub struct Symbols<'m> {
    view: ElfView<'m>,
    table: Option<(SymbolArray, StringTable<'m>)>,
    resolver: AddressResolver,
    index: usize,
}

impl<'m> Symbols<'m> {
    pub(crate) fn new(
        view: ElfView<'m>,
        symbols: SymbolArray,
        strtab: StringTable<'m>,
        resolver: AddressResolver,
        first: usize,
    ) -> Self {
        Self {
            view,
            table: Some((symbols, strtab)),
            resolver,
            index: first,
        }
    }

    /// An iterator for a module without the table.
    pub(crate) fn empty(view: ElfView<'m>, resolver: AddressResolver) -> Self {
        Self {
            view,
            table: None,
            resolver,
            index: 0,
        }
    }

    /// Number of entries in the table, including any that are skipped.
    pub fn table_len(&self) -> usize {
        self.table.map_or(0, |(symbols, _)| symbols.count)
    }

    /// Reads entry `index` regardless of where iteration currently is.
    pub(crate) fn get(&self, index: usize) -> Result<Option<Symbol<'m>>> {
        let Some((symbols, strtab)) = self.table else {
            return Ok(None);
        };
        if index >= symbols.count {
            return Ok(None);
        }
        let raw = self.view.read_sym(symbols.entry_offset(index))?;
        let cname = strtab.get_cstr(raw.st_name.into())?;
        Ok(Some(Symbol::from_raw(&raw, cname, self.resolver)))
    }

    /// Raw name bytes of entry `index`, for hash-chain comparisons.
    pub(crate) fn name_bytes(&self, index: usize) -> Result<Option<&'m [u8]>> {
        let Some((symbols, strtab)) = self.table else {
            return Ok(None);
        };
        if index >= symbols.count {
            return Ok(None);
        }
        let st_name = self.view.read_u32(symbols.entry_offset(index))?;
        strtab
            .get_cstr(st_name.into())
            .map(|cname| Some(cname.to_bytes()))
    }
}

impl<'m> Iterator for Symbols<'m> {
    type Item = Result<Symbol<'m>>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        self.index += 1;
        match self.get(index) {
            Ok(symbol) => symbol.map(Ok),
            Err(err) => {
                self.table = None;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.table_len().saturating_sub(self.index)))
    }
}
