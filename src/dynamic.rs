//! Walking the `.dynamic` segment
//!
//! The dynamic segment is a packed array of (tag, value) pairs whose width follows
//! the file class. [`DynamicEntries`] yields every entry in file order, including
//! `DT_NULL` terminators; consumers decide for themselves when they have seen
//! enough and stop the walk.

use crate::{
    Result,
    elf::{DT_GNU_HASH, DT_HASH, DT_NEEDED, DT_STRSZ, DT_STRTAB, DT_SYMENT, DT_SYMTAB, ElfView},
};
use core::{ffi::CStr, ops::ControlFlow};

/// One entry of the dynamic segment.
///
/// `value` is a link-time virtual address or a plain integer depending on `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicEntry {
    pub tag: i64,
    pub value: u64,
}

impl DynamicEntry {
    /// Returns true for `DT_NEEDED` entries.
    #[inline]
    pub fn is_needed(&self) -> bool {
        self.tag == DT_NEEDED
    }
}

/// A library this module depends on, as named by a `DT_NEEDED` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyDetails<'m> {
    /// The library name, empty when it is not valid UTF-8.
    pub name: &'m str,
    pub cname: &'m CStr,
}

/// Iterator over the entries of a dynamic segment.
///
/// Iteration ends after the last entry the segment's size allows for, or after
/// the first read error.
#[derive(Clone)]
pub struct DynamicEntries<'m> {
    view: ElfView<'m>,
    offset: u64,
    address: u64,
    count: usize,
    index: usize,
}

impl<'m> DynamicEntries<'m> {
    pub(crate) fn new(view: ElfView<'m>, offset: u64, address: u64, count: usize) -> Self {
        Self {
            view,
            offset,
            address,
            count,
            index: 0,
        }
    }

    /// An iterator for a module without a dynamic segment.
    pub(crate) fn empty(view: ElfView<'m>) -> Self {
        Self::new(view, 0, 0, 0)
    }

    /// Runtime address of the dynamic segment, or 0 when there is none.
    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Total number of entries in the segment.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Iterator for DynamicEntries<'_> {
    type Item = Result<DynamicEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let entry_size = self.view.class().dyn_size() as u64;
        let offset = self.offset + self.index as u64 * entry_size;
        self.index += 1;
        match self.view.read_dyn(offset) {
            Ok(raw) => Some(Ok(DynamicEntry {
                tag: raw.d_tag,
                value: raw.d_val,
            })),
            Err(err) => {
                self.index = self.count;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.count.saturating_sub(self.index)))
    }
}

/// The dynamic entries that locate the dynamic symbol table.
///
/// All values are link-time: addresses are translated by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SymtabParams {
    /// DT_SYMTAB
    pub(crate) symtab: Option<u64>,
    /// DT_SYMENT
    pub(crate) syment: Option<u64>,
    /// DT_STRTAB
    pub(crate) strtab: Option<u64>,
    /// DT_HASH
    pub(crate) hash: Option<u64>,
    /// DT_STRSZ, only recorded if seen before the others are complete
    pub(crate) strsz: Option<u64>,
    /// DT_GNU_HASH, used for name lookup only
    pub(crate) gnu_hash: Option<u64>,
}

impl SymtabParams {
    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.symtab.is_some() && self.syment.is_some() && self.strtab.is_some() && self.hash.is_some()
    }

    /// Records the first occurrence of each interesting tag.
    pub(crate) fn record(&mut self, entry: &DynamicEntry) {
        let slot = match entry.tag {
            DT_SYMTAB => &mut self.symtab,
            DT_SYMENT => &mut self.syment,
            DT_STRTAB => &mut self.strtab,
            DT_HASH => &mut self.hash,
            DT_STRSZ => &mut self.strsz,
            DT_GNU_HASH => &mut self.gnu_hash,
            _ => return,
        };
        slot.get_or_insert(entry.value);
    }

    /// Visitor for the dynamic walk: like [`record`](Self::record), but stops
    /// once the four required tags are known.
    pub(crate) fn store(&mut self, entry: &DynamicEntry) -> ControlFlow<()> {
        self.record(entry);
        if self.is_complete() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
