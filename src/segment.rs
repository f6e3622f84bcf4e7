//! Program header scanning
//!
//! The program header table answers three questions for a module: where its
//! dynamic segment lives, which address it was linked to load at, and which file
//! bytes back a given link-time virtual address.

use crate::{
    Result,
    elf::{
        ElfHeader, ElfPhdr, ElfView, PF_R, PF_W, PF_X, PT_DYNAMIC, PT_INTERP, PT_LOAD,
        TableLocation,
    },
    parse_phdr_error,
};
use bitflags::bitflags;

pub(crate) const PAGE_SIZE: u64 = 0x1000;

#[inline]
pub(crate) fn roundup(x: u64, align: u64) -> u64 {
    if align == 0 {
        return x;
    }
    x.div_ceil(align).saturating_mul(align)
}

#[inline]
pub(crate) fn rounddown(x: u64, align: u64) -> u64 {
    if align == 0 {
        return x;
    }
    x / align * align
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// Memory protection of a segment, derived from its `p_flags`.
    pub struct ProtFlags: u32 {
        /// No access allowed.
        const PROT_NONE = 0;

        /// The segment is readable.
        const PROT_READ = 1;

        /// The segment is writable.
        const PROT_WRITE = 2;

        /// The segment is executable.
        const PROT_EXEC = 4;
    }
}

/// Convert ELF program header flags to memory protection flags
#[inline]
pub(crate) fn segment_prot(p_flags: u32) -> ProtFlags {
    // PF_X (execute) -> PROT_EXEC (bit 2)
    // PF_W (write)   -> PROT_WRITE (bit 1)
    // PF_R (read)    -> PROT_READ (bit 0)
    ProtFlags::from_bits_truncate((p_flags & PF_X) << 2 | p_flags & PF_W | (p_flags & PF_R) >> 2)
}

/// Maps link-time virtual addresses to runtime addresses.
///
/// The module is assumed to be loaded with one uniform slide, so
/// `resolve(a) - resolve(b) == a - b` and `resolve(preferred) == base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressResolver {
    base_address: u64,
    preferred_address: u64,
}

impl AddressResolver {
    pub const fn new(base_address: u64, preferred_address: u64) -> Self {
        Self {
            base_address,
            preferred_address,
        }
    }

    #[inline]
    pub const fn base_address(&self) -> u64 {
        self.base_address
    }

    #[inline]
    pub const fn preferred_address(&self) -> u64 {
        self.preferred_address
    }

    /// Runtime address of `vaddr`. Arithmetic wraps, so modules loaded below
    /// their preferred address resolve correctly.
    #[inline]
    pub const fn resolve(&self, vaddr: u64) -> u64 {
        self.base_address
            .wrapping_add(vaddr.wrapping_sub(self.preferred_address))
    }
}

/// A range of link-time virtual addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub base_address: u64,
    pub size: u64,
}

/// A loadable segment as it appears at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDetails {
    /// Runtime address of the segment.
    pub vm_address: u64,
    /// Size of the segment in memory.
    pub vm_size: u64,
    /// Offset of the segment's data in the file.
    pub file_offset: u64,
    /// Size of the segment's data in the file.
    pub file_size: u64,
    pub protection: ProtFlags,
}

/// Iterator over the program header table.
#[derive(Clone)]
pub struct ProgramHeaders<'data> {
    view: ElfView<'data>,
    table: TableLocation,
    index: usize,
}

impl<'data> ProgramHeaders<'data> {
    pub(crate) fn new(view: ElfView<'data>, header: &ElfHeader) -> Self {
        Self {
            view,
            table: header.phdr_table(),
            index: 0,
        }
    }
}

impl Iterator for ProgramHeaders<'_> {
    type Item = Result<ElfPhdr>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.table.count {
            return None;
        }
        let offset = self.table.entry_offset(self.index);
        self.index += 1;
        let phdr = self.view.read_phdr(offset);
        if phdr.is_err() {
            self.index = self.table.count;
        }
        Some(phdr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.count.saturating_sub(self.index);
        (0, Some(remaining))
    }
}

/// Returns the link-time range of the first `PT_DYNAMIC` segment, if any.
pub(crate) fn find_dynamic_range(phdrs: ProgramHeaders<'_>) -> Result<Option<MemoryRange>> {
    for phdr in phdrs {
        let phdr = phdr?;
        if phdr.p_type == PT_DYNAMIC {
            return Ok(Some(MemoryRange {
                base_address: phdr.p_vaddr,
                size: phdr.p_memsz,
            }));
        }
    }
    Ok(None)
}

/// Returns the virtual address of the first segment whose file offset is zero,
/// i.e. the one containing the ELF header, or 0 when there is none.
pub(crate) fn compute_preferred_address(phdrs: ProgramHeaders<'_>) -> Result<u64> {
    for phdr in phdrs {
        let phdr = phdr?;
        if phdr.p_offset == 0 {
            return Ok(phdr.p_vaddr);
        }
    }
    Ok(0)
}

/// Returns the first `PT_INTERP` segment, if any.
pub(crate) fn find_interp(phdrs: ProgramHeaders<'_>) -> Result<Option<ElfPhdr>> {
    for phdr in phdrs {
        let phdr = phdr?;
        if phdr.p_type == PT_INTERP {
            return Ok(Some(phdr));
        }
    }
    Ok(None)
}

/// Translates a link-time virtual address range to the file offset backing it.
///
/// Only segments whose file image lies inside the file are considered.
/// `PT_LOAD` segments are consulted first; any other segment with file data
/// (such as `PT_DYNAMIC` itself) is a fallback for images without loadable
/// segments covering the range.
pub(crate) fn vaddr_to_offset(
    phdrs: impl Iterator<Item = Result<ElfPhdr>>,
    file_len: u64,
    vaddr: u64,
    len: u64,
) -> Result<u64> {
    let mut fallback = None;
    for phdr in phdrs {
        let phdr = phdr?;
        if let Some(offset) = phdr.file_offset_of(vaddr, len, file_len) {
            if phdr.p_type == PT_LOAD {
                return Ok(offset);
            }
            fallback.get_or_insert(offset);
        }
    }
    fallback.ok_or_else(|| {
        parse_phdr_error(alloc::format!(
            "address 0x{vaddr:x} is not backed by any segment's file data"
        ))
    })
}

/// Returns the page-rounded extent of the `PT_LOAD` segments, or `None` if there are none.
pub(crate) fn load_extent(phdrs: ProgramHeaders<'_>) -> Result<Option<MemoryRange>> {
    let mut min_vaddr = u64::MAX;
    let mut max_vaddr = 0;
    for phdr in phdrs {
        let phdr = phdr?;
        if phdr.p_type == PT_LOAD {
            let end = phdr
                .p_vaddr
                .checked_add(phdr.p_memsz)
                .ok_or_else(|| parse_phdr_error("loadable segment wraps around"))?;
            min_vaddr = min_vaddr.min(phdr.p_vaddr);
            max_vaddr = max_vaddr.max(end);
        }
    }
    if min_vaddr > max_vaddr {
        return Ok(None);
    }
    let min_vaddr = rounddown(min_vaddr, PAGE_SIZE);
    let max_vaddr = roundup(max_vaddr, PAGE_SIZE);
    Ok(Some(MemoryRange {
        base_address: min_vaddr,
        size: max_vaddr - min_vaddr,
    }))
}
