//! The inspected module
//!
//! A [`Module`] is an ELF executable or shared object whose image has been
//! parsed far enough to answer questions about it: its header is valid and its
//! preferred load address is known. Everything else is computed on demand from
//! the image each time it is asked for, and every address handed out goes
//! through the module's [`AddressResolver`].

use crate::{
    Result,
    dynamic::{DependencyDetails, DynamicEntries, DynamicEntry, SymtabParams},
    elf::{
        DT_SONAME, DT_STRTAB, ElfClass, ElfGnuHash, ElfHash, ElfHeader, ElfShdr, ElfView, Endian,
        HashTable, ModuleType, PT_LOAD, SHT_SYMTAB,
    },
    export::{ExportDetails, ImportDetails},
    parse_dynamic_error, parse_phdr_error, parse_shdr_error,
    section::{self, SectionDetails, SectionHeaders},
    segment::{
        self, AddressResolver, ProgramHeaders, SegmentDetails, segment_prot, vaddr_to_offset,
    },
    symbol::{StringTable, Symbol, SymbolArray, Symbols, utf8_name},
};
use alloc::string::{String, ToString};
use core::{fmt::Debug, ops::ControlFlow};
use delegate::delegate;

/// The bytes a module is parsed from.
enum ImageData<'data> {
    Borrowed(&'data [u8]),
    #[cfg(unix)]
    Mapped(crate::os::Mapping),
}

impl ImageData<'_> {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            ImageData::Borrowed(bytes) => bytes,
            #[cfg(unix)]
            ImageData::Mapped(mapping) => mapping.as_slice(),
        }
    }
}

/// An ELF module resident in memory.
///
/// The module is read through its file image: structures referenced by
/// link-time addresses are located through the program headers, while the
/// addresses reported to callers are runtime addresses computed from the base
/// address the module was constructed with.
///
/// All `enumerate_*` operations take a visitor returning [`ControlFlow`]. They
/// return `Ok(())` when the visitor breaks, when the walk is exhausted, and when
/// the structure being walked does not exist. They only fail on malformed data.
pub struct Module<'data> {
    name: String,
    path: String,
    data: ImageData<'data>,
    header: ElfHeader,
    resolver: AddressResolver,
}

impl Debug for Module<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("class", &self.header.class())
            .field("module_type", &self.header.module_type())
            .field("base_address", &format_args!("0x{:x}", self.base_address()))
            .field("preferred_address", &format_args!("0x{:x}", self.preferred_address()))
            .finish()
    }
}

/// Feeds each item to `f` until the iterator ends, `f` breaks, or an item is an error.
fn visit<T>(
    iter: impl Iterator<Item = Result<T>>,
    mut f: impl FnMut(&T) -> ControlFlow<()>,
) -> Result<()> {
    for item in iter {
        if f(&item?).is_break() {
            break;
        }
    }
    Ok(())
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl Module<'static> {
    /// Maps the file at `path` read-only and parses it.
    ///
    /// `base_address` is where the module is loaded in the inspected process;
    /// `None` assumes it was loaded at its preferred address.
    ///
    /// # Errors
    /// Fails if the file cannot be opened or mapped, or its header is invalid.
    #[cfg(unix)]
    pub fn new_from_memory(path: &str, base_address: Option<u64>) -> Result<Self> {
        let mapping = crate::os::Mapping::from_path(path)?;
        Self::build(path, ImageData::Mapped(mapping), base_address)
    }
}

impl<'data> Module<'data> {
    /// Parses a module from an image the caller already holds in memory.
    ///
    /// `path` names the module; its basename becomes [`name`](Self::name).
    ///
    /// # Errors
    /// Fails if the header is truncated, unrecognized, or describes neither an
    /// executable nor a shared object.
    pub fn from_bytes(path: &str, bytes: &'data [u8], base_address: Option<u64>) -> Result<Self> {
        Self::build(path, ImageData::Borrowed(bytes), base_address)
    }

    fn build(path: &str, data: ImageData<'data>, base_address: Option<u64>) -> Result<Self> {
        let header = match ElfHeader::parse(data.as_slice()) {
            Ok(header) => header,
            Err(err) => {
                #[cfg(feature = "log")]
                log::debug!("[{path}] is not an inspectable ELF module: {err}");
                return Err(err);
            }
        };
        let view = ElfView::new(data.as_slice(), header.class(), header.endian());
        let preferred_address =
            segment::compute_preferred_address(ProgramHeaders::new(view, &header))?;
        let base_address = base_address.unwrap_or(preferred_address);
        #[cfg(feature = "log")]
        log::trace!(
            "[{path}] {:?} {:?} {:?}, preferred address 0x{preferred_address:x}, base address 0x{base_address:x}",
            header.class(),
            header.endian(),
            header.module_type(),
        );
        Ok(Self {
            name: basename(path).to_string(),
            path: path.to_string(),
            data,
            header,
            resolver: AddressResolver::new(base_address, preferred_address),
        })
    }

    /// The module's name, the basename of its path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw image the module is parsed from.
    #[inline]
    pub fn image(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    #[inline]
    pub fn resolver(&self) -> AddressResolver {
        self.resolver
    }

    delegate! {
        to self.header {
            pub fn class(&self) -> ElfClass;
            pub fn endian(&self) -> Endian;
            pub fn module_type(&self) -> ModuleType;
            /// Checks if the module is a shared object (`ET_DYN`).
            pub fn is_dylib(&self) -> bool;
            /// The `e_machine` of the module.
            pub fn machine(&self) -> u16;
        }
    }

    delegate! {
        to self.resolver {
            /// Where the module is loaded at runtime.
            pub fn base_address(&self) -> u64;
            /// The load address the module was linked for.
            pub fn preferred_address(&self) -> u64;
            /// Converts a link-time virtual address into a runtime address.
            pub fn resolve(&self, vaddr: u64) -> u64;
        }
    }

    /// Runtime address of the entry point.
    #[inline]
    pub fn entrypoint(&self) -> u64 {
        self.resolve(self.header.entry())
    }

    /// Size of the address range the loadable segments span, rounded to pages.
    pub fn mapped_size(&self) -> Result<u64> {
        let extent = segment::load_extent(self.program_headers())?;
        Ok(extent.map_or(0, |range| range.size))
    }

    fn view(&self) -> ElfView<'_> {
        ElfView::new(
            self.data.as_slice(),
            self.header.class(),
            self.header.endian(),
        )
    }

    /// File offset backing the link-time range `vaddr..vaddr + len`.
    fn translate(&self, vaddr: u64, len: u64) -> Result<u64> {
        vaddr_to_offset(self.program_headers(), self.image().len() as u64, vaddr, len)
    }

    /// Returns an iterator over the program headers.
    pub fn program_headers(&self) -> ProgramHeaders<'_> {
        ProgramHeaders::new(self.view(), &self.header)
    }

    /// Visits every `PT_LOAD` segment in table order.
    pub fn enumerate_segments(
        &self,
        mut f: impl FnMut(&SegmentDetails) -> ControlFlow<()>,
    ) -> Result<()> {
        for phdr in self.program_headers() {
            let phdr = phdr?;
            if phdr.p_type != PT_LOAD {
                continue;
            }
            let segment = SegmentDetails {
                vm_address: self.resolve(phdr.p_vaddr),
                vm_size: phdr.p_memsz,
                file_offset: phdr.p_offset,
                file_size: phdr.p_filesz,
                protection: segment_prot(phdr.p_flags),
            };
            if f(&segment).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Returns the path of the program interpreter named by `PT_INTERP`.
    pub fn interpreter(&self) -> Result<Option<&str>> {
        let Some(interp) = segment::find_interp(self.program_headers())? else {
            return Ok(None);
        };
        let bytes = self.view().bytes(interp.p_offset, interp.p_filesz)?;
        let bytes = bytes.split(|&b| b == 0).next().unwrap_or(bytes);
        core::str::from_utf8(bytes)
            .map(Some)
            .map_err(|_| parse_phdr_error("interpreter path is not valid UTF-8"))
    }

    /// Returns an iterator over the entries of the dynamic segment.
    ///
    /// A module without a `PT_DYNAMIC` segment yields nothing. `DT_NULL` entries
    /// are yielded like any other.
    ///
    /// # Errors
    /// Fails if the segment's size is not a whole number of entries, or its
    /// contents are not backed by the file.
    pub fn dynamic_entries(&self) -> Result<DynamicEntries<'_>> {
        let view = self.view();
        let Some(range) = segment::find_dynamic_range(self.program_headers())? else {
            return Ok(DynamicEntries::empty(view));
        };
        let entry_size = view.class().dyn_size() as u64;
        if range.size % entry_size != 0 {
            return Err(parse_dynamic_error(alloc::format!(
                "dynamic segment size 0x{:x} is not a multiple of the entry size",
                range.size
            )));
        }
        let count = usize::try_from(range.size / entry_size)
            .map_err(|_| parse_dynamic_error("dynamic segment is too large"))?;
        let offset = self.translate(range.base_address, range.size)?;
        let address = self.resolve(range.base_address);
        #[cfg(feature = "log")]
        log::trace!(
            "[{}] dynamic segment at 0x{address:x}, {count} entries",
            self.name
        );
        Ok(DynamicEntries::new(view, offset, address, count))
    }

    /// Visits the entries of the dynamic segment in file order.
    pub fn enumerate_dynamic_entries(
        &self,
        f: impl FnMut(&DynamicEntry) -> ControlFlow<()>,
    ) -> Result<()> {
        visit(self.dynamic_entries()?, f)
    }

    /// Returns the value of the first dynamic entry tagged `tag`.
    fn find_dynamic_value(&self, tag: i64) -> Result<Option<u64>> {
        let mut value = None;
        self.enumerate_dynamic_entries(|entry| {
            if entry.tag == tag {
                value = Some(entry.value);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(value)
    }

    /// The dynamic string table at link-time address `vaddr`.
    fn dynamic_string_table(&self, vaddr: u64, size: Option<u64>) -> Result<StringTable<'_>> {
        let offset = self.translate(vaddr, size.unwrap_or(0))?;
        Ok(StringTable::new(self.view(), offset, size))
    }

    /// Visits the `DT_NEEDED` entries, in file order.
    ///
    /// Modules without a dynamic string table have no dependencies.
    pub fn enumerate_dependencies<'m>(
        &'m self,
        mut f: impl FnMut(&DependencyDetails<'m>) -> ControlFlow<()>,
    ) -> Result<()> {
        let Some(strtab) = self.find_dynamic_value(DT_STRTAB)? else {
            return Ok(());
        };
        let strtab = self.dynamic_string_table(strtab, None)?;
        for entry in self.dynamic_entries()? {
            let entry = entry?;
            if !entry.is_needed() {
                continue;
            }
            let cname = strtab.get_cstr(entry.value)?;
            let dependency = DependencyDetails {
                name: utf8_name(cname),
                cname,
            };
            if f(&dependency).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Returns the `DT_SONAME` of the module.
    pub fn soname(&self) -> Result<Option<&str>> {
        let Some(soname) = self.find_dynamic_value(DT_SONAME)? else {
            return Ok(None);
        };
        let Some(strtab) = self.find_dynamic_value(DT_STRTAB)? else {
            return Ok(None);
        };
        self.dynamic_string_table(strtab, None)?
            .get_str(soname)
            .map(Some)
    }

    fn symtab_params(&self) -> Result<SymtabParams> {
        let mut params = SymtabParams::default();
        self.enumerate_dynamic_entries(|entry| params.store(entry))?;
        Ok(params)
    }

    /// Returns an iterator over the dynamic symbol table, skipping the reserved
    /// entry 0.
    ///
    /// The table is located by `DT_SYMTAB`, `DT_SYMENT`, `DT_STRTAB` and
    /// `DT_HASH`, whose chain count gives the number of symbols. When any of the
    /// four is missing the iterator is empty.
    pub fn dynamic_symbols(&self) -> Result<Symbols<'_>> {
        let view = self.view();
        let params = self.symtab_params()?;
        let (Some(symtab), Some(syment), Some(strtab), Some(hash)) =
            (params.symtab, params.syment, params.strtab, params.hash)
        else {
            return Ok(Symbols::empty(view, self.resolver));
        };
        let nchain = ElfHash::nchain(&view, self.translate(hash, 8)?)?;
        let len = syment
            .checked_mul(u64::from(nchain))
            .ok_or_else(|| parse_dynamic_error("dynamic symbol table size overflows"))?;
        let symbols = SymbolArray::new(&view, self.translate(symtab, len)?, syment, nchain as usize)?;
        let strtab = self.dynamic_string_table(strtab, params.strsz)?;
        #[cfg(feature = "log")]
        log::trace!(
            "[{}] dynamic symbol table at 0x{:x}, {nchain} entries of {syment} bytes",
            self.name,
            self.resolve(symtab),
        );
        Ok(Symbols::new(view, symbols, strtab, self.resolver, 1))
    }

    /// Visits the dynamic symbols in table order.
    pub fn enumerate_dynamic_symbols<'m>(
        &'m self,
        f: impl FnMut(&Symbol<'m>) -> ControlFlow<()>,
    ) -> Result<()> {
        visit(self.dynamic_symbols()?, f)
    }

    /// Returns an iterator over the section headers, as `(index, header)` pairs.
    pub fn section_headers(&self) -> SectionHeaders<'_> {
        SectionHeaders::new(self.view(), &self.header)
    }

    /// Returns the first section header of type `sh_type`, with its index.
    ///
    /// The reserved entry 0 is skipped, so `SHT_NULL` never matches.
    pub fn find_section_header(&self, sh_type: u32) -> Result<Option<(usize, ElfShdr)>> {
        section::find_section_header(self.section_headers(), sh_type)
    }

    /// Visits every section header in table order.
    pub fn enumerate_sections<'m>(
        &'m self,
        mut f: impl FnMut(&SectionDetails<'m>) -> ControlFlow<()>,
    ) -> Result<()> {
        let shdrs = self.section_headers();
        let names = section::section_names(&shdrs, &self.header)?;
        for item in shdrs.clone() {
            let (index, shdr) = item?;
            let section = SectionDetails::new(index, &shdr, names.as_ref(), self.resolver)?;
            if f(&section).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Returns an iterator over the static symbol table (`SHT_SYMTAB`), starting
    /// at entry 0. Stripped modules yield nothing.
    pub fn symbols(&self) -> Result<Symbols<'_>> {
        let view = self.view();
        let shdrs = self.section_headers();
        let Some((_, symtab)) = section::find_section_header(shdrs.clone(), SHT_SYMTAB)? else {
            return Ok(Symbols::empty(view, self.resolver));
        };
        if symtab.sh_entsize == 0 || symtab.sh_size % symtab.sh_entsize != 0 {
            return Err(parse_shdr_error(alloc::format!(
                "symbol table size 0x{:x} is not a multiple of its entry size {}",
                symtab.sh_size,
                symtab.sh_entsize
            )));
        }
        let count = usize::try_from(symtab.sh_size / symtab.sh_entsize)
            .map_err(|_| parse_shdr_error("symbol table is too large"))?;
        let strtab = section::linked_string_table(&shdrs, &symtab)?;
        let symbols = SymbolArray::new(&view, symtab.sh_offset, symtab.sh_entsize, count)?;
        Ok(Symbols::new(view, symbols, strtab, self.resolver, 0))
    }

    /// Visits the static symbols in table order.
    pub fn enumerate_symbols<'m>(
        &'m self,
        f: impl FnMut(&Symbol<'m>) -> ControlFlow<()>,
    ) -> Result<()> {
        visit(self.symbols()?, f)
    }

    /// Visits the undefined functions and variables of the dynamic symbol table.
    pub fn enumerate_imports<'m>(
        &'m self,
        mut f: impl FnMut(&ImportDetails<'m>) -> ControlFlow<()>,
    ) -> Result<()> {
        visit(self.dynamic_symbols()?, |symbol| {
            match ImportDetails::from_symbol(symbol) {
                Some(import) => f(&import),
                None => ControlFlow::Continue(()),
            }
        })
    }

    /// Visits the defined global or weak functions and variables of the dynamic
    /// symbol table.
    pub fn enumerate_exports<'m>(
        &'m self,
        mut f: impl FnMut(&ExportDetails<'m>) -> ControlFlow<()>,
    ) -> Result<()> {
        visit(self.dynamic_symbols()?, |symbol| {
            match ExportDetails::from_symbol(symbol) {
                Some(export) => f(&export),
                None => ControlFlow::Continue(()),
            }
        })
    }

    /// Looks up an export by name.
    ///
    /// Uses `DT_GNU_HASH` when present, then `DT_HASH`, and otherwise scans the
    /// exports linearly.
    pub fn find_export_by_name(&self, name: &str) -> Result<Option<ExportDetails<'_>>> {
        let view = self.view();
        let mut params = SymtabParams::default();
        for entry in self.dynamic_entries()? {
            params.record(&entry?);
        }
        let (Some(symtab), Some(strtab)) = (params.symtab, params.strtab) else {
            return Ok(None);
        };
        let table = if let Some(gnu_hash) = params.gnu_hash {
            HashTable::Gnu(ElfGnuHash::parse(&view, self.translate(gnu_hash, 16)?)?)
        } else if let Some(hash) = params.hash {
            HashTable::Elf(ElfHash::parse(&view, self.translate(hash, 8)?)?)
        } else {
            return self.find_export_linear(name);
        };
        let syment = params
            .syment
            .unwrap_or(view.class().sym_size() as u64);
        let offset = self.translate(symtab, syment)?;
        let symbols = Symbols::new(
            view,
            SymbolArray::fitting(&view, offset, syment)?,
            self.dynamic_string_table(strtab, params.strsz)?,
            self.resolver,
            0,
        );
        match table {
            HashTable::Gnu(table) => first_export(&symbols, table.candidates(view, name.as_bytes())?, name),
            HashTable::Elf(table) => first_export(&symbols, table.candidates(view, name.as_bytes())?, name),
        }
    }

    fn find_export_linear(&self, name: &str) -> Result<Option<ExportDetails<'_>>> {
        let mut found = None;
        self.enumerate_exports(|export| {
            if export.cname.to_bytes() == name.as_bytes() {
                found = Some(*export);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(found)
    }
}

/// Returns the first candidate that is named `name` and is an export.
fn first_export<'m>(
    symbols: &Symbols<'m>,
    candidates: impl Iterator<Item = Result<usize>>,
    name: &str,
) -> Result<Option<ExportDetails<'m>>> {
    for index in candidates {
        let index = index?;
        if symbols.name_bytes(index)? != Some(name.as_bytes()) {
            continue;
        }
        if let Some(export) = symbols
            .get(index)?
            .as_ref()
            .and_then(ExportDetails::from_symbol)
        {
            return Ok(Some(export));
        }
    }
    Ok(None)
}
