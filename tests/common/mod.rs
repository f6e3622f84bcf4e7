#![allow(dead_code)]

//! A small ELF image writer for tests.
//!
//! Images have one `PT_LOAD` segment at file offset 0 covering the whole file,
//! so every link-time address is `load_vaddr + file offset`.

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use elf_module::elf::*;

#[derive(Clone, Debug)]
pub struct Sym {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub sym_type: u8,
    pub bind: u8,
    pub other: u8,
    pub shndx: u16,
}

impl Sym {
    fn new(name: &str, value: u64, size: u64, sym_type: u8, shndx: u16) -> Self {
        Self {
            name: name.to_string(),
            value,
            size,
            sym_type,
            bind: STB_GLOBAL,
            other: 0,
            shndx,
        }
    }

    /// A defined global function.
    pub fn func(name: &str, value: u64) -> Self {
        Self::new(name, value, 16, STT_FUNC, 1)
    }

    /// A defined global variable.
    pub fn object(name: &str, value: u64) -> Self {
        Self::new(name, value, 8, STT_OBJECT, 1)
    }

    /// An undefined function.
    pub fn import_func(name: &str) -> Self {
        Self::new(name, 0, 0, STT_FUNC, SHN_UNDEF)
    }

    /// An undefined variable.
    pub fn import_object(name: &str) -> Self {
        Self::new(name, 0, 0, STT_OBJECT, SHN_UNDEF)
    }

    pub fn bind(mut self, bind: u8) -> Self {
        self.bind = bind;
        self
    }

    pub fn sym_type(mut self, sym_type: u8) -> Self {
        self.sym_type = sym_type;
        self
    }

    fn info(&self) -> u8 {
        (self.bind << 4) | (self.sym_type & 0xf)
    }
}

/// SYSV ELF hash.
pub fn sysv_hash(name: &[u8]) -> u32 {
    let mut h = 0u32;
    for &b in name {
        h = (h << 4).wrapping_add(b as u32);
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
        }
        h &= !g;
    }
    h
}

/// GNU hash.
pub fn gnu_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(5381u32, |h, &b| h.wrapping_mul(33).wrapping_add(b as u32))
}

fn push_str(table: &mut Vec<u8>, s: &str) -> u32 {
    let offset = table.len() as u32;
    table.extend_from_slice(s.as_bytes());
    table.push(0);
    offset
}

fn align(x: u64, a: u64) -> u64 {
    x.div_ceil(a) * a
}

/// The output of [`ElfBuilder::build`].
pub struct BuiltElf {
    pub bytes: Vec<u8>,
    pub load_vaddr: u64,
    /// Link-time address of the dynamic segment.
    pub dynamic_vaddr: u64,
    /// Every entry written to the dynamic segment, in order.
    pub dynamic: Vec<(i64, u64)>,
    /// `nchain` of the SYSV hash table.
    pub nchain: u32,
}

pub struct ElfBuilder {
    pub class: ElfClass,
    pub endian: Endian,
    pub e_type: u16,
    pub machine: u16,
    pub load_vaddr: u64,
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub interp: Option<String>,
    pub with_dynamic: bool,
    pub dyn_symbols: Vec<Sym>,
    /// Tags left out of the dynamic segment.
    pub omit: Vec<i64>,
    pub with_gnu_hash: bool,
    /// Entries written before the terminating `DT_NULL`.
    pub extra_dynamic: Vec<(i64, u64)>,
    /// Entries written after the terminating `DT_NULL`.
    pub trailing_dynamic: Vec<(i64, u64)>,
    /// Bytes added to the dynamic segment's size.
    pub dynamic_slop: u64,
    /// Replaces the `DT_SYMENT` value.
    pub syment: Option<u64>,
    /// Replaces the `DT_STRSZ` value.
    pub strsz: Option<u64>,
    pub with_sections: bool,
    pub static_symbols: Option<Vec<Sym>>,
    /// Replaces the `.symtab` entry size.
    pub symtab_entsize: Option<u64>,
    /// Additional empty sections, as (name, type).
    pub extra_sections: Vec<(String, u32)>,
    /// Program headers written after the generated ones.
    pub extra_phdrs: Vec<ElfPhdr>,
}

impl ElfBuilder {
    pub fn new(class: ElfClass, endian: Endian) -> Self {
        Self {
            class,
            endian,
            e_type: ET_DYN,
            machine: EM_X86_64,
            load_vaddr: 0x40_0000,
            needed: Vec::new(),
            soname: None,
            interp: None,
            with_dynamic: true,
            dyn_symbols: Vec::new(),
            omit: Vec::new(),
            with_gnu_hash: false,
            extra_dynamic: Vec::new(),
            trailing_dynamic: Vec::new(),
            dynamic_slop: 0,
            syment: None,
            strsz: None,
            with_sections: true,
            static_symbols: None,
            symtab_entsize: None,
            extra_sections: Vec::new(),
            extra_phdrs: Vec::new(),
        }
    }

    pub fn elf64() -> Self {
        Self::new(ElfClass::Elf64, Endian::Little)
    }

    pub fn needed(mut self, name: &str) -> Self {
        self.needed.push(name.to_string());
        self
    }

    pub fn symbol(mut self, sym: Sym) -> Self {
        self.dyn_symbols.push(sym);
        self
    }

    pub fn omit(mut self, tag: i64) -> Self {
        self.omit.push(tag);
        self
    }

    pub fn static_symbol(mut self, sym: Sym) -> Self {
        self.static_symbols.get_or_insert_with(Vec::new).push(sym);
        self
    }

    pub fn section(mut self, name: &str, sh_type: u32) -> Self {
        self.extra_sections.push((name.to_string(), sh_type));
        self
    }

    pub fn build(&self) -> BuiltElf {
        match self.endian {
            Endian::Little => self.emit::<LittleEndian>(),
            Endian::Big => self.emit::<BigEndian>(),
        }
    }

    fn emit<B: ByteOrder>(&self) -> BuiltElf {
        let is_64 = self.class == ElfClass::Elf64;
        let word = self.class.word_size() as u64;
        let sym_size = self.class.sym_size() as u64;
        let dyn_size = self.class.dyn_size() as u64;
        let v = self.load_vaddr;

        // String tables.
        let mut dynstr = vec![0u8];
        let needed: Vec<u32> = self.needed.iter().map(|n| push_str(&mut dynstr, n)).collect();
        let soname = self.soname.as_deref().map(|n| push_str(&mut dynstr, n));
        let dyn_names: Vec<u32> = self
            .dyn_symbols
            .iter()
            .map(|s| push_str(&mut dynstr, &s.name))
            .collect();
        let nsyms = self.dyn_symbols.len() as u64 + 1;

        // Layout.
        let nph = 1
            + self.with_dynamic as u64
            + self.interp.is_some() as u64
            + self.extra_phdrs.len() as u64;
        let phoff = self.class.ehdr_size() as u64;
        let mut cursor = phoff + nph * self.class.phdr_size() as u64;
        let interp_off = cursor;
        if let Some(interp) = &self.interp {
            cursor += interp.len() as u64 + 1;
        }
        let dynstr_off = align(cursor, 8);
        cursor = dynstr_off + dynstr.len() as u64;
        let dynsym_off = align(cursor, 8);
        cursor = dynsym_off + nsyms * sym_size;
        let nbucket = 3u32;
        let hash_off = align(cursor, 8);
        cursor = hash_off + 4 * (2 + nbucket as u64 + nsyms);
        let gnu_off = align(cursor, 8);
        if self.with_gnu_hash {
            cursor = gnu_off + 16 + word + 4 + 4 * (nsyms - 1);
        }

        let mut dynamic: Vec<(i64, u64)> = needed.iter().map(|&n| (DT_NEEDED, n as u64)).collect();
        if let Some(soname) = soname {
            dynamic.push((DT_SONAME, soname as u64));
        }
        dynamic.push((DT_HASH, v + hash_off));
        if self.with_gnu_hash {
            dynamic.push((DT_GNU_HASH, v + gnu_off));
        }
        dynamic.push((DT_STRTAB, v + dynstr_off));
        dynamic.push((DT_SYMTAB, v + dynsym_off));
        dynamic.push((DT_STRSZ, self.strsz.unwrap_or(dynstr.len() as u64)));
        dynamic.push((DT_SYMENT, self.syment.unwrap_or(sym_size)));
        dynamic.retain(|(tag, _)| !self.omit.contains(tag));
        dynamic.extend_from_slice(&self.extra_dynamic);
        dynamic.push((DT_NULL, 0));
        dynamic.extend_from_slice(&self.trailing_dynamic);

        let dynamic_off = align(cursor, 8);
        let dynamic_size = dynamic.len() as u64 * dyn_size + self.dynamic_slop;
        cursor = dynamic_off + dynamic_size;

        // Sections.
        let mut shstrtab = vec![0u8];
        let mut strtab = vec![0u8];
        let static_names: Vec<u32> = self
            .static_symbols
            .iter()
            .flatten()
            .map(|s| push_str(&mut strtab, &s.name))
            .collect();
        let strtab_off = align(cursor, 8);
        let symtab_off = align(strtab_off + strtab.len() as u64, 8);
        let nstatic = static_names.len() as u64 + 1;
        if self.static_symbols.is_some() {
            cursor = symtab_off + nstatic * sym_size;
        }

        let mut shdrs = vec![ElfShdr::default()];
        if self.with_sections {
            let dynstr_idx = shdrs.len() as u32;
            let sh = |name: &str,
                      shstrtab: &mut Vec<u8>,
                      sh_type: u32,
                      addr: u64,
                      offset: u64,
                      size: u64| ElfShdr {
                sh_name: push_str(shstrtab, name),
                sh_type,
                sh_addr: addr,
                sh_offset: offset,
                sh_size: size,
                sh_addralign: 1,
                ..Default::default()
            };
            shdrs.push(ElfShdr {
                sh_flags: SHF_ALLOC as u64,
                ..sh(".dynstr", &mut shstrtab, SHT_STRTAB, v + dynstr_off, dynstr_off, dynstr.len() as u64)
            });
            shdrs.push(ElfShdr {
                sh_flags: SHF_ALLOC as u64,
                sh_link: dynstr_idx,
                sh_info: 1,
                sh_entsize: sym_size,
                sh_addralign: 8,
                ..sh(".dynsym", &mut shstrtab, SHT_DYNSYM, v + dynsym_off, dynsym_off, nsyms * sym_size)
            });
            if self.with_dynamic {
                shdrs.push(ElfShdr {
                    sh_flags: (SHF_ALLOC | SHF_WRITE) as u64,
                    sh_link: dynstr_idx,
                    sh_entsize: dyn_size,
                    sh_addralign: 8,
                    ..sh(".dynamic", &mut shstrtab, SHT_DYNAMIC, v + dynamic_off, dynamic_off, dynamic_size)
                });
            }
            for (name, sh_type) in &self.extra_sections {
                shdrs.push(sh(name, &mut shstrtab, *sh_type, 0, dynstr_off, 0));
            }
            if self.static_symbols.is_some() {
                let strtab_idx = shdrs.len() as u32 + 1;
                shdrs.push(ElfShdr {
                    sh_link: strtab_idx,
                    sh_entsize: self.symtab_entsize.unwrap_or(sym_size),
                    sh_addralign: 8,
                    ..sh(".symtab", &mut shstrtab, SHT_SYMTAB, 0, symtab_off, nstatic * sym_size)
                });
                shdrs.push(sh(".strtab", &mut shstrtab, SHT_STRTAB, 0, strtab_off, strtab.len() as u64));
            }
        }
        let shstrndx = if self.with_sections { shdrs.len() as u16 } else { 0 };
        let shstrtab_off = cursor;
        if self.with_sections {
            let name = push_str(&mut shstrtab, ".shstrtab");
            shdrs.push(ElfShdr {
                sh_name: name,
                sh_type: SHT_STRTAB,
                sh_offset: shstrtab_off,
                sh_size: shstrtab.len() as u64,
                sh_addralign: 1,
                ..Default::default()
            });
            cursor += shstrtab.len() as u64;
        }
        let shoff = align(cursor, 8);
        let (shoff, shnum) = if self.with_sections {
            cursor = shoff + shdrs.len() as u64 * self.class.shdr_size() as u64;
            (shoff, shdrs.len() as u16)
        } else {
            (0, 0)
        };
        let file_len = cursor;

        // Program headers.
        let mut phdrs = vec![ElfPhdr {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_X,
            p_offset: 0,
            p_vaddr: v,
            p_paddr: v,
            p_filesz: file_len,
            p_memsz: file_len,
            p_align: 0x1000,
        }];
        if let Some(interp) = &self.interp {
            phdrs.push(ElfPhdr {
                p_type: PT_INTERP,
                p_flags: PF_R,
                p_offset: interp_off,
                p_vaddr: v + interp_off,
                p_paddr: v + interp_off,
                p_filesz: interp.len() as u64 + 1,
                p_memsz: interp.len() as u64 + 1,
                p_align: 1,
            });
        }
        if self.with_dynamic {
            phdrs.push(ElfPhdr {
                p_type: PT_DYNAMIC,
                p_flags: PF_R | PF_W,
                p_offset: dynamic_off,
                p_vaddr: v + dynamic_off,
                p_paddr: v + dynamic_off,
                p_filesz: dynamic_size,
                p_memsz: dynamic_size,
                p_align: 8,
            });
        }
        phdrs.extend_from_slice(&self.extra_phdrs);

        // Emit.
        let mut buf: Vec<u8> = Vec::with_capacity(file_len as usize);
        let w = &mut buf;
        w.extend_from_slice(&ELFMAGIC);
        w.push(if is_64 { ELFCLASS64 } else { ELFCLASS32 });
        w.push(match self.endian {
            Endian::Little => ELFDATA2LSB,
            Endian::Big => ELFDATA2MSB,
        });
        w.push(EV_CURRENT);
        w.resize(16, 0);
        w.write_u16::<B>(self.e_type).unwrap();
        w.write_u16::<B>(self.machine).unwrap();
        w.write_u32::<B>(EV_CURRENT as u32).unwrap();
        write_word::<B>(w, is_64, v);
        write_word::<B>(w, is_64, phoff);
        write_word::<B>(w, is_64, shoff);
        w.write_u32::<B>(0).unwrap();
        w.write_u16::<B>(self.class.ehdr_size() as u16).unwrap();
        w.write_u16::<B>(self.class.phdr_size() as u16).unwrap();
        w.write_u16::<B>(phdrs.len() as u16).unwrap();
        w.write_u16::<B>(self.class.shdr_size() as u16).unwrap();
        w.write_u16::<B>(shnum).unwrap();
        w.write_u16::<B>(shstrndx).unwrap();

        for phdr in &phdrs {
            write_phdr::<B>(w, is_64, phdr);
        }
        if let Some(interp) = &self.interp {
            w.resize(interp_off as usize, 0);
            w.extend_from_slice(interp.as_bytes());
            w.push(0);
        }
        w.resize(dynstr_off as usize, 0);
        w.extend_from_slice(&dynstr);

        w.resize(dynsym_off as usize, 0);
        write_sym::<B>(w, is_64, 0, &Sym::new("", 0, 0, STT_NOTYPE, SHN_UNDEF).bind(STB_LOCAL));
        for (sym, &name) in self.dyn_symbols.iter().zip(&dyn_names) {
            write_sym::<B>(w, is_64, name, sym);
        }

        // SYSV hash: buckets and chains built the way linkers do.
        w.resize(hash_off as usize, 0);
        let mut buckets = vec![0u32; nbucket as usize];
        let mut chains = vec![0u32; nsyms as usize];
        for (i, sym) in self.dyn_symbols.iter().enumerate() {
            let idx = i as u32 + 1;
            let b = (sysv_hash(sym.name.as_bytes()) % nbucket) as usize;
            chains[idx as usize] = buckets[b];
            buckets[b] = idx;
        }
        w.write_u32::<B>(nbucket).unwrap();
        w.write_u32::<B>(nsyms as u32).unwrap();
        for x in buckets.iter().chain(&chains) {
            w.write_u32::<B>(*x).unwrap();
        }

        // GNU hash with a single bucket holding every symbol from index 1.
        if self.with_gnu_hash {
            w.resize(gnu_off as usize, 0);
            w.write_u32::<B>(1).unwrap();
            w.write_u32::<B>(1).unwrap();
            w.write_u32::<B>(1).unwrap();
            w.write_u32::<B>(6).unwrap();
            write_word::<B>(w, is_64, u64::MAX);
            w.write_u32::<B>(if nsyms > 1 { 1 } else { 0 }).unwrap();
            let last = self.dyn_symbols.len().saturating_sub(1);
            for (i, sym) in self.dyn_symbols.iter().enumerate() {
                let h = gnu_hash(sym.name.as_bytes()) & !1;
                w.write_u32::<B>(if i == last { h | 1 } else { h }).unwrap();
            }
        }

        w.resize(dynamic_off as usize, 0);
        for &(tag, value) in &dynamic {
            if is_64 {
                w.write_i64::<B>(tag).unwrap();
                w.write_u64::<B>(value).unwrap();
            } else {
                w.write_i32::<B>(tag as i32).unwrap();
                w.write_u32::<B>(value as u32).unwrap();
            }
        }
        w.resize((dynamic_off + dynamic_size) as usize, 0);

        if let Some(statics) = &self.static_symbols {
            w.resize(strtab_off as usize, 0);
            w.extend_from_slice(&strtab);
            w.resize(symtab_off as usize, 0);
            write_sym::<B>(w, is_64, 0, &Sym::new("", 0, 0, STT_NOTYPE, SHN_UNDEF).bind(STB_LOCAL));
            for (sym, &name) in statics.iter().zip(&static_names) {
                write_sym::<B>(w, is_64, name, sym);
            }
        }
        if self.with_sections {
            w.resize(shstrtab_off as usize, 0);
            w.extend_from_slice(&shstrtab);
            w.resize(shoff as usize, 0);
            for shdr in &shdrs {
                write_shdr::<B>(w, is_64, shdr);
            }
        }
        w.resize(file_len as usize, 0);

        BuiltElf {
            bytes: buf,
            load_vaddr: v,
            dynamic_vaddr: v + dynamic_off,
            dynamic,
            nchain: nsyms as u32,
        }
    }
}

fn write_word<B: ByteOrder>(w: &mut Vec<u8>, is_64: bool, value: u64) {
    if is_64 {
        w.write_u64::<B>(value).unwrap();
    } else {
        w.write_u32::<B>(value as u32).unwrap();
    }
}

fn write_phdr<B: ByteOrder>(w: &mut Vec<u8>, is_64: bool, p: &ElfPhdr) {
    w.write_u32::<B>(p.p_type).unwrap();
    if is_64 {
        w.write_u32::<B>(p.p_flags).unwrap();
    }
    write_word::<B>(w, is_64, p.p_offset);
    write_word::<B>(w, is_64, p.p_vaddr);
    write_word::<B>(w, is_64, p.p_paddr);
    write_word::<B>(w, is_64, p.p_filesz);
    write_word::<B>(w, is_64, p.p_memsz);
    if !is_64 {
        w.write_u32::<B>(p.p_flags).unwrap();
    }
    write_word::<B>(w, is_64, p.p_align);
}

fn write_shdr<B: ByteOrder>(w: &mut Vec<u8>, is_64: bool, s: &ElfShdr) {
    w.write_u32::<B>(s.sh_name).unwrap();
    w.write_u32::<B>(s.sh_type).unwrap();
    write_word::<B>(w, is_64, s.sh_flags);
    write_word::<B>(w, is_64, s.sh_addr);
    write_word::<B>(w, is_64, s.sh_offset);
    write_word::<B>(w, is_64, s.sh_size);
    w.write_u32::<B>(s.sh_link).unwrap();
    w.write_u32::<B>(s.sh_info).unwrap();
    write_word::<B>(w, is_64, s.sh_addralign);
    write_word::<B>(w, is_64, s.sh_entsize);
}

fn write_sym<B: ByteOrder>(w: &mut Vec<u8>, is_64: bool, name: u32, sym: &Sym) {
    w.write_u32::<B>(name).unwrap();
    if is_64 {
        w.write_u8(sym.info()).unwrap();
        w.write_u8(sym.other).unwrap();
        w.write_u16::<B>(sym.shndx).unwrap();
        w.write_u64::<B>(sym.value).unwrap();
        w.write_u64::<B>(sym.size).unwrap();
    } else {
        w.write_u32::<B>(sym.value as u32).unwrap();
        w.write_u32::<B>(sym.size as u32).unwrap();
        w.write_u8(sym.info()).unwrap();
        w.write_u8(sym.other).unwrap();
        w.write_u16::<B>(sym.shndx).unwrap();
    }
}
