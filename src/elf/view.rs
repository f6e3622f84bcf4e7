//! Bounds-checked access to the raw bytes of an ELF image.

use super::{ElfClass, ElfDyn, ElfPhdr, ElfShdr, ElfSym, Endian};
use crate::{Result, error::out_of_bounds};
use core::ffi::CStr;

/// A typed, bounds-checked reader over an ELF image.
///
/// `ElfView` knows the class and byte order of the image and decodes each
/// structure from its class-specific layout into the widened records of
/// [`defs`](super::defs). Every read checks its range against the buffer and
/// fails with [`Error::OutOfBounds`](crate::Error::OutOfBounds) instead of panicking.
#[derive(Clone, Copy)]
pub struct ElfView<'data> {
    data: &'data [u8],
    class: ElfClass,
    endian: Endian,
}

impl<'data> ElfView<'data> {
    pub(crate) const fn new(data: &'data [u8], class: ElfClass, endian: Endian) -> Self {
        Self {
            data,
            class,
            endian,
        }
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
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `len` bytes starting at file offset `offset`.
    pub fn bytes(&self, offset: u64, len: u64) -> Result<&'data [u8]> {
        let start = usize::try_from(offset).map_err(|_| out_of_bounds(offset, len))?;
        let size = usize::try_from(len).map_err(|_| out_of_bounds(offset, len))?;
        start
            .checked_add(size)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| out_of_bounds(offset, len))
    }

    fn array<const N: usize>(&self, offset: u64) -> Result<[u8; N]> {
        let bytes = self.bytes(offset, N as u64)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    #[inline]
    pub fn read_u8(&self, offset: u64) -> Result<u8> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16> {
        let buf = self.array(offset)?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(buf),
            Endian::Big => u16::from_be_bytes(buf),
        })
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        let buf = self.array(offset)?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(buf),
            Endian::Big => u32::from_be_bytes(buf),
        })
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let buf = self.array(offset)?;
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(buf),
            Endian::Big => u64::from_be_bytes(buf),
        })
    }

    /// Reads an address-sized (`Addr`/`Off`/`Xword`) value, widened to `u64`.
    pub fn read_word(&self, offset: u64) -> Result<u64> {
        match self.class {
            ElfClass::Elf32 => self.read_u32(offset).map(u64::from),
            ElfClass::Elf64 => self.read_u64(offset),
        }
    }

    /// Reads a signed address-sized (`Sword`/`Sxword`) value, sign-extended to `i64`.
    pub fn read_sword(&self, offset: u64) -> Result<i64> {
        match self.class {
            ElfClass::Elf32 => self.read_u32(offset).map(|v| i64::from(v as i32)),
            ElfClass::Elf64 => self.read_u64(offset).map(|v| v as i64),
        }
    }

    pub fn read_phdr(&self, offset: u64) -> Result<ElfPhdr> {
        // Check the whole entry up front so a truncated one never decodes partially.
        self.bytes(offset, self.class.phdr_size() as u64)?;
        Ok(match self.class {
            ElfClass::Elf32 => ElfPhdr {
                p_type: self.read_u32(offset)?,
                p_offset: self.read_u32(offset + 4)?.into(),
                p_vaddr: self.read_u32(offset + 8)?.into(),
                p_paddr: self.read_u32(offset + 12)?.into(),
                p_filesz: self.read_u32(offset + 16)?.into(),
                p_memsz: self.read_u32(offset + 20)?.into(),
                p_flags: self.read_u32(offset + 24)?,
                p_align: self.read_u32(offset + 28)?.into(),
            },
            ElfClass::Elf64 => ElfPhdr {
                p_type: self.read_u32(offset)?,
                p_flags: self.read_u32(offset + 4)?,
                p_offset: self.read_u64(offset + 8)?,
                p_vaddr: self.read_u64(offset + 16)?,
                p_paddr: self.read_u64(offset + 24)?,
                p_filesz: self.read_u64(offset + 32)?,
                p_memsz: self.read_u64(offset + 40)?,
                p_align: self.read_u64(offset + 48)?,
            },
        })
    }

    pub fn read_shdr(&self, offset: u64) -> Result<ElfShdr> {
        self.bytes(offset, self.class.shdr_size() as u64)?;
        Ok(match self.class {
            ElfClass::Elf32 => ElfShdr {
                sh_name: self.read_u32(offset)?,
                sh_type: self.read_u32(offset + 4)?,
                sh_flags: self.read_u32(offset + 8)?.into(),
                sh_addr: self.read_u32(offset + 12)?.into(),
                sh_offset: self.read_u32(offset + 16)?.into(),
                sh_size: self.read_u32(offset + 20)?.into(),
                sh_link: self.read_u32(offset + 24)?,
                sh_info: self.read_u32(offset + 28)?,
                sh_addralign: self.read_u32(offset + 32)?.into(),
                sh_entsize: self.read_u32(offset + 36)?.into(),
            },
            ElfClass::Elf64 => ElfShdr {
                sh_name: self.read_u32(offset)?,
                sh_type: self.read_u32(offset + 4)?,
                sh_flags: self.read_u64(offset + 8)?,
                sh_addr: self.read_u64(offset + 16)?,
                sh_offset: self.read_u64(offset + 24)?,
                sh_size: self.read_u64(offset + 32)?,
                sh_link: self.read_u32(offset + 40)?,
                sh_info: self.read_u32(offset + 44)?,
                sh_addralign: self.read_u64(offset + 48)?,
                sh_entsize: self.read_u64(offset + 56)?,
            },
        })
    }

    pub fn read_sym(&self, offset: u64) -> Result<ElfSym> {
        self.bytes(offset, self.class.sym_size() as u64)?;
        Ok(match self.class {
            ElfClass::Elf32 => ElfSym {
                st_name: self.read_u32(offset)?,
                st_value: self.read_u32(offset + 4)?.into(),
                st_size: self.read_u32(offset + 8)?.into(),
                st_info: self.read_u8(offset + 12)?,
                st_other: self.read_u8(offset + 13)?,
                st_shndx: self.read_u16(offset + 14)?,
            },
            ElfClass::Elf64 => ElfSym {
                st_name: self.read_u32(offset)?,
                st_info: self.read_u8(offset + 4)?,
                st_other: self.read_u8(offset + 5)?,
                st_shndx: self.read_u16(offset + 6)?,
                st_value: self.read_u64(offset + 8)?,
                st_size: self.read_u64(offset + 16)?,
            },
        })
    }

    pub fn read_dyn(&self, offset: u64) -> Result<ElfDyn> {
        self.bytes(offset, self.class.dyn_size() as u64)?;
        let word = self.class.word_size() as u64;
        Ok(ElfDyn {
            d_tag: self.read_sword(offset)?,
            d_val: self.read_word(offset + word)?,
        })
    }

    /// Returns the NUL-terminated string at `offset`.
    ///
    /// The terminator must occur before `limit` (an absolute file offset) when one
    /// is given, and before the end of the image otherwise.
    pub fn read_cstr(&self, offset: u64, limit: Option<u64>) -> Result<&'data CStr> {
        let end = limit.map_or(self.data.len() as u64, |limit| {
            limit.min(self.data.len() as u64)
        });
        let tail = self.bytes(offset, end.saturating_sub(offset))?;
        CStr::from_bytes_until_nul(tail).map_err(|_| out_of_bounds(offset, tail.len() as u64 + 1))
    }
}
