//! ELF symbol hash tables
//!
//! Both the traditional SYSV table (`DT_HASH`) and the GNU table (`DT_GNU_HASH`)
//! are read straight out of the image through an [`ElfView`]. The SYSV table also
//! supplies the dynamic symbol count (its `nchain` word).

use super::ElfView;
use crate::{Result, parse_dynamic_error};

/// `base + index * 4`, failing instead of wrapping.
#[inline]
fn word_offset(base: u64, index: u64) -> Result<u64> {
    index
        .checked_mul(4)
        .and_then(|delta| base.checked_add(delta))
        .ok_or_else(|| parse_dynamic_error("hash table offset overflows"))
}

/// Header of a SYSV hash table.
#[derive(Debug, Clone, Copy)]
struct ElfHashHeader {
    /// Number of bucket entries in the hash table
    nbucket: u32,
    /// Number of chain entries, equal to the number of dynamic symbols
    nchain: u32,
}

/// SYSV hash table (`DT_HASH`), located by file offset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElfHash {
    header: ElfHashHeader,
    buckets: u64,
    chains: u64,
}

impl ElfHash {
    pub(crate) fn parse(view: &ElfView<'_>, offset: u64) -> Result<Self> {
        let header = ElfHashHeader {
            nbucket: view.read_u32(offset)?,
            nchain: Self::nchain(view, offset)?,
        };
        let buckets = word_offset(offset, 2)?;
        Ok(Self {
            header,
            buckets,
            chains: word_offset(buckets, header.nbucket.into())?,
        })
    }

    /// Reads only the `nchain` word, which is all symbol enumeration needs.
    #[inline]
    pub(crate) fn nchain(view: &ElfView<'_>, offset: u64) -> Result<u32> {
        view.read_u32(word_offset(offset, 1)?)
    }

    /// SYSV hash of a symbol name.
    pub(crate) fn hash(name: &[u8]) -> u32 {
        let mut hash = 0u32;
        for byte in name {
            hash = (hash << 4).wrapping_add(u32::from(*byte));
            let g = hash & 0xf000_0000;
            if g != 0 {
                hash ^= g >> 24;
            }
            hash &= !g;
        }
        hash
    }

    /// Returns the symbol indices on `name`'s chain, in chain order.
    ///
    /// The caller compares names; candidates on a chain only share a bucket.
    pub(crate) fn candidates<'a>(
        &self,
        view: ElfView<'a>,
        name: &[u8],
    ) -> Result<impl Iterator<Item = Result<usize>> + use<'a>> {
        let nbucket = self.header.nbucket;
        let first = if nbucket == 0 {
            0
        } else {
            let bucket = Self::hash(name) % nbucket;
            view.read_u32(word_offset(self.buckets, bucket.into())?)?
        };
        let chains = self.chains;
        let nchain = self.header.nchain;
        let mut cur = first;
        let mut steps = 0u32;
        Ok(core::iter::from_fn(move || {
            // Index 0 terminates a chain; a chain longer than nchain is cyclic.
            if cur == 0 || steps > nchain {
                return None;
            }
            steps += 1;
            let idx = cur;
            match word_offset(chains, idx.into()).and_then(|offset| view.read_u32(offset)) {
                Ok(next) => cur = next,
                Err(err) => {
                    cur = 0;
                    return Some(Err(err));
                }
            }
            Some(Ok(idx as usize))
        }))
    }
}

/// Header of a GNU hash table.
#[derive(Debug, Clone, Copy)]
struct ElfGnuHeader {
    nbucket: u32,
    symbias: u32,
    nbloom: u32,
}

/// GNU hash table (`DT_GNU_HASH`), located by file offset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElfGnuHash {
    header: ElfGnuHeader,
    buckets: u64,
    chains: u64,
}

impl ElfGnuHash {
    pub(crate) fn parse(view: &ElfView<'_>, offset: u64) -> Result<Self> {
        let header = ElfGnuHeader {
            nbucket: view.read_u32(offset)?,
            symbias: view.read_u32(word_offset(offset, 1)?)?,
            nbloom: view.read_u32(word_offset(offset, 2)?)?,
        };
        // The bloom words are address-sized.
        let bloom_size = u64::from(header.nbloom) * view.class().word_size() as u64;
        let buckets = word_offset(offset, 4)?
            .checked_add(bloom_size)
            .ok_or_else(|| parse_dynamic_error("GNU hash bloom filter overflows"))?;
        Ok(Self {
            header,
            buckets,
            chains: word_offset(buckets, header.nbucket.into())?,
        })
    }

    /// GNU (djb2) hash of a symbol name.
    pub(crate) fn hash(name: &[u8]) -> u32 {
        let mut hash = 5381u32;
        for byte in name {
            hash = hash.wrapping_mul(33).wrapping_add(u32::from(*byte));
        }
        hash
    }

    /// Returns the symbol indices whose stored hash matches `name`'s, in table order.
    pub(crate) fn candidates<'a>(
        &self,
        view: ElfView<'a>,
        name: &[u8],
    ) -> Result<impl Iterator<Item = Result<usize>> + use<'a>> {
        let hash = Self::hash(name);
        let nbucket = self.header.nbucket;
        let symbias = self.header.symbias;
        let start = if nbucket == 0 {
            0
        } else {
            view.read_u32(word_offset(self.buckets, (hash % nbucket).into())?)?
        };
        let chains = self.chains;
        // Buckets hold 0 for empty chains; anything below symbias has no chain entry.
        let mut cur = if start == 0 || start < symbias {
            None
        } else {
            Some(start)
        };
        Ok(core::iter::from_fn(move || {
            loop {
                let idx = cur?;
                let chain_hash = match word_offset(chains, (idx - symbias).into())
                    .and_then(|offset| view.read_u32(offset))
                {
                    Ok(chain_hash) => chain_hash,
                    Err(err) => {
                        cur = None;
                        return Some(Err(err));
                    }
                };
                // The low bit marks the last entry of a chain.
                cur = if chain_hash & 1 != 0 {
                    None
                } else {
                    idx.checked_add(1)
                };
                if hash | 1 == chain_hash | 1 {
                    return Some(Ok(idx as usize));
                }
            }
        }))
    }
}

/// The hash table a module offers for name lookup.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HashTable {
    Gnu(ElfGnuHash),
    Elf(ElfHash),
}
