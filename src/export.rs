//! Import and export classification
//!
//! Imports and exports are views over the dynamic symbol table. A symbol is an
//! import when it is undefined here, and an export when it is defined with
//! global or weak binding. Only functions and data objects are reported either way.

use crate::{
    elf::{SymbolBind, SymbolType},
    symbol::Symbol,
};
use core::ffi::CStr;

/// Coarse kind of an imported or exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Variable,
}

impl SymbolKind {
    fn of(sym_type: SymbolType) -> Option<Self> {
        match sym_type {
            SymbolType::Function => Some(SymbolKind::Function),
            SymbolType::Object => Some(SymbolKind::Variable),
            _ => None,
        }
    }
}

/// A symbol this module requires from elsewhere.
///
/// The supplying module and the bound address are unknown to a single-module
/// inspector, so `module` and `address` are always `None` here. They exist so
/// that callers aggregating several modules can fill them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportDetails<'m> {
    pub kind: SymbolKind,
    pub name: &'m str,
    pub cname: &'m CStr,
    pub module: Option<&'m str>,
    pub address: Option<u64>,
}

/// A symbol this module defines and makes visible to others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportDetails<'m> {
    pub kind: SymbolKind,
    /// Empty when the stored name is not valid UTF-8; `cname` has the exact bytes.
    pub name: &'m str,
    pub cname: &'m CStr,
    /// Runtime address.
    pub address: u64,
}

impl<'m> ImportDetails<'m> {
    /// Classifies `symbol` as an import, if it is one.
    pub fn from_symbol(symbol: &Symbol<'m>) -> Option<Self> {
        if !symbol.is_undefined() {
            return None;
        }
        Some(Self {
            kind: SymbolKind::of(symbol.sym_type)?,
            name: symbol.name,
            cname: symbol.cname,
            module: None,
            address: None,
        })
    }
}

impl<'m> ExportDetails<'m> {
    /// Classifies `symbol` as an export, if it is one.
    pub fn from_symbol(symbol: &Symbol<'m>) -> Option<Self> {
        if symbol.is_undefined() || !matches!(symbol.bind, SymbolBind::Global | SymbolBind::Weak) {
            return None;
        }
        Some(Self {
            kind: SymbolKind::of(symbol.sym_type)?,
            name: symbol.name,
            cname: symbol.cname,
            address: symbol.address,
        })
    }
}
