use heapless::Vec;

use crate::assembler::{AssemblerError, AssemblerErrorKind};
use crate::{Address, Name};

#[derive(Debug, Clone)]
pub struct Symbol {
    name: Name,
    address: Address,
    line: u32,
}

impl Symbol {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Source line the label was defined on.
    pub fn line(&self) -> u32 {
        self.line
    }
}

/// Label addresses, in definition order. Filled during pass 1 only.
#[derive(Debug, Clone)]
pub struct SymbolTable<const CAP: usize> {
    symbols: Vec<Symbol, CAP>,
}

impl<const CAP: usize> SymbolTable<CAP> {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }

    pub fn define(&mut self, name: &str, address: Address, line: u32) -> Result<(), AssemblerError> {
        if let Some(existing) = self.get(name) {
            return Err(AssemblerError::Kind(AssemblerErrorKind::DuplicateLabel {
                first_line: existing.line,
            }));
        }
        let name = to_name(name)?;
        self.symbols
            .push(Symbol {
                name,
                address,
                line,
            })
            .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::TooManyLabels))
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|symbol| symbol.name.as_str() == name)
    }

    pub fn resolve(&self, name: &str) -> Option<Address> {
        self.get(name).map(Symbol::address)
    }

    /// Label defined at `address`, if any. Every label sits on its own
    /// instruction, so there is at most one.
    pub fn label_at(&self, address: Address) -> Option<&str> {
        self.symbols
            .iter()
            .find(|symbol| symbol.address == address)
            .map(Symbol::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<const CAP: usize> Default for SymbolTable<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn to_name(name: &str) -> Result<Name, AssemblerError> {
    let mut out = Name::new();
    out.push_str(name)
        .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::NameTooLong))?;
    Ok(out)
}
