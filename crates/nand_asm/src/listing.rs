//! Human-readable listing of an assembled program, one row per real
//! instruction.

use core::fmt;

use crate::assembler::{Reference, Slot};
use crate::symbols::SymbolTable;
use crate::{Address, RealInstruction};

pub const LISTING_HEADER: &str = "ADDR  LABEL    MNEMONIC  IMMEDIATE  TARGET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingEntry<'a> {
    pub address: Address,
    pub label: Option<&'a str>,
    pub instruction: RealInstruction,
    /// Label whose address filled this immediate.
    pub target: Option<&'a str>,
}

impl fmt::Display for ListingEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let immediate = self.instruction.immediate();
        write!(
            f,
            "{:>4}  {:<8} {:<8}  {:>2}  {:04b}   {}",
            self.address,
            self.label.unwrap_or("-"),
            self.instruction.opcode().mnemonic(),
            immediate,
            immediate,
            self.target.unwrap_or("-"),
        )
    }
}

pub struct Listing<'a, const LABEL_CAP: usize> {
    symbols: &'a SymbolTable<LABEL_CAP>,
    references: &'a [Reference],
    slots: core::iter::Enumerate<core::slice::Iter<'a, Slot>>,
}

impl<'a, const LABEL_CAP: usize> Listing<'a, LABEL_CAP> {
    pub(crate) fn new(
        symbols: &'a SymbolTable<LABEL_CAP>,
        references: &'a [Reference],
        slots: &'a [Slot],
    ) -> Self {
        Self {
            symbols,
            references,
            slots: slots.iter().enumerate(),
        }
    }
}

impl<'a, const LABEL_CAP: usize> Iterator for Listing<'a, LABEL_CAP> {
    type Item = ListingEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, slot) = self.slots.next()?;
        let address = Address::try_from(index).ok()?;
        let instruction = slot.template.resolved()?;
        let target = slot
            .target
            .and_then(|reference| self.references.get(reference))
            .map(|reference| reference.name.as_str());
        Some(ListingEntry {
            address,
            label: self.symbols.label_at(address),
            instruction,
            target,
        })
    }
}
