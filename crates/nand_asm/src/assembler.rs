//! Two-pass assembler.
//!
//! Pass 1 runs line by line in [`Assembler::add_line`]: every statement is
//! parsed, expanded and appended to the template cache, and its label is bound
//! to the address of its first real instruction. Pass 2 runs in
//! [`Assembler::finish`] and patches every label placeholder from the symbol
//! table. Expansion length never depends on a label's value, so addresses
//! handed out in pass 1 are final.

use heapless::Vec;
use thiserror_no_std::Error;

use crate::encoder::{self, EncodeError, ProgramImage};
use crate::expander::{Template, expand};
use crate::listing::Listing;
use crate::parser::{Statement, parse_line};
use crate::symbols::{SymbolTable, to_name};
use crate::{ADDRESS_SPACE, Address, Name, RealInstruction};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("{0}")]
    Kind(AssemblerErrorKind),
    #[error("line {line}: {kind}")]
    WithLine { line: u32, kind: AssemblerErrorKind },
}

impl AssemblerError {
    pub(crate) fn with_line(self, line: u32) -> Self {
        match self {
            AssemblerError::WithLine { .. } => self,
            AssemblerError::Kind(kind) => AssemblerError::WithLine { line, kind },
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        match self {
            Self::Kind(_) => None,
            Self::WithLine { line, .. } => Some(*line),
        }
    }

    pub fn error_kind(&self) -> &AssemblerErrorKind {
        match self {
            Self::Kind(kind) => kind,
            Self::WithLine { kind, .. } => kind,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    #[error("malformed line")]
    Syntax,
    #[error("more than one label on a line")]
    DuplicateInstructionMarker,
    #[error("label must be followed by an instruction")]
    LabelWithoutInstruction,
    #[error("unknown mnemonic")]
    UnknownMnemonic,
    #[error("instruction requires an operand")]
    MissingOperand,
    #[error("immediate {value} is outside {min}..={max}")]
    ImmediateOutOfRange { value: i64, min: i64, max: i64 },
    #[error("label already in use (first defined on line {first_line})")]
    DuplicateLabel { first_line: u32 },
    #[error("jump targets an undefined label")]
    UndefinedLabel,
    #[error("label name is too long")]
    NameTooLong,
    #[error("too many labels or label references")]
    TooManyLabels,
    #[error("program does not fit the image")]
    ImageTooLarge,
    #[error("too many source lines")]
    LineNumberOverflow,
    #[error("encoder failure: {0}")]
    Encode(EncodeError),
}

impl From<EncodeError> for AssemblerError {
    fn from(err: EncodeError) -> Self {
        AssemblerError::Kind(AssemblerErrorKind::Encode(err))
    }
}

/// Index into the reference list; stands in for a label name in templates.
pub type ReferenceId = usize;

/// A label used as a jump target, recorded once per name.
#[derive(Debug, Clone)]
pub(crate) struct Reference {
    pub(crate) name: Name,
    line: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) template: Template<ReferenceId>,
    pub(crate) target: Option<ReferenceId>,
}

#[derive(Debug)]
pub struct Assembler<const LABEL_CAP: usize, const IMAGE_CAP: usize> {
    symbols: SymbolTable<LABEL_CAP>,
    references: Vec<Reference, LABEL_CAP>,
    slots: Vec<Slot, IMAGE_CAP>,
    cursor: u32,
    line_number: u32,
}

impl<const LABEL_CAP: usize, const IMAGE_CAP: usize> Assembler<LABEL_CAP, IMAGE_CAP> {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            references: Vec::new(),
            slots: Vec::new(),
            cursor: 0,
            line_number: 0,
        }
    }

    /// Runs pass 1 over every line of `source`, then pass 2.
    pub fn assemble_source(
        mut self,
        source: &str,
    ) -> Result<Assembly<LABEL_CAP, IMAGE_CAP>, AssemblerError> {
        for line in source.lines() {
            self.add_line(line)?;
        }
        self.finish()
    }

    pub fn add_line(&mut self, line: &str) -> Result<(), AssemblerError> {
        self.line_number = self
            .line_number
            .checked_add(1)
            .ok_or(AssemblerError::Kind(AssemblerErrorKind::LineNumberOverflow))?;
        let line_number = self.line_number;
        let Some(statement) = parse_line(line).map_err(|err| err.with_line(line_number))? else {
            return Ok(());
        };
        self.add_statement(&statement, line_number)
    }

    /// Pass 1 for one statement found on source line `line`: bind its label
    /// and cache its expansion.
    pub fn add_statement(
        &mut self,
        statement: &Statement<'_>,
        line: u32,
    ) -> Result<(), AssemblerError> {
        self.place(statement, line)
            .map_err(|err| err.with_line(line))
    }

    fn place(&mut self, statement: &Statement<'_>, line: u32) -> Result<(), AssemblerError> {
        let expansion = expand(statement)?;
        let length = u32::try_from(expansion.len())
            .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::ImageTooLarge))?;
        let next = self
            .cursor
            .checked_add(length)
            .filter(|next| *next <= ADDRESS_SPACE)
            .ok_or(AssemblerError::Kind(AssemblerErrorKind::ImageTooLarge))?;
        let address = Address::try_from(self.cursor)
            .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::ImageTooLarge))?;

        if let Some(label) = statement.label {
            self.symbols.define(label, address, line)?;
        }

        // All placeholders of one statement wait on the same label.
        let mut reference = None;
        for template in expansion {
            let target = match (template.pending_label(), reference) {
                (None, _) => None,
                (Some(_), Some(id)) => Some(id),
                (Some(name), None) => {
                    let id = self.add_reference(name, line)?;
                    reference = Some(id);
                    Some(id)
                }
            };
            self.slots
                .push(Slot {
                    template: template.map_label(|_| target.unwrap_or_default()),
                    target,
                })
                .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::ImageTooLarge))?;
        }

        self.cursor = next;
        Ok(())
    }

    /// Address the next statement will be placed at.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn symbols(&self) -> &SymbolTable<LABEL_CAP> {
        &self.symbols
    }

    /// Pass 2: substitute every placeholder with its label's address.
    pub fn finish(mut self) -> Result<Assembly<LABEL_CAP, IMAGE_CAP>, AssemblerError> {
        let mut addresses: Vec<Address, LABEL_CAP> = Vec::new();
        for reference in self.references.iter() {
            let address = self.symbols.resolve(reference.name.as_str()).ok_or(
                AssemblerError::Kind(AssemblerErrorKind::UndefinedLabel).with_line(reference.line),
            )?;
            addresses
                .push(address)
                .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::TooManyLabels))?;
        }

        for slot in self.slots.iter_mut() {
            let Some(reference) = slot.target else {
                continue;
            };
            let address = addresses
                .get(reference)
                .copied()
                .ok_or(AssemblerError::Kind(AssemblerErrorKind::UndefinedLabel))?;
            slot.template.resolve(address);
        }

        Ok(Assembly {
            symbols: self.symbols,
            references: self.references,
            slots: self.slots,
        })
    }

    /// Id of the reference to `name`, shared by every statement that jumps
    /// to it. The first referencing line is kept for error reports.
    fn add_reference(&mut self, name: &str, line: u32) -> Result<ReferenceId, AssemblerError> {
        if let Some(id) = self
            .references
            .iter()
            .position(|reference| reference.name.as_str() == name)
        {
            return Ok(id);
        }
        let id = self.references.len();
        self.references
            .push(Reference {
                name: to_name(name)?,
                line,
            })
            .map_err(|_| AssemblerError::Kind(AssemblerErrorKind::TooManyLabels))?;
        Ok(id)
    }
}

impl<const LABEL_CAP: usize, const IMAGE_CAP: usize> Default for Assembler<LABEL_CAP, IMAGE_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fully resolved program, ready to encode.
#[derive(Debug)]
pub struct Assembly<const LABEL_CAP: usize, const IMAGE_CAP: usize> {
    symbols: SymbolTable<LABEL_CAP>,
    references: Vec<Reference, LABEL_CAP>,
    slots: Vec<Slot, IMAGE_CAP>,
}

impl<const LABEL_CAP: usize, const IMAGE_CAP: usize> Assembly<LABEL_CAP, IMAGE_CAP> {
    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn symbols(&self) -> &SymbolTable<LABEL_CAP> {
        &self.symbols
    }

    /// Real instructions in address order.
    pub fn instructions(&self) -> impl Iterator<Item = RealInstruction> + '_ {
        self.slots.iter().filter_map(|slot| slot.template.resolved())
    }

    pub fn encode<'b>(&self, image: &'b mut [u8]) -> Result<ProgramImage<'b>, AssemblerError> {
        let templates = self.slots.iter().map(|slot| &slot.template);
        Ok(encoder::encode(templates, image)?)
    }

    pub fn listing(&self) -> Listing<'_, LABEL_CAP> {
        Listing::new(&self.symbols, &self.references, &self.slots)
    }
}
