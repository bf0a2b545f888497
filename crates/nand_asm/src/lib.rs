#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! Assembler for an 8-bit stack machine whose only logic primitive is NAND.
//!
//! Every real instruction is one byte: a 4-bit opcode in the high nibble and a
//! 4-bit immediate in the low nibble. The target keeps a byte stack and a
//! 16-bit instruction pointer, so jumps take their address from the stack.
//!
//! Source goes through four stages:
//!
//! - [`parser`] turns one line into a [`parser::Statement`].
//! - [`expander`] lowers a statement to a fixed-length run of
//!   [`expander::Template`]s. `not`, `and` and `or` are built from `nand`,
//!   8-bit pushes are split into nibbles and `jmp`/`jeq` targets become
//!   address placeholders.
//! - [`assembler::Assembler`] assigns addresses and labels in pass 1 and
//!   fills placeholders from the [`symbols::SymbolTable`] in pass 2.
//! - [`encoder`] packs the resolved instructions into the program image.
//!
//! The expansion length of a statement depends only on its mnemonic, never
//! on an operand's value, which is why two passes always suffice.

use thiserror_no_std::Error;
use variant_count::VariantCount;

pub mod assembler;
pub mod encoder;
pub mod expander;
pub mod listing;
pub mod parser;
pub mod symbols;


/// Byte offset into the program image.
pub type Address = u16;

/// Number of addressable bytes on the target.
pub const ADDRESS_SPACE: u32 = 0x1_0000;

/// Longest label name kept in the symbol table.
pub const NAME_CAP: usize = 32;

pub type Name = heapless::String<NAME_CAP>;

#[repr(u8)] // Must fit the 4-bit opcode field
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Halt,
    In,
    Out,
    PushIp,
    Push,
    Drop,
    Dup,
    Swap,
    Add,
    Sub,
    Nand,
    SetLessThan,
    ShiftLeft,
    ShiftRight,
    JumpEqual,
    Jump,
}

impl Opcode {
    const ALL: [Opcode; Opcode::VARIANT_COUNT] = [
        Opcode::Halt,
        Opcode::In,
        Opcode::Out,
        Opcode::PushIp,
        Opcode::Push,
        Opcode::Drop,
        Opcode::Dup,
        Opcode::Swap,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Nand,
        Opcode::SetLessThan,
        Opcode::ShiftLeft,
        Opcode::ShiftRight,
        Opcode::JumpEqual,
        Opcode::Jump,
    ];

    /// Source spelling of the opcode, as accepted by [`Opcode::from_mnemonic`].
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "hlt",
            Opcode::In => "in",
            Opcode::Out => "out",
            Opcode::PushIp => "puship",
            Opcode::Push => "pushn",
            Opcode::Drop => "drop",
            Opcode::Dup => "dup",
            Opcode::Swap => "swp",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Nand => "nand",
            Opcode::SetLessThan => "slt",
            Opcode::ShiftLeft => "shl",
            Opcode::ShiftRight => "shr",
            Opcode::JumpEqual => "jeq",
            Opcode::Jump => "jmp",
        }
    }

    /// Looks up a real opcode by its source spelling.
    ///
    /// A bare `push` always means the 8-bit pseudo push and is resolved by
    /// the parser.
    pub fn from_mnemonic(token: &str) -> Option<Self> {
        let opcode = match token {
            "hlt" => Opcode::Halt,
            "in" => Opcode::In,
            "out" => Opcode::Out,
            "puship" => Opcode::PushIp,
            "pushn" => Opcode::Push,
            "drop" => Opcode::Drop,
            "dup" => Opcode::Dup,
            "swp" => Opcode::Swap,
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "nand" => Opcode::Nand,
            "slt" => Opcode::SetLessThan,
            "shl" => Opcode::ShiftLeft,
            "shr" => Opcode::ShiftRight,
            "jeq" => Opcode::JumpEqual,
            "jmp" => Opcode::Jump,
            _ => return None,
        };
        Some(opcode)
    }

    /// Only `push` reads its immediate field.
    pub fn takes_immediate(self) -> bool {
        matches!(self, Opcode::Push)
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(DecodeError::InvalidOpcode(value))
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("the value {0} is not a 4-bit opcode")]
    InvalidOpcode(u8),
    #[error("the value {0} does not fit the 4-bit immediate field")]
    ImmediateTooWide(u8),
}

/// One native instruction, always encoded as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealInstruction {
    opcode: Opcode,
    immediate: u8,
}

impl RealInstruction {
    pub fn new(opcode: Opcode, immediate: u8) -> Result<Self, DecodeError> {
        if immediate > 0x0F {
            return Err(DecodeError::ImmediateTooWide(immediate));
        }
        Ok(Self { opcode, immediate })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn immediate(&self) -> u8 {
        self.immediate
    }

    /// Splits an image byte back into opcode and immediate.
    pub fn decode(byte: u8) -> Result<Self, DecodeError> {
        let opcode = Opcode::try_from(byte.wrapping_shr(4))?;
        Self::new(opcode, byte & 0x0F)
    }
}
