//! Line parser: one source line in, at most one statement out.
//!
//! Grammar: `[label ":"] mnemonic [operand] [";" comment]`. Identifiers are
//! case-sensitive and whitespace between tokens is free.

use crate::Opcode;
use crate::assembler::{AssemblerError, AssemblerErrorKind};

/// Source-level instructions that lower to several real instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    Not,
    And,
    Or,
    Push,
    Jump,
    JumpEqual,
}

impl Pseudo {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Pseudo::Not => "not",
            Pseudo::And => "and",
            Pseudo::Or => "or",
            Pseudo::Push => "push",
            Pseudo::Jump => "jmp",
            Pseudo::JumpEqual => "jeq",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Real(Opcode),
    Pseudo(Pseudo),
}

impl Mnemonic {
    /// Resolves a mnemonic token.
    ///
    /// `jmp` and `jeq` name the pseudo forms when they carry an operand and
    /// the real opcodes otherwise. The operand's value never matters.
    pub fn resolve(token: &str, has_operand: bool) -> Result<Self, AssemblerError> {
        let mnemonic = match token {
            "not" => Mnemonic::Pseudo(Pseudo::Not),
            "and" => Mnemonic::Pseudo(Pseudo::And),
            "or" => Mnemonic::Pseudo(Pseudo::Or),
            "push" => Mnemonic::Pseudo(Pseudo::Push),
            "jmp" if has_operand => Mnemonic::Pseudo(Pseudo::Jump),
            "jeq" if has_operand => Mnemonic::Pseudo(Pseudo::JumpEqual),
            _ => Opcode::from_mnemonic(token)
                .map(Mnemonic::Real)
                .ok_or(AssemblerError::Kind(AssemblerErrorKind::UnknownMnemonic))?,
        };
        Ok(mnemonic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'a> {
    /// Literal value. Literals too large for `i64` saturate so the range
    /// check in the expander still reports them.
    Immediate(i64),
    LabelRef(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement<'a> {
    pub label: Option<&'a str>,
    pub mnemonic: Mnemonic,
    pub operand: Option<Operand<'a>>,
}

/// Parses one line. Blank and comment-only lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Statement<'_>>, AssemblerError> {
    let line = strip_comment(line).trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (label, body) = match line.split_once(':') {
        Some((label, rest)) => (Some(parse_label(label.trim())?), rest.trim()),
        None => (None, line),
    };
    if body.contains(':') {
        return Err(AssemblerError::Kind(
            AssemblerErrorKind::DuplicateInstructionMarker,
        ));
    }

    let mut tokens = body.split_whitespace();
    let Some(mnemonic) = tokens.next() else {
        return Err(AssemblerError::Kind(
            AssemblerErrorKind::LabelWithoutInstruction,
        ));
    };
    let operand = tokens.next().map(parse_operand).transpose()?;
    if tokens.next().is_some() {
        return Err(AssemblerError::Kind(AssemblerErrorKind::Syntax));
    }

    let mnemonic = Mnemonic::resolve(mnemonic, operand.is_some())?;
    Ok(Some(Statement {
        label,
        mnemonic,
        operand,
    }))
}

fn parse_label(token: &str) -> Result<&str, AssemblerError> {
    if is_identifier(token) {
        Ok(token)
    } else {
        Err(AssemblerError::Kind(AssemblerErrorKind::Syntax))
    }
}

fn parse_operand(token: &str) -> Result<Operand<'_>, AssemblerError> {
    if let Some(value) = parse_literal(token)? {
        return Ok(Operand::Immediate(value));
    }
    if is_identifier(token) {
        return Ok(Operand::LabelRef(token));
    }
    Err(AssemblerError::Kind(AssemblerErrorKind::Syntax))
}

/// Decimal (optionally negative) or `0x` hex. Returns `None` for tokens
/// that do not start like a number.
fn parse_literal(token: &str) -> Result<Option<i64>, AssemblerError> {
    let (negative, unsigned) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if !unsigned.starts_with(|c: char| c.is_ascii_digit()) {
        if negative {
            return Err(AssemblerError::Kind(AssemblerErrorKind::Syntax));
        }
        return Ok(None);
    }

    let (radix, digits) = match unsigned.strip_prefix("0x") {
        Some(hex) => (16, hex),
        None => (10, unsigned),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(AssemblerError::Kind(AssemblerErrorKind::Syntax));
    }

    let magnitude = i64::from_str_radix(digits, radix).unwrap_or(i64::MAX);
    let value = if negative {
        magnitude.checked_neg().unwrap_or(i64::MIN)
    } else {
        magnitude
    };
    Ok(Some(value))
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Drops everything from the first `;` not preceded by a backslash.
fn strip_comment(line: &str) -> &str {
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        match c {
            ';' if !escaped => return line.get(..index).unwrap_or(line),
            '\\' => escaped = !escaped,
            _ => escaped = false,
        }
    }
    line
}
