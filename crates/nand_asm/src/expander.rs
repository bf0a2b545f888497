//! Lowering of statements to real instructions.
//!
//! Every mnemonic maps to a fixed table of steps. The operand only fills in
//! immediate fields, so the number of instructions a statement produces is
//! known from its mnemonic alone.
//!
//! The target has no AND, OR or NOT; they are composed from `nand`:
//!
//! | pseudo | lowering | identity |
//! |---|---|---|
//! | `not` | `dup; nand` | ¬x = NAND(x, x) |
//! | `and` | `nand; dup; nand` | a∧b = ¬NAND(a, b) |
//! | `or`  | `dup; nand; swp; dup; nand; swp; nand` | a∨b = NAND(¬a, ¬b) |
//!
//! For `or` the operand on top of the stack is inverted first, then the
//! one beneath it.
//!
//! The real `push` carries 4 bits, so `push IMM8` becomes
//! `push hi; push 4; shl; push lo; add`. `jmp`/`jeq` with an operand push
//! the 16-bit target as two such 8-bit pushes, high byte first.

use crate::assembler::{AssemblerError, AssemblerErrorKind};
use crate::parser::{Mnemonic, Operand, Pseudo, Statement};
use crate::{Address, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressByte {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nibble {
    High,
    Low,
}

impl AddressByte {
    pub fn of(self, address: Address) -> u8 {
        let [high, low] = address.to_be_bytes();
        match self {
            AddressByte::High => high,
            AddressByte::Low => low,
        }
    }
}

impl Nibble {
    pub fn of(self, byte: u8) -> u8 {
        match self {
            Nibble::High => byte.wrapping_shr(4),
            Nibble::Low => byte & 0x0F,
        }
    }
}

/// Immediate field of a template. `L` names the label a pending field waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate<L> {
    Known(u8),
    PendingLabel {
        label: L,
        byte: AddressByte,
        nibble: Nibble,
    },
}

impl<L> Immediate<L> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Immediate::PendingLabel { .. })
    }
}

/// A real instruction whose immediate may still wait on a label address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template<L> {
    pub opcode: Opcode,
    pub immediate: Immediate<L>,
}

impl<L> Template<L> {
    pub fn pending_label(&self) -> Option<&L> {
        match &self.immediate {
            Immediate::PendingLabel { label, .. } => Some(label),
            Immediate::Known(_) => None,
        }
    }

    /// Fills a pending immediate with the matching nibble of `address`.
    pub fn resolve(&mut self, address: Address) {
        if let Immediate::PendingLabel { byte, nibble, .. } = self.immediate {
            self.immediate = Immediate::Known(nibble.of(byte.of(address)));
        }
    }

    /// Swaps the label handle of a pending immediate.
    pub fn map_label<M>(self, f: impl FnOnce(L) -> M) -> Template<M> {
        let immediate = match self.immediate {
            Immediate::Known(value) => Immediate::Known(value),
            Immediate::PendingLabel {
                label,
                byte,
                nibble,
            } => Immediate::PendingLabel {
                label: f(label),
                byte,
                nibble,
            },
        };
        Template {
            opcode: self.opcode,
            immediate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Zero,
    Const(u8),
    Operand(Nibble),
    Target(AddressByte, Nibble),
}

#[derive(Debug, Clone, Copy)]
struct Step {
    opcode: Opcode,
    field: Field,
}

const fn op(opcode: Opcode) -> Step {
    Step {
        opcode,
        field: Field::Zero,
    }
}

const fn push(field: Field) -> Step {
    Step {
        opcode: Opcode::Push,
        field,
    }
}

const NOT: [Step; 2] = [op(Opcode::Dup), op(Opcode::Nand)];

const AND: [Step; 3] = [op(Opcode::Nand), op(Opcode::Dup), op(Opcode::Nand)];

const OR: [Step; 7] = [
    op(Opcode::Dup),
    op(Opcode::Nand),
    op(Opcode::Swap),
    op(Opcode::Dup),
    op(Opcode::Nand),
    op(Opcode::Swap),
    op(Opcode::Nand),
];

const PUSH8: [Step; 5] = [
    push(Field::Operand(Nibble::High)),
    push(Field::Const(4)),
    op(Opcode::ShiftLeft),
    push(Field::Operand(Nibble::Low)),
    op(Opcode::Add),
];

const fn jump_through(opcode: Opcode) -> [Step; 11] {
    [
        push(Field::Target(AddressByte::High, Nibble::High)),
        push(Field::Const(4)),
        op(Opcode::ShiftLeft),
        push(Field::Target(AddressByte::High, Nibble::Low)),
        op(Opcode::Add),
        push(Field::Target(AddressByte::Low, Nibble::High)),
        push(Field::Const(4)),
        op(Opcode::ShiftLeft),
        push(Field::Target(AddressByte::Low, Nibble::Low)),
        op(Opcode::Add),
        op(opcode),
    ]
}

const JUMP: [Step; 11] = jump_through(Opcode::Jump);
const JUMP_EQUAL: [Step; 11] = jump_through(Opcode::JumpEqual);

fn table(pseudo: Pseudo) -> &'static [Step] {
    match pseudo {
        Pseudo::Not => &NOT,
        Pseudo::And => &AND,
        Pseudo::Or => &OR,
        Pseudo::Push => &PUSH8,
        Pseudo::Jump => &JUMP,
        Pseudo::JumpEqual => &JUMP_EQUAL,
    }
}

/// Number of real instructions (and bytes) a statement with this mnemonic
/// lowers to.
pub fn expansion_len(mnemonic: Mnemonic) -> usize {
    match mnemonic {
        Mnemonic::Real(_) => 1,
        Mnemonic::Pseudo(pseudo) => table(pseudo).len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Label(&'a str),
    Absolute(Address),
}

#[derive(Debug, Clone, Copy)]
enum Steps {
    Table(&'static [Step]),
    Single(Step),
}

/// Lazy sequence of templates for one statement.
#[derive(Debug, Clone)]
pub struct Expansion<'a> {
    steps: Steps,
    position: usize,
    operand: u8,
    target: Target<'a>,
}

impl<'a> Expansion<'a> {
    fn step(&self, index: usize) -> Option<Step> {
        match self.steps {
            Steps::Table(steps) => steps.get(index).copied(),
            Steps::Single(step) => (index == 0).then_some(step),
        }
    }

    fn total(&self) -> usize {
        match self.steps {
            Steps::Table(steps) => steps.len(),
            Steps::Single(_) => 1,
        }
    }

    fn immediate(&self, field: Field) -> Immediate<&'a str> {
        match field {
            Field::Zero => Immediate::Known(0),
            Field::Const(value) => Immediate::Known(value),
            Field::Operand(nibble) => Immediate::Known(nibble.of(self.operand)),
            Field::Target(byte, nibble) => match self.target {
                Target::Absolute(address) => Immediate::Known(nibble.of(byte.of(address))),
                Target::Label(label) => Immediate::PendingLabel {
                    label,
                    byte,
                    nibble,
                },
            },
        }
    }
}

impl<'a> Iterator for Expansion<'a> {
    type Item = Template<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.step(self.position)?;
        self.position = self.position.saturating_add(1);
        Some(Template {
            opcode: step.opcode,
            immediate: self.immediate(step.field),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Expansion<'_> {}

/// Checks a statement's operand and returns its expansion.
pub fn expand<'a>(statement: &Statement<'a>) -> Result<Expansion<'a>, AssemblerError> {
    let mut expansion = Expansion {
        steps: Steps::Single(op(Opcode::Halt)),
        position: 0,
        operand: 0,
        target: Target::Absolute(0),
    };

    match statement.mnemonic {
        Mnemonic::Pseudo(pseudo @ (Pseudo::Not | Pseudo::And | Pseudo::Or)) => {
            reject_operand(statement)?;
            expansion.steps = Steps::Table(table(pseudo));
        }
        Mnemonic::Pseudo(Pseudo::Push) => {
            let value = literal(statement, -128, 255)?;
            // Negative literals are stored two's complement.
            expansion.operand = (value & 0xFF) as u8;
            expansion.steps = Steps::Table(&PUSH8);
        }
        Mnemonic::Pseudo(pseudo @ (Pseudo::Jump | Pseudo::JumpEqual)) => {
            expansion.target = target(statement)?;
            expansion.steps = Steps::Table(table(pseudo));
        }
        Mnemonic::Real(Opcode::Push) => {
            let value = literal(statement, 0, 15)?;
            expansion.operand = (value & 0x0F) as u8;
            expansion.steps = Steps::Single(push(Field::Operand(Nibble::Low)));
        }
        Mnemonic::Real(opcode) => {
            reject_operand(statement)?;
            expansion.steps = Steps::Single(op(opcode));
        }
    }
    Ok(expansion)
}

fn reject_operand(statement: &Statement<'_>) -> Result<(), AssemblerError> {
    match statement.operand {
        None => Ok(()),
        Some(_) => Err(AssemblerError::Kind(AssemblerErrorKind::Syntax)),
    }
}

fn literal(statement: &Statement<'_>, min: i64, max: i64) -> Result<i64, AssemblerError> {
    match statement.operand {
        None => Err(AssemblerError::Kind(AssemblerErrorKind::MissingOperand)),
        Some(Operand::LabelRef(_)) => Err(AssemblerError::Kind(AssemblerErrorKind::Syntax)),
        Some(Operand::Immediate(value)) if (min..=max).contains(&value) => Ok(value),
        Some(Operand::Immediate(value)) => Err(AssemblerError::Kind(
            AssemblerErrorKind::ImmediateOutOfRange { value, min, max },
        )),
    }
}

fn target<'a>(statement: &Statement<'a>) -> Result<Target<'a>, AssemblerError> {
    match statement.operand {
        None => Err(AssemblerError::Kind(AssemblerErrorKind::MissingOperand)),
        Some(Operand::LabelRef(label)) => Ok(Target::Label(label)),
        Some(Operand::Immediate(value)) => Address::try_from(value)
            .map(Target::Absolute)
            .map_err(|_| {
                AssemblerError::Kind(AssemblerErrorKind::ImmediateOutOfRange {
                    value,
                    min: 0,
                    max: i64::from(Address::MAX),
                })
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    extern crate std;
    use std::vec::Vec;

    fn lower(line: &str) -> Vec<Template<&str>> {
        let statement = parse_line(line).unwrap().unwrap();
        expand(&statement).unwrap().collect()
    }

    fn known(opcode: Opcode, value: u8) -> Template<&'static str> {
        Template {
            opcode,
            immediate: Immediate::Known(value),
        }
    }

    #[test]
    fn splits_byte_push_into_nibbles() {
        assert_eq!(
            lower("push 200"),
            [
                known(Opcode::Push, 0xC),
                known(Opcode::Push, 4),
                known(Opcode::ShiftLeft, 0),
                known(Opcode::Push, 0x8),
                known(Opcode::Add, 0),
            ]
        );
    }

    #[test]
    fn small_push_keeps_the_long_form() {
        assert_eq!(lower("push 15").len(), 5);
        assert_eq!(lower("push 0").len(), 5);
        assert_eq!(lower("pushn 15"), [known(Opcode::Push, 15)]);
    }

    #[test]
    fn negative_push_is_twos_complement() {
        let templates = lower("push -1");
        assert_eq!(templates[0], known(Opcode::Push, 0xF));
        assert_eq!(templates[3], known(Opcode::Push, 0xF));
    }

    #[test]
    fn logic_pseudos_use_only_nand() {
        let opcodes = |line: &str| lower(line).iter().map(|t| t.opcode).collect::<Vec<_>>();
        assert_eq!(opcodes("not"), [Opcode::Dup, Opcode::Nand]);
        assert_eq!(opcodes("and"), [Opcode::Nand, Opcode::Dup, Opcode::Nand]);
        assert_eq!(
            opcodes("or"),
            [
                Opcode::Dup,
                Opcode::Nand,
                Opcode::Swap,
                Opcode::Dup,
                Opcode::Nand,
                Opcode::Swap,
                Opcode::Nand,
            ]
        );
    }

    #[test]
    fn label_jump_leaves_placeholders() {
        let templates = lower("jeq done");
        assert_eq!(templates.len(), 11);
        assert_eq!(
            templates[0].immediate,
            Immediate::PendingLabel {
                label: "done",
                byte: AddressByte::High,
                nibble: Nibble::High,
            }
        );
        assert_eq!(
            templates[8].immediate,
            Immediate::PendingLabel {
                label: "done",
                byte: AddressByte::Low,
                nibble: Nibble::Low,
            }
        );
        assert_eq!(templates[10], known(Opcode::JumpEqual, 0));
        let pending = templates.iter().filter(|t| t.immediate.is_pending()).count();
        assert_eq!(pending, 4);
    }

    #[test]
    fn literal_jump_resolves_immediately() {
        let templates = lower("jmp 0x1234");
        let nibbles: Vec<u8> = [0, 3, 5, 8]
            .iter()
            .map(|&i| match templates[i].immediate {
                Immediate::Known(value) => value,
                Immediate::PendingLabel { .. } => panic!("unexpected placeholder"),
            })
            .collect();
        assert_eq!(nibbles, [1, 2, 3, 4]);
    }

    #[test]
    fn length_is_fixed_by_mnemonic() {
        for line in ["push 0", "push 255", "push -128", "jmp 0", "jmp far", "not", "and", "or", "dup"] {
            let statement = parse_line(line).unwrap().unwrap();
            let produced = expand(&statement).unwrap().count();
            assert_eq!(produced, expansion_len(statement.mnemonic), "{line}");
        }
    }

    #[test]
    fn resolve_fills_the_matching_nibble() {
        let mut template = Template {
            opcode: Opcode::Push,
            immediate: Immediate::PendingLabel {
                label: "x",
                byte: AddressByte::High,
                nibble: Nibble::Low,
            },
        };
        template.resolve(0xABCD);
        assert_eq!(template.immediate, Immediate::Known(0xB));
    }

    fn kind_of(line: &str) -> AssemblerErrorKind {
        let statement = parse_line(line).unwrap().unwrap();
        expand(&statement).unwrap_err().error_kind().clone()
    }

    #[test]
    fn reports_operand_errors() {
        assert!(matches!(
            kind_of("push 300"),
            AssemblerErrorKind::ImmediateOutOfRange { value: 300, min: -128, max: 255 }
        ));
        assert!(matches!(
            kind_of("push -129"),
            AssemblerErrorKind::ImmediateOutOfRange { .. }
        ));
        assert!(matches!(
            kind_of("pushn 16"),
            AssemblerErrorKind::ImmediateOutOfRange { value: 16, min: 0, max: 15 }
        ));
        assert!(matches!(
            kind_of("jmp 65536"),
            AssemblerErrorKind::ImmediateOutOfRange { .. }
        ));
        assert!(matches!(kind_of("push"), AssemblerErrorKind::MissingOperand));
        assert!(matches!(kind_of("pushn"), AssemblerErrorKind::MissingOperand));
        assert!(matches!(kind_of("not 3"), AssemblerErrorKind::Syntax));
        assert!(matches!(kind_of("dup 1"), AssemblerErrorKind::Syntax));
        assert!(matches!(kind_of("push label"), AssemblerErrorKind::Syntax));
    }
}
