//! Final serialization: one byte per real instruction,
//! `(opcode << 4) | immediate`, no header and no padding.

use core::fmt;

use thiserror_no_std::Error;

use crate::expander::{Immediate, Template};
use crate::{Address, RealInstruction};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("instruction at address {address} still waits on a label")]
    UnresolvedPlaceholder { address: usize },
    #[error("immediate {value} at address {address} does not fit 4 bits")]
    ImmediateTooWide { address: usize, value: u8 },
    #[error("image needs {needed} bytes but the buffer is smaller")]
    ImageBufferTooSmall { needed: usize },
}

impl RealInstruction {
    pub fn to_byte(&self) -> u8 {
        u8::from(self.opcode()).wrapping_shl(4) | self.immediate()
    }
}

impl<L> Template<L> {
    /// The finished instruction, or `None` while a label is pending.
    pub fn resolved(&self) -> Option<RealInstruction> {
        match self.immediate {
            Immediate::Known(value) => RealInstruction::new(self.opcode, value).ok(),
            Immediate::PendingLabel { .. } => None,
        }
    }
}

/// Encodes one template placed at `address`.
pub fn encode_template<L>(template: &Template<L>, address: usize) -> Result<u8, EncodeError> {
    match template.immediate {
        Immediate::Known(value) => RealInstruction::new(template.opcode, value)
            .map(|instruction| instruction.to_byte())
            .map_err(|_| EncodeError::ImmediateTooWide { address, value }),
        Immediate::PendingLabel { .. } => Err(EncodeError::UnresolvedPlaceholder { address }),
    }
}

/// Encodes `templates` in order into the front of `image`.
pub fn encode<'a, 'b, L: 'a>(
    templates: impl ExactSizeIterator<Item = &'a Template<L>>,
    image: &'b mut [u8],
) -> Result<ProgramImage<'b>, EncodeError> {
    let needed = templates.len();
    let Some(out) = image.get_mut(..needed) else {
        return Err(EncodeError::ImageBufferTooSmall { needed });
    };
    for (address, (slot, template)) in out.iter_mut().zip(templates).enumerate() {
        *slot = encode_template(template, address)?;
    }
    Ok(ProgramImage { bytes: out })
}

/// Assembled bytes, indexable by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage<'a> {
    bytes: &'a [u8],
}

impl<'a> ProgramImage<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn byte_at(&self, address: Address) -> Option<u8> {
        self.bytes.get(usize::from(address)).copied()
    }
}

/// Writes one 8-digit binary string per byte, the memory-init text format.
pub fn write_bits<W: fmt::Write>(image: &[u8], out: &mut W) -> fmt::Result {
    for byte in image {
        writeln!(out, "{byte:08b}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;
    use crate::expander::{AddressByte, Nibble};

    extern crate std;
    use std::string::String;

    fn known(opcode: Opcode, value: u8) -> Template<()> {
        Template {
            opcode,
            immediate: Immediate::Known(value),
        }
    }

    #[test]
    fn packs_opcode_over_immediate() -> Result<(), EncodeError> {
        let templates = [
            known(Opcode::Push, 0xC),
            known(Opcode::Nand, 0),
            known(Opcode::Jump, 0),
            known(Opcode::Halt, 0),
        ];
        let mut buffer = [0xAAu8; 8];
        let image = encode(templates.iter(), &mut buffer)?;
        assert_eq!(image.as_bytes(), &[0x4C, 0xA0, 0xF0, 0x00]);
        assert_eq!(image.byte_at(1), Some(0xA0));
        assert_eq!(image.byte_at(4), None);
        Ok(())
    }

    #[test]
    fn refuses_pending_placeholder() {
        let templates = [
            known(Opcode::Dup, 0),
            Template {
                opcode: Opcode::Push,
                immediate: Immediate::PendingLabel {
                    label: (),
                    byte: AddressByte::Low,
                    nibble: Nibble::High,
                },
            },
        ];
        let mut buffer = [0u8; 2];
        let err = encode(templates.iter(), &mut buffer).unwrap_err();
        assert_eq!(err, EncodeError::UnresolvedPlaceholder { address: 1 });
    }

    #[test]
    fn refuses_short_buffer() {
        let templates = [known(Opcode::Dup, 0), known(Opcode::Dup, 0)];
        let mut buffer = [0u8; 1];
        let err = encode(templates.iter(), &mut buffer).unwrap_err();
        assert_eq!(err, EncodeError::ImageBufferTooSmall { needed: 2 });
    }

    #[test]
    fn every_byte_decodes_back() {
        for byte in 0..=u8::MAX {
            let instruction = RealInstruction::decode(byte).unwrap();
            assert_eq!(instruction.to_byte(), byte);
        }
    }

    #[test]
    fn writes_bit_lines() {
        let mut text = String::new();
        write_bits(&[0x44, 0x0F], &mut text).unwrap();
        assert_eq!(text, "01000100\n00001111\n");
    }
}
