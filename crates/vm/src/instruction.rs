//! Instruction decoding.

use crate::error::{VmError, VmResult};
use crate::op_code::{OpCode, OperandEncoding};

/// A decoded instruction: opcode, operand bytes and total width.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Position of the opcode byte within the script.
    pub pointer: usize,
    /// The opcode.
    pub opcode: OpCode,
    /// Operand bytes (for prefixed encodings, the payload without the
    /// length prefix).
    pub operand: Vec<u8>,
    /// Total encoded size: opcode byte, any prefix, and the operand.
    pub size: usize,
}

impl Instruction {
    /// Decodes the instruction at `position`.
    pub fn decode(script: &[u8], position: usize) -> VmResult<Self> {
        let &opcode_byte = script
            .get(position)
            .ok_or_else(|| VmError::TruncatedOperand("instruction pointer out of range".into()))?;
        let opcode = OpCode::from_byte(opcode_byte)?;

        let (operand, size) = match opcode.operand_encoding() {
            OperandEncoding::None => (Vec::new(), 1),
            OperandEncoding::Fixed(width) => {
                let start = position + 1;
                let end = start + width;
                if end > script.len() {
                    return Err(VmError::TruncatedOperand(format!(
                        "{opcode:?} needs {width} operand byte(s)"
                    )));
                }
                (script[start..end].to_vec(), 1 + width)
            }
            OperandEncoding::Prefixed(prefix_width) => {
                let start = position + 1;
                let end = start + prefix_width;
                if end > script.len() {
                    return Err(VmError::TruncatedOperand(format!(
                        "{opcode:?} missing length prefix"
                    )));
                }
                let mut length = 0usize;
                for (i, &b) in script[start..end].iter().enumerate() {
                    length |= (b as usize) << (8 * i);
                }
                let data_end = end + length;
                if data_end > script.len() {
                    return Err(VmError::TruncatedOperand(format!(
                        "{opcode:?} data of {length} byte(s) exceeds script"
                    )));
                }
                (script[end..data_end].to_vec(), 1 + prefix_width + length)
            }
        };

        Ok(Self {
            pointer: position,
            opcode,
            operand,
            size,
        })
    }

    /// Operand interpreted as a signed 8-bit jump offset.
    pub fn operand_i8(&self) -> VmResult<i32> {
        match self.operand.as_slice() {
            [b] => Ok(*b as i8 as i32),
            _ => Err(VmError::InvalidOperand("expected 1-byte operand".into())),
        }
    }

    /// Operand interpreted as a signed 32-bit jump offset.
    pub fn operand_i32(&self) -> VmResult<i32> {
        match <[u8; 4]>::try_from(self.operand.as_slice()) {
            Ok(bytes) => Ok(i32::from_le_bytes(bytes)),
            Err(_) => Err(VmError::InvalidOperand("expected 4-byte operand".into())),
        }
    }

    /// Operand interpreted as an unsigned 32-bit value (syscall ids).
    pub fn operand_u32(&self) -> VmResult<u32> {
        match <[u8; 4]>::try_from(self.operand.as_slice()) {
            Ok(bytes) => Ok(u32::from_le_bytes(bytes)),
            Err(_) => Err(VmError::InvalidOperand("expected 4-byte operand".into())),
        }
    }

    /// The two signed offsets of a short `TRY`.
    pub fn operand_try_offsets(&self) -> VmResult<(i32, i32)> {
        match self.operand.as_slice() {
            [catch, finally] => Ok((*catch as i8 as i32, *finally as i8 as i32)),
            _ => Err(VmError::InvalidOperand("expected 2-byte TRY operand".into())),
        }
    }

    /// The two signed offsets of a long `TRY_L`.
    pub fn operand_try_offsets_long(&self) -> VmResult<(i32, i32)> {
        if self.operand.len() != 8 {
            return Err(VmError::InvalidOperand("expected 8-byte TRY_L operand".into()));
        }
        let catch = i32::from_le_bytes(self.operand[..4].try_into().expect("4 bytes"));
        let finally = i32::from_le_bytes(self.operand[4..].try_into().expect("4 bytes"));
        Ok((catch, finally))
    }

    /// The two one-byte counts of `INITSLOT`.
    pub fn operand_two_u8(&self) -> VmResult<(u8, u8)> {
        match self.operand.as_slice() {
            [a, b] => Ok((*a, *b)),
            _ => Err(VmError::InvalidOperand("expected 2-byte operand".into())),
        }
    }

    /// Single-byte operand (slot indices, type tags).
    pub fn operand_u8(&self) -> VmResult<u8> {
        match self.operand.as_slice() {
            [b] => Ok(*b),
            _ => Err(VmError::InvalidOperand("expected 1-byte operand".into())),
        }
    }

    /// Operand interpreted as an unsigned 16-bit value.
    pub fn operand_u16(&self) -> VmResult<u16> {
        match <[u8; 2]>::try_from(self.operand.as_slice()) {
            Ok(bytes) => Ok(u16::from_le_bytes(bytes)),
            Err(_) => Err(VmError::InvalidOperand("expected 2-byte operand".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_opcode() {
        let inst = Instruction::decode(&[0x11], 0).unwrap();
        assert_eq!(inst.opcode, OpCode::Push1);
        assert_eq!(inst.size, 1);
        assert!(inst.operand.is_empty());
    }

    #[test]
    fn decode_pushdata1() {
        let inst = Instruction::decode(&[0x0c, 0x03, 0xaa, 0xbb, 0xcc], 0).unwrap();
        assert_eq!(inst.opcode, OpCode::PushData1);
        assert_eq!(inst.operand, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(inst.size, 5);
    }

    #[test]
    fn decode_pushdata2_length() {
        let mut script = vec![0x0d, 0x00, 0x01];
        script.extend(vec![0u8; 256]);
        let inst = Instruction::decode(&script, 0).unwrap();
        assert_eq!(inst.operand.len(), 256);
        assert_eq!(inst.size, 3 + 256);
    }

    #[test]
    fn truncated_operand_rejected() {
        assert!(Instruction::decode(&[0x0c, 0x05, 0x01], 0).is_err());
        assert!(Instruction::decode(&[0x22], 0).is_err());
        assert!(Instruction::decode(&[], 0).is_err());
    }

    #[test]
    fn jump_offsets_are_signed() {
        let inst = Instruction::decode(&[0x22, 0xfe], 0).unwrap();
        assert_eq!(inst.operand_i8().unwrap(), -2);
    }

    #[test]
    fn try_operands() {
        let inst = Instruction::decode(&[0x3b, 0x05, 0x00], 0).unwrap();
        assert_eq!(inst.operand_try_offsets().unwrap(), (5, 0));
    }
}
