//! Incremental script construction.

use crate::op_code::OpCode;
use crate::stack_item::bigint_to_le;
use num_bigint::BigInt;

/// Builds scripts opcode by opcode; used by witness construction, tests
/// and the syscall invocation helpers.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bare opcode.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.script.push(opcode as u8);
        self
    }

    /// Appends an opcode with raw operand bytes.
    pub fn emit_with(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.script.push(opcode as u8);
        self.script.extend_from_slice(operand);
        self
    }

    /// Pushes an integer with the smallest encoding.
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> &mut Self {
        let value: BigInt = value.into();
        if let Ok(small) = i64::try_from(&value) {
            if (-1..=16).contains(&small) {
                let opcode = if small == -1 {
                    OpCode::PushM1 as u8
                } else {
                    OpCode::Push0 as u8 + small as u8
                };
                self.script.push(opcode);
                return self;
            }
        }
        let bytes = bigint_to_le(&value);
        let (opcode, width) = match bytes.len() {
            0..=1 => (OpCode::PushInt8, 1),
            2 => (OpCode::PushInt16, 2),
            3..=4 => (OpCode::PushInt32, 4),
            5..=8 => (OpCode::PushInt64, 8),
            9..=16 => (OpCode::PushInt128, 16),
            _ => (OpCode::PushInt256, 32),
        };
        self.script.push(opcode as u8);
        let sign_extension = if value.sign() == num_bigint::Sign::Minus {
            0xff
        } else {
            0x00
        };
        let mut padded = bytes;
        padded.resize(width, sign_extension);
        self.script.extend_from_slice(&padded);
        self
    }

    /// Pushes a boolean.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PushT } else { OpCode::PushF })
    }

    /// Pushes byte data with the smallest `PUSHDATA` form.
    pub fn emit_push_data(&mut self, data: &[u8]) -> &mut Self {
        if data.len() < 0x100 {
            self.script.push(OpCode::PushData1 as u8);
            self.script.push(data.len() as u8);
        } else if data.len() < 0x1_0000 {
            self.script.push(OpCode::PushData2 as u8);
            self.script
                .extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else {
            self.script.push(OpCode::PushData4 as u8);
            self.script
                .extend_from_slice(&(data.len() as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    /// Appends a `SYSCALL` with the given id.
    pub fn emit_syscall(&mut self, id: u32) -> &mut Self {
        self.script.push(OpCode::Syscall as u8);
        self.script.extend_from_slice(&id.to_le_bytes());
        self
    }

    /// The bytes built so far.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.script.clone()
    }

    /// Consumes the builder.
    pub fn into_bytes(self) -> Vec<u8> {
        self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_use_push_opcodes() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(0).emit_push_int(16).emit_push_int(-1);
        assert_eq!(builder.to_bytes(), vec![0x10, 0x20, 0x0f]);
    }

    #[test]
    fn larger_ints_use_pushint() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(100);
        assert_eq!(builder.to_bytes(), vec![0x00, 100]);

        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(-300);
        assert_eq!(builder.to_bytes(), vec![0x01, 0xd4, 0xfe]);
    }

    #[test]
    fn pushdata_selects_smallest_form() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_data(&[0xab; 3]);
        assert_eq!(builder.to_bytes()[..2], [0x0c, 3]);

        let mut builder = ScriptBuilder::new();
        builder.emit_push_data(&vec![0u8; 300]);
        assert_eq!(builder.to_bytes()[0], 0x0d);
    }

    #[test]
    fn syscall_encoding() {
        let mut builder = ScriptBuilder::new();
        builder.emit_syscall(0x1234_5678);
        assert_eq!(builder.to_bytes(), vec![0x41, 0x78, 0x56, 0x34, 0x12]);
    }
}
