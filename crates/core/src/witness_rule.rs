//! Witness rules: a small condition language over calling context.

use crate::uint160::UInt160;
use oxneo_io::serializable::var_int_size;
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Maximum nesting depth of composite conditions.
pub const MAX_CONDITION_NESTING: usize = 2;
/// Maximum sub-conditions of an `And`/`Or`.
pub const MAX_SUBITEMS: usize = 16;

/// Whether a matching rule admits or rejects the witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessRuleAction {
    Deny = 0,
    Allow = 1,
}

/// A predicate over the current calling context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WitnessCondition {
    /// Constant truth value.
    Boolean(bool),
    /// Negation.
    Not(Box<WitnessCondition>),
    /// All sub-conditions must hold.
    And(Vec<WitnessCondition>),
    /// Any sub-condition must hold.
    Or(Vec<WitnessCondition>),
    /// The current script hash equals the given hash.
    ScriptHash(UInt160),
    /// The current contract belongs to the given group key.
    Group(Vec<u8>),
    /// The current context is the entry script.
    CalledByEntry,
    /// The calling contract equals the given hash.
    CalledByContract(UInt160),
    /// The calling contract belongs to the given group key.
    CalledByGroup(Vec<u8>),
}

impl WitnessCondition {
    const TYPE_BOOLEAN: u8 = 0x00;
    const TYPE_NOT: u8 = 0x01;
    const TYPE_AND: u8 = 0x02;
    const TYPE_OR: u8 = 0x03;
    const TYPE_SCRIPT_HASH: u8 = 0x18;
    const TYPE_GROUP: u8 = 0x19;
    const TYPE_CALLED_BY_ENTRY: u8 = 0x20;
    const TYPE_CALLED_BY_CONTRACT: u8 = 0x28;
    const TYPE_CALLED_BY_GROUP: u8 = 0x29;

    fn type_byte(&self) -> u8 {
        match self {
            WitnessCondition::Boolean(_) => Self::TYPE_BOOLEAN,
            WitnessCondition::Not(_) => Self::TYPE_NOT,
            WitnessCondition::And(_) => Self::TYPE_AND,
            WitnessCondition::Or(_) => Self::TYPE_OR,
            WitnessCondition::ScriptHash(_) => Self::TYPE_SCRIPT_HASH,
            WitnessCondition::Group(_) => Self::TYPE_GROUP,
            WitnessCondition::CalledByEntry => Self::TYPE_CALLED_BY_ENTRY,
            WitnessCondition::CalledByContract(_) => Self::TYPE_CALLED_BY_CONTRACT,
            WitnessCondition::CalledByGroup(_) => Self::TYPE_CALLED_BY_GROUP,
        }
    }

    fn serialize_inner(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.type_byte());
        match self {
            WitnessCondition::Boolean(value) => writer.write_bool(*value),
            WitnessCondition::Not(inner) => inner.serialize_inner(writer)?,
            WitnessCondition::And(subs) | WitnessCondition::Or(subs) => {
                writer.write_var_int(subs.len() as u64);
                for sub in subs {
                    sub.serialize_inner(writer)?;
                }
            }
            WitnessCondition::ScriptHash(hash) | WitnessCondition::CalledByContract(hash) => {
                hash.serialize(writer)?;
            }
            WitnessCondition::Group(key) | WitnessCondition::CalledByGroup(key) => {
                writer.write_bytes(key);
            }
            WitnessCondition::CalledByEntry => {}
        }
        Ok(())
    }

    fn deserialize_inner(reader: &mut MemoryReader<'_>, depth: usize) -> IoResult<Self> {
        let type_byte = reader.read_u8()?;
        match type_byte {
            Self::TYPE_BOOLEAN => Ok(WitnessCondition::Boolean(reader.read_bool()?)),
            Self::TYPE_NOT => {
                if depth == 0 {
                    return Err(IoError::invalid_format("witness condition nested too deep"));
                }
                Ok(WitnessCondition::Not(Box::new(Self::deserialize_inner(
                    reader,
                    depth - 1,
                )?)))
            }
            Self::TYPE_AND | Self::TYPE_OR => {
                if depth == 0 {
                    return Err(IoError::invalid_format("witness condition nested too deep"));
                }
                let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
                if count == 0 {
                    return Err(IoError::invalid_format("empty composite witness condition"));
                }
                let mut subs = Vec::with_capacity(count);
                for _ in 0..count {
                    subs.push(Self::deserialize_inner(reader, depth - 1)?);
                }
                if type_byte == Self::TYPE_AND {
                    Ok(WitnessCondition::And(subs))
                } else {
                    Ok(WitnessCondition::Or(subs))
                }
            }
            Self::TYPE_SCRIPT_HASH => Ok(WitnessCondition::ScriptHash(UInt160::deserialize(
                reader,
            )?)),
            Self::TYPE_GROUP => Ok(WitnessCondition::Group(reader.read_bytes(33)?)),
            Self::TYPE_CALLED_BY_ENTRY => Ok(WitnessCondition::CalledByEntry),
            Self::TYPE_CALLED_BY_CONTRACT => Ok(WitnessCondition::CalledByContract(
                UInt160::deserialize(reader)?,
            )),
            Self::TYPE_CALLED_BY_GROUP => {
                Ok(WitnessCondition::CalledByGroup(reader.read_bytes(33)?))
            }
            other => Err(IoError::invalid_format(format!(
                "unknown witness condition type 0x{other:02x}"
            ))),
        }
    }

    fn inner_size(&self) -> usize {
        1 + match self {
            WitnessCondition::Boolean(_) => 1,
            WitnessCondition::Not(inner) => inner.inner_size(),
            WitnessCondition::And(subs) | WitnessCondition::Or(subs) => {
                var_int_size(subs.len() as u64)
                    + subs.iter().map(WitnessCondition::inner_size).sum::<usize>()
            }
            WitnessCondition::ScriptHash(_) | WitnessCondition::CalledByContract(_) => 20,
            WitnessCondition::Group(key) | WitnessCondition::CalledByGroup(key) => key.len(),
            WitnessCondition::CalledByEntry => 0,
        }
    }
}

/// Context facts a condition is evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct WitnessContext<'a> {
    /// Hash of the currently executing script.
    pub current_script_hash: Option<&'a UInt160>,
    /// Hash of the calling script, if any.
    pub calling_script_hash: Option<&'a UInt160>,
    /// Whether the current context is the entry script.
    pub is_entry: bool,
}

impl WitnessCondition {
    /// Evaluates the condition against the calling context. Group
    /// conditions require manifest data and evaluate to `false` here.
    pub fn matches(&self, ctx: &WitnessContext<'_>) -> bool {
        match self {
            WitnessCondition::Boolean(value) => *value,
            WitnessCondition::Not(inner) => !inner.matches(ctx),
            WitnessCondition::And(subs) => subs.iter().all(|c| c.matches(ctx)),
            WitnessCondition::Or(subs) => subs.iter().any(|c| c.matches(ctx)),
            WitnessCondition::ScriptHash(hash) => ctx.current_script_hash == Some(hash),
            WitnessCondition::CalledByContract(hash) => ctx.calling_script_hash == Some(hash),
            WitnessCondition::CalledByEntry => ctx.is_entry,
            WitnessCondition::Group(_) | WitnessCondition::CalledByGroup(_) => false,
        }
    }
}

/// An (action, condition) pair attached to a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRule {
    pub action: WitnessRuleAction,
    pub condition: WitnessCondition,
}

impl Serializable for WitnessRule {
    fn size(&self) -> usize {
        1 + self.condition.inner_size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.action as u8);
        self.condition.serialize_inner(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let action = match reader.read_u8()? {
            0 => WitnessRuleAction::Deny,
            1 => WitnessRuleAction::Allow,
            other => {
                return Err(IoError::invalid_format(format!(
                    "unknown witness rule action 0x{other:02x}"
                )))
            }
        };
        let condition = WitnessCondition::deserialize_inner(reader, MAX_CONDITION_NESTING)?;
        Ok(Self { action, condition })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_composite() {
        let rule = WitnessRule {
            action: WitnessRuleAction::Allow,
            condition: WitnessCondition::Or(vec![
                WitnessCondition::CalledByEntry,
                WitnessCondition::ScriptHash(UInt160::from_bytes([9u8; 20])),
            ]),
        };
        let bytes = rule.to_bytes().unwrap();
        assert_eq!(bytes.len(), rule.size());
        assert_eq!(WitnessRule::from_bytes(&bytes).unwrap(), rule);
    }

    #[test]
    fn nesting_depth_enforced() {
        // Not(Not(Not(true))) exceeds the depth limit of 2.
        let mut writer = BinaryWriter::new();
        writer.write_u8(1); // allow
        writer.write_u8(0x01);
        writer.write_u8(0x01);
        writer.write_u8(0x01);
        writer.write_u8(0x00);
        writer.write_bool(true);
        assert!(WitnessRule::from_bytes(&writer.into_bytes()).is_err());
    }

    #[test]
    fn evaluation() {
        let entry = WitnessCondition::CalledByEntry;
        let ctx = WitnessContext {
            is_entry: true,
            ..Default::default()
        };
        assert!(entry.matches(&ctx));
        assert!(!WitnessCondition::Not(Box::new(entry)).matches(&ctx));
        assert!(!WitnessCondition::Group(vec![0u8; 33]).matches(&ctx));
    }
}
