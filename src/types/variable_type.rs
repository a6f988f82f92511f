//! Telemetry variable type definitions

use serde::{Deserialize, Serialize};

use super::BitField;

/// Scalar types a telemetry variable can carry.
/// Maps to iRacing SDK's irsdk_VarType enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    /// 8-bit character (irsdk_char = 0)
    Char,
    /// Boolean byte (irsdk_bool = 1)
    Bool,
    /// 32-bit signed integer (irsdk_int = 2)
    Int32,
    /// 32-bit bitfield (irsdk_bitField = 3)
    BitField,
    /// 32-bit floating point (irsdk_float = 4)
    Float32,
    /// 64-bit floating point (irsdk_double = 5)
    Float64,
}

impl VariableType {
    /// Decode the type tag stored in a variable descriptor.
    pub const fn from_raw(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(VariableType::Char),
            1 => Some(VariableType::Bool),
            2 => Some(VariableType::Int32),
            3 => Some(VariableType::BitField),
            4 => Some(VariableType::Float32),
            5 => Some(VariableType::Float64),
            _ => None,
        }
    }

    /// The tag written into a variable descriptor for this type.
    pub const fn raw(&self) -> i32 {
        match self {
            VariableType::Char => 0,
            VariableType::Bool => 1,
            VariableType::Int32 => 2,
            VariableType::BitField => 3,
            VariableType::Float32 => 4,
            VariableType::Float64 => 5,
        }
    }

    /// Returns the size in bytes of this data type.
    /// Matches the irsdk_VarTypeBytes array from the iRacing SDK.
    pub const fn size(&self) -> usize {
        match self {
            VariableType::Char | VariableType::Bool => 1,
            VariableType::Int32 | VariableType::BitField | VariableType::Float32 => 4,
            VariableType::Float64 => 8,
        }
    }
}

/// Runtime value of a single variable element, for callers that do not know
/// the type up front (dumps, generic displays).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Char(u8),
    Bool(bool),
    Int32(i32),
    BitField(BitField),
    Float32(f32),
    Float64(f64),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Char(c) => write!(f, "{}", *c as char),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::BitField(bits) => write!(f, "{:#010x}", bits.value()),
            Value::Float32(v) => write!(f, "{v:.3}"),
            Value::Float64(v) => write!(f, "{v:.3}"),
        }
    }
}
