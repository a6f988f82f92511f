//! Core types for telemetry data representation.
//!
//! - [`VariableType`] maps to iRacing's `irsdk_VarType` enum with size information
//! - [`VariableInfo`] is one decoded variable descriptor
//! - [`VarBinding`] is a variable validated against a buffer length, with typed reads
//! - [`VarData`] decodes one element with a declared-type check
//! - [`FrameSnapshot`] / [`FramePacket`] carry copied frame buffers
//!
//! ## Usage Example
//!
//! ```rust
//! use ira_telemetry::types::{VarBinding, VariableInfo, VariableType};
//!
//! let rpm = VariableInfo {
//!     name: "RPM".to_string(),
//!     data_type: VariableType::Float32,
//!     offset: 0,
//!     count: 1,
//!     count_as_time: false,
//!     units: "revs/min".to_string(),
//!     description: "Engine rpm".to_string(),
//! };
//!
//! let frame = 4500.0f32.to_le_bytes();
//! let binding = VarBinding::from_info(&rpm, frame.len()).unwrap();
//! assert_eq!(binding.read::<f32>(&frame, 0).unwrap(), 4500.0);
//! ```

mod bitfield;
mod frame;
mod schema;
mod var_data;
mod variable_type;

pub use bitfield::BitField;
pub use frame::{FramePacket, FrameSnapshot};
pub use schema::VariableInfo;
pub use var_data::{
    VarBinding, VarData, element_slice, read_bool, read_double, read_float, read_int,
};
pub use variable_type::{Value, VariableType};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_type() -> impl Strategy<Value = VariableType> {
        prop::sample::select(vec![
            VariableType::Char,
            VariableType::Bool,
            VariableType::Int32,
            VariableType::BitField,
            VariableType::Float32,
            VariableType::Float64,
        ])
    }

    proptest! {
        #[test]
        fn type_tags_round_trip(data_type in any_type()) {
            prop_assert_eq!(VariableType::from_raw(data_type.raw()), Some(data_type));
        }

        #[test]
        fn unknown_type_tags_are_rejected(tag in prop_oneof![i32::MIN..0, 6..i32::MAX]) {
            prop_assert_eq!(VariableType::from_raw(tag), None);
        }
    }

    #[test]
    fn type_sizes_match_sdk_table() {
        let sizes: Vec<usize> =
            (0..6).filter_map(VariableType::from_raw).map(|t| t.size()).collect();
        assert_eq!(sizes, vec![1, 1, 4, 4, 4, 8]);
    }

    #[test]
    fn value_display_is_compact() {
        assert_eq!(Value::Int32(3).to_string(), "3");
        assert_eq!(Value::Float32(1.5).to_string(), "1.500");
        assert_eq!(Value::BitField(BitField(0x10)).to_string(), "0x00000010");
        assert_eq!(Value::Char(b'R').to_string(), "R");
    }
}
