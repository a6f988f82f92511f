//! Telemetry variable metadata

use serde::{Deserialize, Serialize};

use super::VariableType;

/// Information about a single telemetry variable, decoded from its descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    /// Variable name as published by the simulator
    pub name: String,
    /// Element type
    pub data_type: VariableType,
    /// Byte offset of element 0 within a data buffer
    pub offset: usize,
    /// Number of elements (1 for scalars)
    pub count: usize,
    /// Elements are successive time samples rather than per-car values
    pub count_as_time: bool,
    /// Unit string
    pub units: String,
    /// Human readable description
    pub description: String,
}

impl VariableInfo {
    /// Total bytes covered by all elements.
    pub fn byte_len(&self) -> usize {
        self.data_type.size().saturating_mul(self.count)
    }

    /// Whether every element lies inside a buffer of `buf_len` bytes.
    pub fn fits_within(&self, buf_len: usize) -> bool {
        self.offset.checked_add(self.byte_len()).is_some_and(|end| end <= buf_len)
    }

    pub fn is_array(&self) -> bool {
        self.count > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(data_type: VariableType, offset: usize, count: usize) -> VariableInfo {
        VariableInfo {
            name: "CarIdxLap".to_string(),
            data_type,
            offset,
            count,
            count_as_time: false,
            units: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn fits_within_checks_the_last_element() {
        let lap = info(VariableType::Int32, 8, 64);
        assert_eq!(lap.byte_len(), 256);
        assert!(lap.fits_within(264));
        assert!(!lap.fits_within(263));
        assert!(lap.is_array());
    }

    #[test]
    fn fits_within_survives_overflowing_offsets() {
        let broken = info(VariableType::Float64, usize::MAX - 2, 1);
        assert!(!broken.fits_within(usize::MAX));
    }
}
