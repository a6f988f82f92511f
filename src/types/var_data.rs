//! Bounds-checked reads of variables out of a frame buffer.
//!
//! Two layers are provided. The free functions [`read_bool`], [`read_int`],
//! [`read_float`] and [`read_double`] take a raw byte offset and element
//! index and return `None` for anything outside the frame. [`VarBinding`]
//! is what callers normally hold: a variable whose extent was checked against
//! the buffer length once, at resolution time, with typed reads that also
//! check the declared element type.

use super::{BitField, Value, VariableInfo, VariableType};
use crate::{Result, TelemetryError};

/// Trait for types that can be decoded from one variable element.
pub trait VarData: Sized {
    /// Decode one element whose declared type is `data_type`. `bytes` holds
    /// exactly `data_type.size()` bytes.
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self>;
}

fn type_mismatch(expected: &str, found: VariableType) -> TelemetryError {
    TelemetryError::TypeConversion { details: format!("Expected {expected}, got {found:?}") }
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| TelemetryError::TypeConversion {
        details: format!("Expected {N} bytes, got {}", bytes.len()),
    })
}

impl VarData for f32 {
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self> {
        match data_type {
            VariableType::Float32 => Ok(f32::from_le_bytes(array(bytes)?)),
            other => Err(type_mismatch("Float32", other)),
        }
    }
}

impl VarData for f64 {
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self> {
        match data_type {
            VariableType::Float64 => Ok(f64::from_le_bytes(array(bytes)?)),
            VariableType::Float32 => Ok(f32::from_le_bytes(array(bytes)?) as f64),
            other => Err(type_mismatch("Float64", other)),
        }
    }
}

impl VarData for i32 {
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self> {
        match data_type {
            VariableType::Int32 | VariableType::BitField => Ok(i32::from_le_bytes(array(bytes)?)),
            other => Err(type_mismatch("Int32", other)),
        }
    }
}

impl VarData for bool {
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self> {
        match data_type {
            VariableType::Bool => Ok(array::<1>(bytes)?[0] != 0),
            other => Err(type_mismatch("Bool", other)),
        }
    }
}

impl VarData for u8 {
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self> {
        match data_type {
            VariableType::Char | VariableType::Bool => Ok(array::<1>(bytes)?[0]),
            other => Err(type_mismatch("Char", other)),
        }
    }
}

impl VarData for BitField {
    fn decode(bytes: &[u8], data_type: VariableType) -> Result<Self> {
        match data_type {
            VariableType::BitField | VariableType::Int32 => {
                Ok(BitField(u32::from_le_bytes(array(bytes)?)))
            }
            other => Err(type_mismatch("BitField", other)),
        }
    }
}

/// Slice of element `index` of a `size`-byte element array starting at `offset`.
pub fn element_slice(frame: &[u8], offset: usize, size: usize, index: usize) -> Option<&[u8]> {
    let start = offset.checked_add(index.checked_mul(size)?)?;
    frame.get(start..start.checked_add(size)?)
}

pub fn read_bool(frame: &[u8], offset: usize, index: usize) -> Option<bool> {
    element_slice(frame, offset, 1, index).map(|bytes| bytes[0] != 0)
}

pub fn read_int(frame: &[u8], offset: usize, index: usize) -> Option<i32> {
    element_slice(frame, offset, 4, index)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i32::from_le_bytes)
}

pub fn read_float(frame: &[u8], offset: usize, index: usize) -> Option<f32> {
    element_slice(frame, offset, 4, index)
        .and_then(|bytes| bytes.try_into().ok())
        .map(f32::from_le_bytes)
}

pub fn read_double(frame: &[u8], offset: usize, index: usize) -> Option<f64> {
    element_slice(frame, offset, 8, index)
        .and_then(|bytes| bytes.try_into().ok())
        .map(f64::from_le_bytes)
}

/// A variable resolved against a specific buffer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarBinding {
    pub offset: usize,
    pub data_type: VariableType,
    pub count: usize,
}

impl VarBinding {
    /// Bind `info`, or `None` when any element would fall outside `buf_len`.
    pub fn from_info(info: &VariableInfo, buf_len: usize) -> Option<Self> {
        if info.count == 0 || !info.fits_within(buf_len) {
            return None;
        }
        Some(Self { offset: info.offset, data_type: info.data_type, count: info.count })
    }

    /// Read element `index` as `T`.
    pub fn read<T: VarData>(&self, frame: &[u8], index: usize) -> Result<T> {
        if index >= self.count {
            return Err(TelemetryError::Memory {
                offset: self.offset + index.saturating_mul(self.data_type.size()),
                source: None,
            });
        }
        let bytes = element_slice(frame, self.offset, self.data_type.size(), index)
            .ok_or(TelemetryError::Memory { offset: self.offset, source: None })?;
        T::decode(bytes, self.data_type)
    }

    /// Read every element as `T`.
    pub fn read_all<T: VarData>(&self, frame: &[u8]) -> Result<Vec<T>> {
        (0..self.count).map(|index| self.read(frame, index)).collect()
    }

    /// Read element `index` as a dynamically typed [`Value`].
    pub fn value(&self, frame: &[u8], index: usize) -> Option<Value> {
        let value = match self.data_type {
            VariableType::Char => Value::Char(self.read(frame, index).ok()?),
            VariableType::Bool => Value::Bool(self.read(frame, index).ok()?),
            VariableType::Int32 => Value::Int32(self.read(frame, index).ok()?),
            VariableType::BitField => Value::BitField(self.read(frame, index).ok()?),
            VariableType::Float32 => Value::Float32(self.read(frame, index).ok()?),
            VariableType::Float64 => Value::Float64(self.read(frame, index).ok()?),
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn info(data_type: VariableType, offset: usize, count: usize) -> VariableInfo {
        VariableInfo {
            name: "Test".to_string(),
            data_type,
            offset,
            count,
            count_as_time: false,
            units: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn raw_accessors_decode_little_endian() {
        let mut frame = vec![0u8; 24];
        frame[0] = 1;
        frame[4..8].copy_from_slice(&(-3i32).to_le_bytes());
        frame[8..12].copy_from_slice(&42.5f32.to_le_bytes());
        frame[16..24].copy_from_slice(&1234.25f64.to_le_bytes());

        assert_eq!(read_bool(&frame, 0, 0), Some(true));
        assert_eq!(read_int(&frame, 4, 0), Some(-3));
        assert_eq!(read_float(&frame, 8, 0), Some(42.5));
        assert_eq!(read_double(&frame, 16, 0), Some(1234.25));
    }

    #[test]
    fn raw_accessors_reject_out_of_range_elements() {
        let frame = vec![0u8; 8];
        assert_eq!(read_int(&frame, 4, 1), None);
        assert_eq!(read_double(&frame, 4, 0), None);
        assert_eq!(read_bool(&frame, usize::MAX, 1), None);
        assert_eq!(read_float(&frame, 0, usize::MAX), None);
    }

    #[test]
    fn binding_is_validated_once_against_buffer_length() {
        assert!(VarBinding::from_info(&info(VariableType::Float32, 60, 1), 64).is_some());
        assert!(VarBinding::from_info(&info(VariableType::Float32, 61, 1), 64).is_none());
        assert!(VarBinding::from_info(&info(VariableType::Int32, 0, 17), 64).is_none());
        assert!(VarBinding::from_info(&info(VariableType::Int32, 0, 0), 64).is_none());
    }

    #[test]
    fn binding_checks_type_and_index() {
        let mut frame = vec![0u8; 16];
        frame[4..8].copy_from_slice(&7i32.to_le_bytes());
        frame[8..12].copy_from_slice(&9i32.to_le_bytes());
        let binding = VarBinding::from_info(&info(VariableType::Int32, 4, 2), 16).unwrap();

        assert_eq!(binding.read::<i32>(&frame, 0).unwrap(), 7);
        assert_eq!(binding.read::<i32>(&frame, 1).unwrap(), 9);
        assert_eq!(binding.read_all::<i32>(&frame).unwrap(), vec![7, 9]);
        assert!(matches!(binding.read::<i32>(&frame, 2), Err(TelemetryError::Memory { .. })));
        assert!(matches!(
            binding.read::<f32>(&frame, 0),
            Err(TelemetryError::TypeConversion { .. })
        ));
        assert_eq!(binding.value(&frame, 1), Some(Value::Int32(9)));
    }

    #[test]
    fn binding_reports_short_frames() {
        let binding = VarBinding::from_info(&info(VariableType::Float64, 8, 1), 16).unwrap();
        let truncated = vec![0u8; 12];
        assert!(binding.read::<f64>(&truncated, 0).is_err());
        assert_eq!(binding.value(&truncated, 0), None);
    }

    #[test]
    fn bitfield_and_char_decoding() {
        let frame = [0x41u8, 0, 0, 0, 0x05, 0, 0, 0x80];
        let flags = VarBinding { offset: 4, data_type: VariableType::BitField, count: 1 };
        let letter = VarBinding { offset: 0, data_type: VariableType::Char, count: 1 };
        let bits: BitField = flags.read(&frame, 0).unwrap();
        assert!(bits.is_set(0) && bits.is_set(2) && bits.is_set(31));
        assert_eq!(letter.read::<u8>(&frame, 0).unwrap(), b'A');
    }

    proptest! {
        #[test]
        fn typed_reads_never_escape_the_frame(
            frame in prop::collection::vec(any::<u8>(), 0..64),
            offset in 0usize..80,
            index in 0usize..20,
        ) {
            // Reads either succeed from inside the slice or return None; they never panic.
            if let Some(v) = read_int(&frame, offset, index) {
                let start = offset + index * 4;
                prop_assert!(start + 4 <= frame.len());
                prop_assert_eq!(v, i32::from_le_bytes(frame[start..start + 4].try_into().unwrap()));
            }
            let _ = read_double(&frame, offset, index);
            let _ = read_bool(&frame, offset, index);
        }
    }
}
