//! Variable descriptor table
//!
//! Each descriptor follows the C structure layout from the iRacing SDK:
//! ```c
//! typedef struct irsdk_varHeader
//! {
//!     int type;                           // irsdk_VarType enum value
//!     int offset;                         // offset in bytes from buffer start
//!     int count;                          // number of elements (1 for scalar)
//!     bool countAsTime;                   // 1 byte
//!     char pad[3];
//!     char name[IRSDK_MAX_STRING];        // 32 bytes
//!     char desc[IRSDK_MAX_DESC];          // 64 bytes
//!     char unit[IRSDK_MAX_STRING];        // 32 bytes
//! } irsdk_varHeader;
//! ```
//!
//! `numVars` descriptors of 144 bytes each start at `varHeaderOffset`.
//! [`VariableDirectory`] keeps them in table order and answers name lookups
//! by linear scan with exact matching. The table is small (a few hundred
//! entries) and is rebuilt whenever a new producer is attached.

use crate::region::SharedRegion;
use crate::schema::SharedHeader;
use crate::types::{VarBinding, VariableInfo, VariableType};
use crate::{Result, TelemetryError};
use tracing::{debug, warn};

/// Size of name and unit fields
pub const IRSDK_MAX_STRING: usize = 32;
/// Size of the description field
pub const IRSDK_MAX_DESC: usize = 64;
/// Size of one descriptor in bytes
pub const VAR_HEADER_SIZE: usize = std::mem::size_of::<VarHeader>();

/// Variable descriptor matching the C SDK layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarHeader {
    /// Variable type tag (irsdk_VarType)
    pub var_type: i32,
    /// Offset in bytes from buffer start
    pub offset: i32,
    /// Number of elements (1 for scalar, >1 for arrays)
    pub count: i32,
    /// Whether the count represents time samples
    pub count_as_time: u8,
    pub pad: [u8; 3],
    /// NUL-terminated name
    pub name: [u8; IRSDK_MAX_STRING],
    /// NUL-terminated description
    pub desc: [u8; IRSDK_MAX_DESC],
    /// NUL-terminated unit
    pub unit: [u8; IRSDK_MAX_STRING],
}

fn fixed_string<const N: usize>(text: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let len = text.len().min(N - 1);
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
    field
}

/// Decode a NUL-terminated fixed field as ISO-8859-1.
pub(crate) fn c_field_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| b as char).collect()
}

impl VarHeader {
    /// Descriptor with an arbitrary type tag and extent.
    pub fn raw(var_type: i32, offset: i32, count: i32, name: &str) -> Self {
        Self {
            var_type,
            offset,
            count,
            count_as_time: 0,
            pad: [0; 3],
            name: fixed_string(name),
            desc: [0; IRSDK_MAX_DESC],
            unit: [0; IRSDK_MAX_STRING],
        }
    }

    /// Descriptor describing `info`. Strings longer than their field are truncated.
    pub fn from_info(info: &VariableInfo) -> Self {
        Self {
            var_type: info.data_type.raw(),
            offset: info.offset as i32,
            count: info.count as i32,
            count_as_time: u8::from(info.count_as_time),
            pad: [0; 3],
            name: fixed_string(&info.name),
            desc: fixed_string(&info.description),
            unit: fixed_string(&info.units),
        }
    }

    /// Read one descriptor from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < VAR_HEADER_SIZE {
            return Err(TelemetryError::Memory { offset: bytes.len(), source: None });
        }
        // Safety: length checked above; VarHeader is plain integer data.
        Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const VarHeader) })
    }

    pub fn to_bytes(&self) -> [u8; VAR_HEADER_SIZE] {
        let mut bytes = [0u8; VAR_HEADER_SIZE];
        // Safety: VarHeader is repr(C) without implicit padding.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self as *const VarHeader as *const u8,
                bytes.as_mut_ptr(),
                VAR_HEADER_SIZE,
            );
        }
        bytes
    }

    pub fn name(&self) -> String {
        c_field_to_string(&self.name)
    }

    /// Decode into [`VariableInfo`], rejecting unknown types and negative extents.
    pub fn to_variable_info(&self) -> Result<VariableInfo> {
        let data_type = VariableType::from_raw(self.var_type).ok_or_else(|| TelemetryError::Parse {
            context: "Variable header validation".to_string(),
            details: format!("Unknown variable type tag: {}", self.var_type),
        })?;
        let offset = usize::try_from(self.offset).map_err(|_| TelemetryError::Parse {
            context: "Variable header validation".to_string(),
            details: format!("Negative offset: {}", self.offset),
        })?;
        let count = usize::try_from(self.count).map_err(|_| TelemetryError::Parse {
            context: "Variable header validation".to_string(),
            details: format!("Negative element count: {}", self.count),
        })?;

        Ok(VariableInfo {
            name: self.name(),
            data_type,
            offset,
            count,
            count_as_time: self.count_as_time != 0,
            units: c_field_to_string(&self.unit),
            description: c_field_to_string(&self.desc),
        })
    }
}

/// Decoded variable descriptors for one attached producer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableDirectory {
    variables: Vec<VariableInfo>,
    buf_len: usize,
}

impl VariableDirectory {
    /// Decode `num_vars` descriptors from a contiguous table.
    ///
    /// Descriptors that do not decode are skipped with a warning; the
    /// remaining ones keep their relative order.
    pub fn from_table(table: &[u8], num_vars: usize, buf_len: usize) -> Result<Self> {
        let needed = num_vars
            .checked_mul(VAR_HEADER_SIZE)
            .ok_or(TelemetryError::Memory { offset: usize::MAX, source: None })?;
        if table.len() < needed {
            return Err(TelemetryError::Memory { offset: needed, source: None });
        }

        let mut variables = Vec::with_capacity(num_vars);
        for (index, chunk) in table[..needed].chunks_exact(VAR_HEADER_SIZE).enumerate() {
            match VarHeader::parse(chunk).and_then(|header| header.to_variable_info()) {
                Ok(info) if !info.name.is_empty() => variables.push(info),
                Ok(_) => debug!(index, "Skipping unnamed variable descriptor"),
                Err(e) => warn!(error = %e, index, "Skipping malformed variable descriptor"),
            }
        }

        debug!(num_vars, parsed = variables.len(), buf_len, "Built variable directory");
        Ok(Self { variables, buf_len })
    }

    /// Read the descriptor table described by `header` from `region`.
    pub fn load<R: SharedRegion + ?Sized>(region: &R, header: &SharedHeader) -> Result<Self> {
        header.validate()?;
        let num_vars = header.num_vars as usize;
        let buf_len = header.buf_len as usize;
        let offset = header.var_header_offset as usize;
        let table_len = num_vars
            .checked_mul(VAR_HEADER_SIZE)
            .ok_or_else(|| TelemetryError::memory_access_error(offset))?;
        region.check_range(offset, table_len)?;
        let mut table = vec![0u8; table_len];
        region.read_bytes(offset, &mut table)?;
        Self::from_table(&table, num_vars, buf_len)
    }

    /// Position of `name` in the table.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    /// Byte offset of `name` within a data buffer.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.find(name).map(|v| v.offset)
    }

    pub fn find(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&VariableInfo> {
        self.variables.get(index)
    }

    /// Resolve `name` to a binding whose extent fits the buffer.
    pub fn binding(&self, name: &str) -> Option<VarBinding> {
        let info = self.find(name)?;
        let binding = VarBinding::from_info(info, self.buf_len);
        if binding.is_none() {
            warn!(
                name,
                offset = info.offset,
                count = info.count,
                buf_len = self.buf_len,
                "Variable extends past the data buffer"
            );
        }
        binding
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableInfo> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Length of each data buffer the offsets refer to.
    pub fn buffer_len(&self) -> usize {
        self.buf_len
    }
}
