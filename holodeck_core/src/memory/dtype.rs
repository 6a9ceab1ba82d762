//! Element types a shared buffer can hold

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-width numeric element type of a [`SharedBuffer`](super::SharedBuffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I8,
    /// One byte per element, 0 or 1; accessed as `u8`
    Bool,
    U16,
    I16,
    U32,
    I32,
    F32,
    U64,
    I64,
    F64,
}

impl DType {
    /// Native byte width of one element
    pub const fn size(self) -> usize {
        match self {
            DType::U8 | DType::I8 | DType::Bool => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::Bool => "bool",
            DType::U16 => "u16",
            DType::I16 => "i16",
            DType::U32 => "u32",
            DType::I32 => "i32",
            DType::F32 => "f32",
            DType::U64 => "u64",
            DType::I64 => "i64",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "u8" | "uint8" | "byte" => Ok(DType::U8),
            "i8" | "int8" => Ok(DType::I8),
            "bool" => Ok(DType::Bool),
            "u16" | "uint16" => Ok(DType::U16),
            "i16" | "int16" => Ok(DType::I16),
            "u32" | "uint32" => Ok(DType::U32),
            "i32" | "int32" => Ok(DType::I32),
            "f32" | "float32" => Ok(DType::F32),
            "u64" | "uint64" => Ok(DType::U64),
            "i64" | "int64" => Ok(DType::I64),
            "f64" | "float64" => Ok(DType::F64),
            _ => Err(format!("Unknown dtype: {}", s)),
        }
    }
}

/// Rust types that can view a shared buffer's memory
///
/// Implemented for the primitive numeric types; each maps to exactly one
/// [`DType`], except `u8` which also reads `bool` buffers byte-for-byte.
pub trait Element: bytemuck::Pod {
    const DTYPE: DType;

    /// Whether a buffer of `dtype` may be viewed as `[Self]`
    fn accepts(dtype: DType) -> bool {
        dtype == Self::DTYPE
    }
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_element! {
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    u64 => U64,
    i64 => I64,
    f64 => F64,
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;

    fn accepts(dtype: DType) -> bool {
        matches!(dtype, DType::U8 | DType::Bool)
    }
}
