use crate::runtime::{arena::ValueRef, types::TypeRef};
use std::fmt;
use std::mem;

/// A concrete parameter value as stored in an arena slot.
///
/// Struct values are stored positionally as [`Value::Tuple`]; member names
/// live on the type descriptor only.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Utf8(String),
    Bytes(Vec<u8>),
    Optional(Option<Box<Value>>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Uint32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::Uint64(_) => "uint64",
            Value::Double(_) => "double",
            Value::Utf8(_) => "utf8",
            Value::Bytes(_) => "bytes",
            Value::Optional(_) => "optional",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Approximate number of bytes this value pins in its arena.
    pub fn footprint(&self) -> usize {
        let heap = match self {
            Value::Utf8(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Optional(Some(inner)) => inner.footprint(),
            Value::List(items) | Value::Tuple(items) => items.iter().map(Value::footprint).sum(),
            _ => 0,
        };
        mem::size_of::<Value>() + heap
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint64(v) => Some(*v),
            Value::Uint32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            Value::Utf8(text) => Some(text.as_bytes()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Uint32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Uint64(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Utf8(v) => write!(f, "{v:?}"),
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Optional(None) => write!(f, "null"),
            Value::Optional(Some(inner)) => write!(f, "{inner}"),
            Value::List(values) | Value::Tuple(values) => {
                let (open, close) = if matches!(self, Value::List(_)) {
                    ("[", "]")
                } else {
                    ("(", ")")
                };
                write!(f, "{open}")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

/// A type descriptor paired with a handle to an arena-resident value.
///
/// Holding a `TypedValue` stands for one reference on the arena slot. APIs that
/// take one by value take over that reference; use
/// [`ArenaGuard::retain`](crate::runtime::arena::ArenaGuard::retain) before
/// handing out a second copy.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedValue {
    pub ty: TypeRef,
    pub value: ValueRef,
}

impl TypedValue {
    pub fn new(ty: TypeRef, value: ValueRef) -> Self {
        Self { ty, value }
    }
}
