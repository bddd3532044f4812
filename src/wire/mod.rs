//! Wire representation of parameters and the bridge between it and
//! arena-resident values.

pub mod bridge;
pub mod transport;

use crate::runtime::types::DataKind;
use serde::{Deserialize, Serialize};

pub use bridge::{SerializationBridge, WireBridge};
pub use transport::{decode_transport, TransportChunk, TRANSPORT_VERSION};

/// Self-describing type tree as exchanged with clients and other nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    Data(DataKind),
    Optional(Box<WireType>),
    List(Box<WireType>),
    Tuple(Vec<WireType>),
    Struct(Vec<WireMember>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: WireType,
}

/// Encoded value; its interpretation is driven by the accompanying [`WireType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Null,
    Nested(Box<WireValue>),
    Items(Vec<WireValue>),
}

impl WireValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Bool(_) => "bool",
            WireValue::Int32(_) => "int32",
            WireValue::Uint32(_) => "uint32",
            WireValue::Int64(_) => "int64",
            WireValue::Uint64(_) => "uint64",
            WireValue::Double(_) => "double",
            WireValue::Text(_) => "text",
            WireValue::Bytes(_) => "bytes",
            WireValue::Null => "null",
            WireValue::Nested(_) => "nested",
            WireValue::Items(_) => "items",
        }
    }
}

/// A (type, value) pair in wire form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireParam {
    #[serde(rename = "type")]
    pub ty: WireType,
    pub value: WireValue,
}

impl WireParam {
    pub fn new(ty: WireType, value: WireValue) -> Self {
        Self { ty, value }
    }

    pub fn data(kind: DataKind, value: WireValue) -> Self {
        Self::new(WireType::Data(kind), value)
    }
}
