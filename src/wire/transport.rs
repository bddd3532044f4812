//! Binary transport chunks for shipping parameter values between nodes.
//!
//! Layout is little-endian and driven entirely by the chunk's type:
//! fixed-width scalars, `u32` length prefixes for text/bytes and lists,
//! a presence byte for optionals, and tuple/struct members back to back.
//! List items must occupy at least one byte each, which bounds the item
//! count by the payload size.

use crate::runtime::{
    arena::ArenaGuard,
    error::{ParamError, ParamResult},
    types::{DataKind, Type},
    value::{TypedValue, Value},
};
use crate::wire::{
    bridge::{type_from_wire, type_to_wire},
    WireType,
};
use nom::{
    bytes::complete::take,
    combinator::{map, map_res},
    error::ErrorKind,
    multi::length_data,
    number::complete::{le_f64, le_i32, le_i64, le_u32, le_u64, le_u8},
    IResult,
};
use serde::{Deserialize, Serialize};

pub const TRANSPORT_VERSION: u32 = 1;

type DecodeError<'a> = nom::error::Error<&'a [u8]>;
type Decoded<'a, T> = IResult<&'a [u8], T, DecodeError<'a>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportChunk {
    pub transport_version: u32,
    #[serde(rename = "type")]
    pub ty: WireType,
    pub rows: u32,
    pub payload: Vec<u8>,
}

impl TransportChunk {
    pub fn single(ty: &Type, value: &Value) -> ParamResult<Self> {
        let mut payload = Vec::new();
        encode_value(ty, value, &mut payload)?;
        Ok(Self {
            transport_version: TRANSPORT_VERSION,
            ty: type_to_wire(ty),
            rows: 1,
            payload,
        })
    }
}

/// Rebuilds a value shipped by [`TransportChunk::single`] inside the bound arena.
pub fn decode_transport(guard: &mut ArenaGuard, chunk: &TransportChunk) -> ParamResult<TypedValue> {
    if chunk.transport_version != TRANSPORT_VERSION {
        return Err(ParamError::Transport {
            message: format!(
                "unsupported transport version {}",
                chunk.transport_version
            ),
        });
    }
    if chunk.rows != 1 {
        return Err(ParamError::Transport {
            message: format!("parameter chunk carries {} rows, expected 1", chunk.rows),
        });
    }
    let ty = type_from_wire(guard.types(), &chunk.ty);
    let value = decode_value(&ty, &chunk.payload)?;
    let handle = guard.alloc(value)?;
    Ok(TypedValue::new(ty, handle))
}

pub fn encode_value(ty: &Type, value: &Value, out: &mut Vec<u8>) -> ParamResult<()> {
    match (ty, value) {
        (Type::Data(kind), value) => encode_data(*kind, value, out)?,
        (Type::Optional(_), Value::Optional(None)) => out.push(0),
        (Type::Optional(item), Value::Optional(Some(inner))) => {
            out.push(1);
            encode_value(item, inner, out)?;
        }
        (Type::List(item), Value::List(items)) => {
            if min_width(item) == 0 {
                return Err(ParamError::Transport {
                    message: format!("list items of type {item} have no encoded width"),
                });
            }
            out.extend_from_slice(&length_prefix(items.len())?.to_le_bytes());
            for value in items {
                encode_value(item, value, out)?;
            }
        }
        (Type::Tuple(elements), Value::Tuple(items)) if elements.len() == items.len() => {
            for (ty, value) in elements.iter().zip(items) {
                encode_value(ty, value, out)?;
            }
        }
        (Type::Struct(members), Value::Tuple(items)) if members.len() == items.len() => {
            for ((_, ty), value) in members.iter().zip(items) {
                encode_value(ty, value, out)?;
            }
        }
        (ty, value) => {
            return Err(ParamError::mismatch(format!(
                "cannot encode {} as {ty}",
                value.type_name()
            )))
        }
    }
    Ok(())
}

fn encode_data(kind: DataKind, value: &Value, out: &mut Vec<u8>) -> ParamResult<()> {
    match (kind, value) {
        (DataKind::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        (DataKind::Int32, Value::Int32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataKind::Uint32, Value::Uint32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataKind::Int64, Value::Int64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataKind::Uint64, Value::Uint64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataKind::Double, Value::Double(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (DataKind::Utf8, Value::Utf8(text)) => {
            out.extend_from_slice(&length_prefix(text.len())?.to_le_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        (DataKind::String, Value::Bytes(bytes)) => {
            out.extend_from_slice(&length_prefix(bytes.len())?.to_le_bytes());
            out.extend_from_slice(bytes);
        }
        (DataKind::Uuid, Value::Bytes(bytes)) if bytes.len() == 16 => out.extend_from_slice(bytes),
        (kind, value) => {
            return Err(ParamError::mismatch(format!(
                "cannot encode {} as {}",
                value.type_name(),
                kind.name()
            )))
        }
    }
    Ok(())
}

/// Smallest number of payload bytes any value of `ty` encodes to.
fn min_width(ty: &Type) -> usize {
    match ty {
        Type::Data(DataKind::Bool) => 1,
        Type::Data(DataKind::Int32 | DataKind::Uint32) => 4,
        Type::Data(DataKind::Int64 | DataKind::Uint64 | DataKind::Double) => 8,
        Type::Data(DataKind::Utf8 | DataKind::String) => 4,
        Type::Data(DataKind::Uuid) => 16,
        Type::Optional(_) => 1,
        Type::List(_) => 4,
        Type::Tuple(elements) => elements.iter().map(|t| min_width(t)).sum(),
        Type::Struct(members) => members.iter().map(|(_, t)| min_width(t)).sum(),
    }
}

fn length_prefix(len: usize) -> ParamResult<u32> {
    u32::try_from(len).map_err(|_| ParamError::mismatch(format!("length {len} exceeds u32")))
}

pub fn decode_value(ty: &Type, payload: &[u8]) -> ParamResult<Value> {
    match parse_value(ty, payload) {
        Ok(([], value)) => Ok(value),
        Ok((rest, _)) => Err(ParamError::Transport {
            message: format!("{} trailing bytes after {ty}", rest.len()),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParamError::Transport {
            message: format!("truncated payload for {ty}"),
        }),
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => Err(ParamError::Transport {
            message: format!(
                "malformed payload for {ty} at offset {} ({:?})",
                payload.len() - err.input.len(),
                err.code
            ),
        }),
    }
}

fn parse_value<'a>(ty: &Type, input: &'a [u8]) -> Decoded<'a, Value> {
    match ty {
        Type::Data(kind) => parse_data(*kind, input),
        Type::Optional(item) => {
            let (input, present) = parse_flag(input)?;
            if !present {
                return Ok((input, Value::Optional(None)));
            }
            let (input, inner) = parse_value(item, input)?;
            Ok((input, Value::Optional(Some(Box::new(inner)))))
        }
        Type::List(item) => {
            let (mut input, count) = le_u32::<_, DecodeError<'a>>(input)?;
            let count = count as usize;
            let width = min_width(item);
            if width == 0 || count > input.len() / width {
                return Err(nom::Err::Failure(DecodeError::new(input, ErrorKind::TooLarge)));
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let (rest, value) = parse_value(item, input)?;
                items.push(value);
                input = rest;
            }
            Ok((input, Value::List(items)))
        }
        Type::Tuple(elements) => parse_items(elements.iter().map(|t| &**t), input),
        Type::Struct(members) => parse_items(members.iter().map(|(_, t)| &**t), input),
    }
}

fn parse_items<'a, 't>(
    types: impl Iterator<Item = &'t Type>,
    mut input: &'a [u8],
) -> Decoded<'a, Value> {
    let mut items = Vec::new();
    for ty in types {
        let (rest, value) = parse_value(ty, input)?;
        items.push(value);
        input = rest;
    }
    Ok((input, Value::Tuple(items)))
}

fn parse_flag(input: &[u8]) -> Decoded<'_, bool> {
    map_res(le_u8, |byte| match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(()),
    })(input)
}

fn parse_data(kind: DataKind, input: &[u8]) -> Decoded<'_, Value> {
    match kind {
        DataKind::Bool => map(parse_flag, Value::Bool)(input),
        DataKind::Int32 => map(le_i32, Value::Int32)(input),
        DataKind::Uint32 => map(le_u32, Value::Uint32)(input),
        DataKind::Int64 => map(le_i64, Value::Int64)(input),
        DataKind::Uint64 => map(le_u64, Value::Uint64)(input),
        DataKind::Double => map(le_f64, Value::Double)(input),
        DataKind::Utf8 => map_res(length_data(le_u32), |bytes: &[u8]| {
            std::str::from_utf8(bytes).map(|text| Value::Utf8(text.to_owned()))
        })(input),
        DataKind::String => map(length_data(le_u32), |bytes: &[u8]| {
            Value::Bytes(bytes.to_vec())
        })(input),
        DataKind::Uuid => map(take(16usize), |bytes: &[u8]| Value::Bytes(bytes.to_vec()))(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{arena::Arena, types::TypeEnv};

    #[test]
    fn uint64_payload_is_little_endian() {
        let chunk =
            TransportChunk::single(&Type::Data(DataKind::Uint64), &Value::Uint64(42)).expect("encode");
        assert_eq!(chunk.payload, vec![42, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(chunk.ty, WireType::Data(DataKind::Uint64));
        assert_eq!(chunk.rows, 1);
    }

    #[test]
    fn decodes_structured_value() {
        let mut env = TypeEnv::new();
        let name = env.utf8();
        let maybe_id = {
            let id = env.int32();
            env.optional(id)
        };
        let item = env.tuple(vec![name, maybe_id]);
        let ty = env.list(item);
        let value = Value::List(vec![
            Value::Tuple(vec![
                Value::Utf8("ä".into()),
                Value::Optional(Some(Box::new(Value::Int32(-3)))),
            ]),
            Value::Tuple(vec![Value::Utf8(String::new()), Value::Optional(None)]),
        ]);
        let mut payload = Vec::new();
        encode_value(&ty, &value, &mut payload).expect("encode");
        assert_eq!(decode_value(&ty, &payload).expect("decode"), value);
    }

    #[test]
    fn truncated_and_padded_payloads_are_rejected() {
        let ty = Type::Data(DataKind::Uint32);
        assert!(matches!(
            decode_value(&ty, &[1, 0]),
            Err(ParamError::Transport { .. })
        ));
        assert!(matches!(
            decode_value(&ty, &[1, 0, 0, 0, 9]),
            Err(ParamError::Transport { .. })
        ));
    }

    #[test]
    fn invalid_presence_flag_is_rejected() {
        let mut env = TypeEnv::new();
        let item = env.uint32();
        let ty = env.optional(item);
        let err = decode_value(&ty, &[7, 1, 0, 0, 0]).expect_err("bad flag");
        assert!(matches!(err, ParamError::Transport { .. }));
    }

    #[test]
    fn list_count_is_bounded_by_payload() {
        let mut env = TypeEnv::new();
        let item = env.uint64();
        let ty = env.list(item);
        let mut payload = 3u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0; 16]);
        let err = decode_value(&ty, &payload).expect_err("three items need 24 bytes");
        assert!(matches!(err, ParamError::Transport { .. }));
    }

    #[test]
    fn zero_width_list_items_are_refused() {
        let mut env = TypeEnv::new();
        let item = env.tuple(Vec::new());
        let ty = env.list(item);
        let err = decode_value(&ty, &20_000_000u32.to_le_bytes()).expect_err("unbounded count");
        assert!(matches!(err, ParamError::Transport { .. }));
        let mut payload = Vec::new();
        let encoded = encode_value(&ty, &Value::List(vec![Value::Tuple(Vec::new())]), &mut payload);
        assert!(matches!(encoded, Err(ParamError::Transport { .. })));
    }

    #[test]
    fn chunk_rebuilds_value_in_arena() {
        let arena = Arena::new(None);
        let mut guard = arena.bind().expect("bind");
        let chunk = TransportChunk::single(
            &Type::Data(DataKind::Uuid),
            &Value::Bytes((0u8..16).collect()),
        )
        .expect("encode");
        let typed = decode_transport(&mut guard, &chunk).expect("decode");
        assert_eq!(typed.ty.data_kind(), Some(DataKind::Uuid));
        assert_eq!(
            guard.value(typed.value).expect("live"),
            &Value::Bytes((0u8..16).collect())
        );

        let stale = TransportChunk {
            transport_version: 9,
            ..chunk
        };
        assert!(decode_transport(&mut guard, &stale).is_err());
    }
}
