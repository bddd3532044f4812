use crate::runtime::{
    arena::ArenaGuard,
    error::{ParamError, ParamResult},
    types::{DataKind, Type, TypeEnv, TypeRef},
    value::{TypedValue, Value},
};
use crate::wire::{
    transport::TransportChunk,
    WireMember, WireParam, WireType, WireValue,
};

/// Conversion between arena-resident values and their wire forms.
pub trait SerializationBridge: Send + Sync {
    /// Decodes `param` into a freshly allocated value owned by the caller.
    fn import(&self, guard: &mut ArenaGuard, param: &WireParam) -> ParamResult<TypedValue>;

    fn export(&self, guard: &ArenaGuard, value: &TypedValue) -> ParamResult<WireParam>;

    /// Produces the self-describing chunk used to ship a parameter to other nodes.
    fn serialize_param_value(
        &self,
        guard: &ArenaGuard,
        value: &TypedValue,
    ) -> ParamResult<TransportChunk>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WireBridge;

impl SerializationBridge for WireBridge {
    fn import(&self, guard: &mut ArenaGuard, param: &WireParam) -> ParamResult<TypedValue> {
        let ty = type_from_wire(guard.types(), &param.ty);
        let value = value_from_wire(&ty, &param.value)?;
        let handle = guard.alloc(value)?;
        Ok(TypedValue::new(ty, handle))
    }

    fn export(&self, guard: &ArenaGuard, value: &TypedValue) -> ParamResult<WireParam> {
        let stored = guard.value(value.value)?;
        Ok(WireParam::new(
            type_to_wire(&value.ty),
            value_to_wire(&value.ty, stored)?,
        ))
    }

    fn serialize_param_value(
        &self,
        guard: &ArenaGuard,
        value: &TypedValue,
    ) -> ParamResult<TransportChunk> {
        let stored = guard.value(value.value)?;
        TransportChunk::single(&value.ty, stored)
    }
}

pub fn type_to_wire(ty: &Type) -> WireType {
    match ty {
        Type::Data(kind) => WireType::Data(*kind),
        Type::Optional(item) => WireType::Optional(Box::new(type_to_wire(item))),
        Type::List(item) => WireType::List(Box::new(type_to_wire(item))),
        Type::Tuple(elements) => WireType::Tuple(elements.iter().map(|t| type_to_wire(t)).collect()),
        Type::Struct(members) => WireType::Struct(
            members
                .iter()
                .map(|(name, ty)| WireMember {
                    name: name.clone(),
                    ty: type_to_wire(ty),
                })
                .collect(),
        ),
    }
}

pub fn type_from_wire(env: &mut TypeEnv, wire: &WireType) -> TypeRef {
    match wire {
        WireType::Data(kind) => env.data(*kind),
        WireType::Optional(item) => {
            let item = type_from_wire(env, item);
            env.optional(item)
        }
        WireType::List(item) => {
            let item = type_from_wire(env, item);
            env.list(item)
        }
        WireType::Tuple(elements) => {
            let elements = elements.iter().map(|t| type_from_wire(env, t)).collect();
            env.tuple(elements)
        }
        WireType::Struct(members) => {
            let members = members
                .iter()
                .map(|member| (member.name.clone(), type_from_wire(env, &member.ty)))
                .collect();
            env.structure(members)
        }
    }
}

pub fn value_from_wire(ty: &Type, wire: &WireValue) -> ParamResult<Value> {
    let value = match (ty, wire) {
        (Type::Data(kind), wire) => data_from_wire(*kind, wire)?,
        (Type::Optional(_), WireValue::Null) => Value::Optional(None),
        (Type::Optional(item), WireValue::Nested(inner)) => {
            Value::Optional(Some(Box::new(value_from_wire(item, inner)?)))
        }
        (Type::Optional(item), wire) => Value::Optional(Some(Box::new(value_from_wire(item, wire)?))),
        (Type::List(item), WireValue::Items(items)) => Value::List(
            items
                .iter()
                .map(|wire| value_from_wire(item, wire))
                .collect::<ParamResult<_>>()?,
        ),
        (Type::Tuple(elements), WireValue::Items(items)) => {
            Value::Tuple(items_from_wire(ty, elements.iter().map(|t| &**t), items)?)
        }
        (Type::Struct(members), WireValue::Items(items)) => Value::Tuple(items_from_wire(
            ty,
            members.iter().map(|(_, t)| &**t),
            items,
        )?),
        (ty, wire) => return Err(unexpected(ty, wire.kind_name())),
    };
    Ok(value)
}

fn items_from_wire<'t>(
    ty: &Type,
    types: impl ExactSizeIterator<Item = &'t Type>,
    items: &[WireValue],
) -> ParamResult<Vec<Value>> {
    if types.len() != items.len() {
        return Err(ParamError::mismatch(format!(
            "{ty} expects {} items, got {}",
            types.len(),
            items.len()
        )));
    }
    types
        .zip(items)
        .map(|(ty, wire)| value_from_wire(ty, wire))
        .collect()
}

fn data_from_wire(kind: DataKind, wire: &WireValue) -> ParamResult<Value> {
    let value = match (kind, wire) {
        (DataKind::Bool, WireValue::Bool(v)) => Value::Bool(*v),
        (DataKind::Int32, WireValue::Int32(v)) => Value::Int32(*v),
        (DataKind::Uint32, WireValue::Uint32(v)) => Value::Uint32(*v),
        (DataKind::Int64, WireValue::Int64(v)) => Value::Int64(*v),
        (DataKind::Uint64, WireValue::Uint64(v)) => Value::Uint64(*v),
        (DataKind::Double, WireValue::Double(v)) => Value::Double(*v),
        (DataKind::Utf8, WireValue::Text(v)) => Value::Utf8(v.clone()),
        (DataKind::String, WireValue::Bytes(v)) => Value::Bytes(v.clone()),
        (DataKind::Uuid, WireValue::Bytes(v)) if v.len() == 16 => Value::Bytes(v.clone()),
        (DataKind::Uuid, WireValue::Bytes(v)) => {
            return Err(ParamError::mismatch(format!(
                "Uuid needs 16 bytes, got {}",
                v.len()
            )))
        }
        (kind, wire) => return Err(unexpected(&Type::Data(kind), wire.kind_name())),
    };
    Ok(value)
}

pub fn value_to_wire(ty: &Type, value: &Value) -> ParamResult<WireValue> {
    let wire = match (ty, value) {
        (Type::Data(kind), value) => data_to_wire(*kind, value)?,
        (Type::Optional(_), Value::Optional(None)) => WireValue::Null,
        (Type::Optional(item), Value::Optional(Some(inner))) => {
            let inner_wire = value_to_wire(item, inner)?;
            if matches!(&**item, Type::Optional(_)) {
                WireValue::Nested(Box::new(inner_wire))
            } else {
                inner_wire
            }
        }
        (Type::List(item), Value::List(items)) => WireValue::Items(
            items
                .iter()
                .map(|value| value_to_wire(item, value))
                .collect::<ParamResult<_>>()?,
        ),
        (Type::Tuple(elements), Value::Tuple(items)) if elements.len() == items.len() => {
            WireValue::Items(
                elements
                    .iter()
                    .zip(items)
                    .map(|(ty, value)| value_to_wire(ty, value))
                    .collect::<ParamResult<_>>()?,
            )
        }
        (Type::Struct(members), Value::Tuple(items)) if members.len() == items.len() => {
            WireValue::Items(
                members
                    .iter()
                    .zip(items)
                    .map(|((_, ty), value)| value_to_wire(ty, value))
                    .collect::<ParamResult<_>>()?,
            )
        }
        (ty, value) => return Err(unexpected(ty, value.type_name())),
    };
    Ok(wire)
}

fn data_to_wire(kind: DataKind, value: &Value) -> ParamResult<WireValue> {
    let wire = match (kind, value) {
        (DataKind::Bool, Value::Bool(v)) => WireValue::Bool(*v),
        (DataKind::Int32, Value::Int32(v)) => WireValue::Int32(*v),
        (DataKind::Uint32, Value::Uint32(v)) => WireValue::Uint32(*v),
        (DataKind::Int64, Value::Int64(v)) => WireValue::Int64(*v),
        (DataKind::Uint64, Value::Uint64(v)) => WireValue::Uint64(*v),
        (DataKind::Double, Value::Double(v)) => WireValue::Double(*v),
        (DataKind::Utf8, Value::Utf8(v)) => WireValue::Text(v.clone()),
        (DataKind::String | DataKind::Uuid, Value::Bytes(v)) => WireValue::Bytes(v.clone()),
        (kind, value) => return Err(unexpected(&Type::Data(kind), value.type_name())),
    };
    Ok(wire)
}

fn unexpected(ty: &Type, found: &str) -> ParamError {
    ParamError::mismatch(format!("expected {ty}, got {found}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::arena::Arena;

    fn row_param() -> WireParam {
        WireParam::new(
            WireType::List(Box::new(WireType::Struct(vec![
                WireMember {
                    name: "id".into(),
                    ty: WireType::Data(DataKind::Uint64),
                },
                WireMember {
                    name: "tag".into(),
                    ty: WireType::Optional(Box::new(WireType::Data(DataKind::Utf8))),
                },
            ]))),
            WireValue::Items(vec![
                WireValue::Items(vec![WireValue::Uint64(1), WireValue::Text("a".into())]),
                WireValue::Items(vec![WireValue::Uint64(2), WireValue::Null]),
            ]),
        )
    }

    #[test]
    fn import_then_export_preserves_structured_param() {
        let arena = Arena::new(None);
        let mut guard = arena.bind().expect("bind");
        let param = row_param();
        let typed = WireBridge.import(&mut guard, &param).expect("import");
        assert_eq!(
            typed.ty.to_string(),
            "List<Struct<'id':Uint64,'tag':Optional<Utf8>>>"
        );
        let exported = WireBridge.export(&guard, &typed).expect("export");
        assert_eq!(exported, param);
    }

    #[test]
    fn nested_optionals_keep_their_depth() {
        let arena = Arena::new(None);
        let mut guard = arena.bind().expect("bind");
        let ty = WireType::Optional(Box::new(WireType::Optional(Box::new(WireType::Data(
            DataKind::Int32,
        )))));
        for value in [
            WireValue::Null,
            WireValue::Nested(Box::new(WireValue::Null)),
            WireValue::Nested(Box::new(WireValue::Int32(5))),
        ] {
            let param = WireParam::new(ty.clone(), value);
            let typed = WireBridge.import(&mut guard, &param).expect("import");
            assert_eq!(WireBridge.export(&guard, &typed).expect("export"), param);
        }
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let arena = Arena::new(None);
        let mut guard = arena.bind().expect("bind");
        let param = WireParam::data(DataKind::Uint64, WireValue::Text("42".into()));
        let err = WireBridge.import(&mut guard, &param).expect_err("mismatch");
        assert_eq!(
            err,
            ParamError::TypeMismatch {
                message: "expected Uint64, got text".into()
            }
        );
        assert_eq!(guard.live_values(), 0);
    }

    #[test]
    fn short_uuid_is_rejected() {
        let arena = Arena::new(None);
        let mut guard = arena.bind().expect("bind");
        let param = WireParam::data(DataKind::Uuid, WireValue::Bytes(vec![1, 2, 3]));
        assert!(WireBridge.import(&mut guard, &param).is_err());
    }
}
