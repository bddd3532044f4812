use crate::runtime::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Scalar data types a parameter can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Bool,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Double,
    Utf8,
    String,
    Uuid,
}

impl DataKind {
    pub fn name(self) -> &'static str {
        match self {
            DataKind::Bool => "Bool",
            DataKind::Int32 => "Int32",
            DataKind::Uint32 => "Uint32",
            DataKind::Int64 => "Int64",
            DataKind::Uint64 => "Uint64",
            DataKind::Double => "Double",
            DataKind::Utf8 => "Utf8",
            DataKind::String => "String",
            DataKind::Uuid => "Uuid",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (DataKind::Bool, Value::Bool(_))
            | (DataKind::Int32, Value::Int32(_))
            | (DataKind::Uint32, Value::Uint32(_))
            | (DataKind::Int64, Value::Int64(_))
            | (DataKind::Uint64, Value::Uint64(_))
            | (DataKind::Double, Value::Double(_))
            | (DataKind::Utf8, Value::Utf8(_))
            | (DataKind::String, Value::Bytes(_)) => true,
            (DataKind::Uuid, Value::Bytes(bytes)) => bytes.len() == 16,
            _ => false,
        }
    }
}

/// Shared handle to an interned type descriptor. Descriptors are immutable,
/// so a handle stays readable outside of an arena bind.
pub type TypeRef = Arc<Type>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Data(DataKind),
    Optional(TypeRef),
    List(TypeRef),
    Tuple(Vec<TypeRef>),
    Struct(Vec<(String, TypeRef)>),
}

impl Type {
    pub fn data_kind(&self) -> Option<DataKind> {
        match self {
            Type::Data(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Structural check that `value` is a valid inhabitant of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Data(kind), value) => kind.accepts(value),
            (Type::Optional(_), Value::Optional(None)) => true,
            (Type::Optional(item), Value::Optional(Some(inner))) => item.accepts(inner),
            (Type::List(item), Value::List(items)) => items.iter().all(|v| item.accepts(v)),
            (Type::Tuple(elements), Value::Tuple(items)) => {
                elements.len() == items.len()
                    && elements.iter().zip(items).all(|(ty, v)| ty.accepts(v))
            }
            (Type::Struct(members), Value::Tuple(items)) => {
                members.len() == items.len()
                    && members.iter().zip(items).all(|((_, ty), v)| ty.accepts(v))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Data(kind) => write!(f, "{}", kind.name()),
            Type::Optional(item) => write!(f, "Optional<{item}>"),
            Type::List(item) => write!(f, "List<{item}>"),
            Type::Tuple(elements) => {
                write!(f, "Tuple<")?;
                for (idx, ty) in elements.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ">")
            }
            Type::Struct(members) => {
                write!(f, "Struct<")?;
                for (idx, (name, ty)) in members.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "'{name}':{ty}")?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Registry of type descriptors owned by one arena. Only reachable through an
/// [`ArenaGuard`](crate::runtime::arena::ArenaGuard), so descriptors are created
/// while the arena is bound.
#[derive(Default)]
pub struct TypeEnv {
    interned: HashMap<Type, TypeRef>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, ty: Type) -> TypeRef {
        if let Some(existing) = self.interned.get(&ty) {
            return existing.clone();
        }
        let handle = Arc::new(ty.clone());
        self.interned.insert(ty, handle.clone());
        handle
    }

    pub fn data(&mut self, kind: DataKind) -> TypeRef {
        self.intern(Type::Data(kind))
    }

    pub fn uint32(&mut self) -> TypeRef {
        self.data(DataKind::Uint32)
    }

    pub fn uint64(&mut self) -> TypeRef {
        self.data(DataKind::Uint64)
    }

    pub fn int32(&mut self) -> TypeRef {
        self.data(DataKind::Int32)
    }

    pub fn double(&mut self) -> TypeRef {
        self.data(DataKind::Double)
    }

    pub fn uuid(&mut self) -> TypeRef {
        self.data(DataKind::Uuid)
    }

    pub fn utf8(&mut self) -> TypeRef {
        self.data(DataKind::Utf8)
    }

    pub fn optional(&mut self, item: TypeRef) -> TypeRef {
        self.intern(Type::Optional(item))
    }

    pub fn list(&mut self, item: TypeRef) -> TypeRef {
        self.intern(Type::List(item))
    }

    pub fn tuple(&mut self, elements: Vec<TypeRef>) -> TypeRef {
        self.intern(Type::Tuple(elements))
    }

    pub fn structure(&mut self, members: Vec<(String, TypeRef)>) -> TypeRef {
        self.intern(Type::Struct(members))
    }

    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_shared_descriptor() {
        let mut env = TypeEnv::new();
        let a = env.uint64();
        let b = env.intern(Type::Data(DataKind::Uint64));
        assert!(Arc::ptr_eq(&a, &b));
        let list = env.list(a.clone());
        let again = env.list(b);
        assert!(Arc::ptr_eq(&list, &again));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn struct_types_accept_positional_members() {
        let mut env = TypeEnv::new();
        let id = env.uint64();
        let label = env.utf8();
        let row = env.structure(vec![("id".into(), id), ("label".into(), label)]);
        assert!(row.accepts(&Value::Tuple(vec![
            Value::Uint64(1),
            Value::Utf8("one".into())
        ])));
        assert!(!row.accepts(&Value::Tuple(vec![Value::Uint64(1)])));
        assert_eq!(row.to_string(), "Struct<'id':Uint64,'label':Utf8>");
    }

    #[test]
    fn uuid_requires_sixteen_bytes() {
        let ty = Type::Data(DataKind::Uuid);
        assert!(ty.accepts(&Value::Bytes(vec![0; 16])));
        assert!(!ty.accepts(&Value::Bytes(vec![0; 15])));
    }
}
