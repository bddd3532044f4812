use crate::runtime::{
    error::{ParamError, ParamResult},
    internal::InternalKind,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Where a plan parameter gets its value from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum ParamBinding {
    /// Supplied by the client with the request.
    External { name: String },
    /// Produced by an earlier transaction of the same plan.
    TxResult {
        name: String,
        tx_index: usize,
        result_index: usize,
    },
    /// Generated by the engine. `kind` is accepted by name or by numeric tag.
    Internal {
        name: String,
        #[serde(deserialize_with = "kind_by_name_or_tag")]
        kind: InternalKind,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KindRepr {
    Tag(u32),
    Name(InternalKind),
}

fn kind_by_name_or_tag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<InternalKind, D::Error> {
    match KindRepr::deserialize(deserializer)? {
        KindRepr::Name(kind) => Ok(kind),
        KindRepr::Tag(tag) => InternalKind::try_from(tag).map_err(serde::de::Error::custom),
    }
}

impl ParamBinding {
    pub fn external(name: impl Into<String>) -> Self {
        ParamBinding::External { name: name.into() }
    }

    pub fn tx_result(name: impl Into<String>, tx_index: usize, result_index: usize) -> Self {
        ParamBinding::TxResult {
            name: name.into(),
            tx_index,
            result_index,
        }
    }

    pub fn internal(name: impl Into<String>, kind: InternalKind) -> Self {
        ParamBinding::Internal {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParamBinding::External { name }
            | ParamBinding::TxResult { name, .. }
            | ParamBinding::Internal { name, .. } => name,
        }
    }

    /// Decodes one binding of a compiled plan. Unknown binding or kind tags
    /// mean the plan is corrupt and surface as [`ParamError::MalformedBinding`].
    pub fn from_json(json: &str) -> ParamResult<Self> {
        serde_json::from_str(json).map_err(|error| ParamError::MalformedBinding {
            message: error.to_string(),
        })
    }

    pub fn list_from_json(json: &str) -> ParamResult<Vec<Self>> {
        serde_json::from_str(json).map_err(|error| ParamError::MalformedBinding {
            message: error.to_string(),
        })
    }
}
