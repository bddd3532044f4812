use crate::runtime::{
    error::{ParamError, ParamResult},
    platform::{RandomProvider, TimeProvider},
    types::DataKind,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const MICROS_PER_SECOND: u64 = 1_000_000;
const MICROS_PER_DAY: u64 = 86_400 * MICROS_PER_SECOND;

/// Engine-generated parameter sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalKind {
    Now,
    CurrentDate,
    CurrentDatetime,
    CurrentTimestamp,
    RandomNumber,
    Random,
    RandomUuid,
}

impl InternalKind {
    pub const ALL: [InternalKind; 7] = [
        InternalKind::Now,
        InternalKind::CurrentDate,
        InternalKind::CurrentDatetime,
        InternalKind::CurrentTimestamp,
        InternalKind::RandomNumber,
        InternalKind::Random,
        InternalKind::RandomUuid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InternalKind::Now => "NOW",
            InternalKind::CurrentDate => "CURRENT_DATE",
            InternalKind::CurrentDatetime => "CURRENT_DATETIME",
            InternalKind::CurrentTimestamp => "CURRENT_TIMESTAMP",
            InternalKind::RandomNumber => "RANDOM_NUMBER",
            InternalKind::Random => "RANDOM",
            InternalKind::RandomUuid => "RANDOM_UUID",
        }
    }
}

impl fmt::Display for InternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric tags as written by plan compilers; 0 is "unspecified".
impl TryFrom<u32> for InternalKind {
    type Error = ParamError;

    fn try_from(tag: u32) -> ParamResult<Self> {
        match tag {
            1 => Ok(InternalKind::Now),
            2 => Ok(InternalKind::CurrentDate),
            3 => Ok(InternalKind::CurrentDatetime),
            4 => Ok(InternalKind::CurrentTimestamp),
            5 => Ok(InternalKind::RandomNumber),
            6 => Ok(InternalKind::Random),
            7 => Ok(InternalKind::RandomUuid),
            other => Err(ParamError::MalformedBinding {
                message: format!("unexpected internal parameter type: {other}"),
            }),
        }
    }
}

/// At most one generated value per [`InternalKind`] for the lifetime of a
/// query. Time-valued kinds share a single clock reading so that `NOW` and
/// `CURRENT_DATE` agree within one query.
#[derive(Default, Debug)]
pub struct InternalValueCache {
    now_us: Option<u64>,
    date: Option<u32>,
    datetime: Option<u32>,
    timestamp: Option<u64>,
    random_number: Option<u64>,
    random: Option<f64>,
    random_uuid: Option<[u8; 16]>,
}

impl InternalValueCache {
    pub fn resolve(
        &mut self,
        kind: InternalKind,
        time: &dyn TimeProvider,
        random: &dyn RandomProvider,
    ) -> ParamResult<(DataKind, Value)> {
        let resolved = match kind {
            InternalKind::Now => (DataKind::Uint64, Value::Uint64(self.now(time)?)),
            InternalKind::CurrentDate => {
                let date = match self.date {
                    Some(date) => date,
                    None => {
                        let days = self.now(time)? / MICROS_PER_DAY;
                        *self.date.insert(narrow(kind, days)?)
                    }
                };
                (DataKind::Uint32, Value::Uint32(date))
            }
            InternalKind::CurrentDatetime => {
                let datetime = match self.datetime {
                    Some(datetime) => datetime,
                    None => {
                        let seconds = self.now(time)? / MICROS_PER_SECOND;
                        *self.datetime.insert(narrow(kind, seconds)?)
                    }
                };
                (DataKind::Uint32, Value::Uint32(datetime))
            }
            InternalKind::CurrentTimestamp => {
                let timestamp = match self.timestamp {
                    Some(timestamp) => timestamp,
                    None => {
                        let now = self.now(time)?;
                        *self.timestamp.insert(now)
                    }
                };
                (DataKind::Uint64, Value::Uint64(timestamp))
            }
            InternalKind::RandomNumber => {
                let number = *self.random_number.get_or_insert_with(|| random.next_u64());
                (DataKind::Uint64, Value::Uint64(number))
            }
            InternalKind::Random => {
                let number = *self.random.get_or_insert_with(|| random.next_f64());
                (DataKind::Double, Value::Double(number))
            }
            InternalKind::RandomUuid => {
                let bytes = *self
                    .random_uuid
                    .get_or_insert_with(|| uuid_bytes(random.next_uuid()));
                (DataKind::Uuid, Value::Bytes(bytes.to_vec()))
            }
        };
        Ok(resolved)
    }

    pub fn is_cached(&self, kind: InternalKind) -> bool {
        match kind {
            InternalKind::Now => self.now_us.is_some(),
            InternalKind::CurrentDate => self.date.is_some(),
            InternalKind::CurrentDatetime => self.datetime.is_some(),
            InternalKind::CurrentTimestamp => self.timestamp.is_some(),
            InternalKind::RandomNumber => self.random_number.is_some(),
            InternalKind::Random => self.random.is_some(),
            InternalKind::RandomUuid => self.random_uuid.is_some(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn now(&mut self, time: &dyn TimeProvider) -> ParamResult<u64> {
        if let Some(now) = self.now_us {
            return Ok(now);
        }
        let micros = time.now().timestamp_micros();
        let now = u64::try_from(micros).map_err(|_| ParamError::ClockOverflow {
            kind: InternalKind::Now.name(),
            value: i128::from(micros),
        })?;
        debug!(now_us = now, "captured query clock");
        Ok(*self.now_us.insert(now))
    }
}

fn narrow(kind: InternalKind, value: u64) -> ParamResult<u32> {
    u32::try_from(value).map_err(|_| ParamError::ClockOverflow {
        kind: kind.name(),
        value: i128::from(value),
    })
}

/// Wire layout of a generated UUID: the two 64-bit halves of the identifier,
/// each written little-endian, high half first.
pub fn uuid_bytes(uuid: uuid::Uuid) -> [u8; 16] {
    let (high, low) = uuid.as_u64_pair();
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&high.to_le_bytes());
    bytes[8..].copy_from_slice(&low.to_le_bytes());
    bytes
}
