mod scenarios;

use crate::config::QueryDataConfig;
use crate::runtime::{
    allocator::TxAllocatorState,
    platform::{FixedClock, SeededRandom},
    QueryData,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

fn fixed_state(seed: u64) -> Arc<TxAllocatorState> {
    let instant = Utc
        .with_ymd_and_hms(2024, 5, 17, 12, 30, 0)
        .single()
        .expect("valid instant");
    Arc::new(TxAllocatorState::with_providers(
        &QueryDataConfig::default(),
        Arc::new(FixedClock::new(instant)),
        Arc::new(SeededRandom::new(seed)),
    ))
}

fn query_data() -> QueryData {
    QueryData::with_state(fixed_state(17))
}
