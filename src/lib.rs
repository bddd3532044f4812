#![allow(clippy::collapsible_if)]

//! Parameter store for one execution of a compiled query plan: client,
//! transaction-result and engine-generated parameters materialized into a
//! per-query arena, with lazily cached wire forms.

pub mod config;
pub mod diagnostics;
pub mod runtime;
pub mod wire;

pub use config::QueryDataConfig;
pub use runtime::{
    allocator::TxAllocatorState,
    arena::{Arena, ArenaGuard, ValueRef},
    binding::ParamBinding,
    error::{ParamError, ParamResult},
    internal::InternalKind,
    types::{DataKind, Type, TypeEnv, TypeRef},
    value::{TypedValue, Value},
    QueryData,
};

#[cfg(test)]
mod tests;
