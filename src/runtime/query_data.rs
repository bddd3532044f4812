use crate::config::QueryDataConfig;
use crate::runtime::{
    allocator::TxAllocatorState,
    arena::{ArenaGuard, ValueRef},
    binding::ParamBinding,
    error::{ParamError, ParamResult},
    types::TypeRef,
    value::{TypedValue, Value},
};
use crate::wire::{SerializationBridge, TransportChunk, WireBridge, WireParam};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub type ParamMap = HashMap<String, TypedValue>;
pub type SerializedParams = HashMap<String, WireParam>;

/// Parameters of one execution of a compiled plan.
///
/// Values live in the arena of the shared [`TxAllocatorState`]. Methods that
/// take an [`ArenaGuard`] expect the caller to hold the bind; the others bind
/// internally for the duration of the call and must not be invoked while the
/// calling thread already holds a guard.
pub struct QueryData {
    state: Arc<TxAllocatorState>,
    bridge: Arc<dyn SerializationBridge>,
    params: ParamMap,
    serialized: SerializedParams,
    tx_results: Vec<Option<Vec<TypedValue>>>,
    strict_resolution: bool,
}

impl QueryData {
    pub fn new(config: &QueryDataConfig) -> Self {
        let mut data = Self::with_state(Arc::new(TxAllocatorState::new(config)));
        data.strict_resolution = config.strict_resolution;
        data
    }

    pub fn with_state(state: Arc<TxAllocatorState>) -> Self {
        Self {
            state,
            bridge: Arc::new(WireBridge),
            params: ParamMap::new(),
            serialized: SerializedParams::new(),
            tx_results: Vec::new(),
            strict_resolution: false,
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn SerializationBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn allocator_state(&self) -> &Arc<TxAllocatorState> {
        &self.state
    }

    pub fn bind(&self) -> ParamResult<ArenaGuard> {
        self.state.bind()
    }

    /// Stores `value` under `name` unless the name is already taken. The first
    /// writer wins: a later value is released and `false` is returned.
    pub fn add_value(
        &mut self,
        guard: &mut ArenaGuard,
        name: impl Into<String>,
        value: TypedValue,
    ) -> ParamResult<bool> {
        if let Err(err) = self.state.check_guard(guard) {
            guard.release(value.value)?;
            return Err(err);
        }
        let name = name.into();
        if self.params.contains_key(&name) {
            guard.release(value.value)?;
            debug!(param = %name, "parameter already set, keeping first value");
            return Ok(false);
        }
        if !value.ty.accepts(guard.value(value.value)?) {
            let found = guard.value(value.value)?.type_name();
            guard.release(value.value)?;
            return Err(ParamError::mismatch(format!(
                "parameter {name} declared as {} holds a {found}",
                value.ty
            )));
        }
        debug!(param = %name, ty = %value.ty, "parameter added");
        self.params.insert(name, value);
        Ok(true)
    }

    pub fn add_from_wire(&mut self, name: impl Into<String>, param: &WireParam) -> ParamResult<bool> {
        let mut guard = self.state.bind()?;
        let value = self.bridge.import(&mut guard, param)?;
        self.add_value(&mut guard, name, value)
    }

    /// Same as [`add_from_wire`](Self::add_from_wire) for a JSON encoded [`WireParam`].
    pub fn add_from_json(&mut self, name: impl Into<String>, json: &str) -> ParamResult<bool> {
        let param: WireParam = serde_json::from_str(json)
            .map_err(|error| ParamError::mismatch(format!("invalid wire parameter: {error}")))?;
        self.add_from_wire(name, &param)
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeRef> {
        self.params.get(name).map(|typed| &typed.ty)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn get_value(&self, guard: &ArenaGuard, name: &str) -> ParamResult<&TypedValue> {
        self.state.check_guard(guard)?;
        let typed = self
            .params
            .get(name)
            .ok_or_else(|| ParamError::ParameterNotFound {
                name: name.to_owned(),
            })?;
        guard.check(typed.value)?;
        Ok(typed)
    }

    /// Type and contents of `name`, borrowed from the bound arena.
    pub fn read_value<'g>(
        &self,
        guard: &'g ArenaGuard,
        name: &str,
    ) -> ParamResult<(TypeRef, &'g Value)> {
        let typed = self.get_value(guard, name)?;
        Ok((typed.ty.clone(), guard.value(typed.value)?))
    }

    pub fn get_serialized(&mut self, name: &str) -> ParamResult<Option<&WireParam>> {
        let Some(typed) = self.params.get(name) else {
            return Ok(None);
        };
        if !self.serialized.contains_key(name) {
            let guard = self.state.bind()?;
            let wire = self.bridge.export(&guard, typed)?;
            self.serialized.insert(name.to_owned(), wire);
        }
        Ok(self.serialized.get(name))
    }

    /// Serialized form of every stored parameter, filling the cache as needed.
    pub fn all_serialized(&mut self) -> ParamResult<&SerializedParams> {
        if self.serialized.len() < self.params.len() {
            let guard = self.state.bind()?;
            for (name, typed) in &self.params {
                if !self.serialized.contains_key(name) {
                    let wire = self.bridge.export(&guard, typed)?;
                    self.serialized.insert(name.clone(), wire);
                }
            }
        }
        Ok(&self.serialized)
    }

    pub fn serialize_param_value(&self, name: &str) -> ParamResult<TransportChunk> {
        let typed = self
            .params
            .get(name)
            .ok_or_else(|| ParamError::ParameterNotFound {
                name: name.to_owned(),
            })?;
        let guard = self.state.bind()?;
        self.bridge.serialize_param_value(&guard, typed)
    }

    /// Records the results of transaction `tx_index`. Results of a transaction
    /// are recorded once; a second batch is released and `false` returned.
    pub fn add_tx_results(
        &mut self,
        guard: &mut ArenaGuard,
        tx_index: usize,
        results: Vec<TypedValue>,
    ) -> ParamResult<bool> {
        self.state.check_guard(guard)?;
        for result in &results {
            guard.check(result.value)?;
        }
        if matches!(self.tx_results.get(tx_index), Some(Some(_))) {
            for result in &results {
                guard.release(result.value)?;
            }
            debug!(tx_index, "transaction results already recorded");
            return Ok(false);
        }
        if tx_index >= self.tx_results.len() {
            self.tx_results.resize_with(tx_index + 1, || None);
        }
        debug!(tx_index, results = results.len(), "transaction results recorded");
        self.tx_results[tx_index] = Some(results);
        Ok(true)
    }

    pub fn has_result(&self, tx_index: usize, result_index: usize) -> bool {
        self.get_tx_result(tx_index, result_index).is_some()
    }

    pub fn get_tx_result(&self, tx_index: usize, result_index: usize) -> Option<&TypedValue> {
        self.tx_results
            .get(tx_index)?
            .as_ref()?
            .get(result_index)
    }

    pub fn tx_result_count(&self) -> usize {
        self.tx_results.iter().filter(|tx| tx.is_some()).count()
    }

    /// Materializes one plan parameter. Returns whether the parameter is now
    /// available; with `strict` a missing source is an error instead.
    pub fn resolve_binding(&mut self, binding: &ParamBinding, strict: bool) -> ParamResult<bool> {
        let resolved = match binding {
            ParamBinding::External { name } => {
                if self.params.contains_key(name) {
                    true
                } else if strict {
                    warn!(param = %name, "external parameter was not supplied");
                    return Err(ParamError::ParameterNotFound { name: name.clone() });
                } else {
                    false
                }
            }
            ParamBinding::TxResult {
                name,
                tx_index,
                result_index,
            } => match self.get_tx_result(*tx_index, *result_index) {
                Some(source) => {
                    let copy = source.clone();
                    let mut guard = self.state.bind()?;
                    guard.retain(copy.value)?;
                    self.add_value(&mut guard, name.clone(), copy)?;
                    true
                }
                None if strict => {
                    warn!(
                        param = %name,
                        tx_index,
                        result_index,
                        "transaction result is not available"
                    );
                    return Err(ParamError::UpstreamResultNotReady {
                        tx_index: *tx_index,
                        result_index: *result_index,
                        strict: true,
                    });
                }
                None => false,
            },
            ParamBinding::Internal { name, kind } => {
                let mut guard = self.state.bind()?;
                let value = self.state.resolve_internal(&mut guard, *kind)?;
                self.add_value(&mut guard, name.clone(), value)?;
                true
            }
        };
        debug!(param = binding.name(), resolved, "binding processed");
        Ok(resolved)
    }

    /// Resolves `bindings` in order with the configured strictness and returns
    /// the names that could not be materialized yet.
    pub fn resolve_all(&mut self, bindings: &[ParamBinding]) -> ParamResult<Vec<String>> {
        let strict = self.strict_resolution;
        let mut pending = Vec::new();
        for binding in bindings {
            if !self.resolve_binding(binding, strict)? {
                pending.push(binding.name().to_owned());
            }
        }
        Ok(pending)
    }

    /// Forgets all parameters, serialized forms, transaction results and
    /// generated internal values so the object can serve the next execution.
    pub fn clear(&mut self) -> ParamResult<()> {
        let mut guard = self.state.bind()?;
        self.release_all(&mut guard)?;
        self.state.reset(&mut guard)?;
        guard.recycle();
        debug!("query data cleared");
        Ok(())
    }

    /// Destroys the object with the bind the caller already holds, releasing
    /// every value it owns. Dropping instead defers that release to the
    /// next bind when the current thread holds the guard.
    pub fn release(mut self, guard: &mut ArenaGuard) -> ParamResult<()> {
        self.state.check_guard(guard)?;
        self.release_all(guard)
    }

    fn handles(&self) -> impl Iterator<Item = ValueRef> + '_ {
        let results = self.tx_results.iter().flatten().flatten();
        self.params.values().chain(results).map(|typed| typed.value)
    }

    fn release_all(&mut self, guard: &mut ArenaGuard) -> ParamResult<()> {
        self.serialized.clear();
        for (_, typed) in self.params.drain() {
            guard.release(typed.value)?;
        }
        for results in self.tx_results.drain(..).flatten() {
            for typed in results {
                guard.release(typed.value)?;
            }
        }
        Ok(())
    }
}

impl Drop for QueryData {
    fn drop(&mut self) {
        if self.params.is_empty() && self.tx_results.is_empty() {
            return;
        }
        match self.state.bind() {
            Ok(mut guard) => {
                if let Err(err) = self.release_all(&mut guard) {
                    error!(%err, "failed to release query parameters");
                }
            }
            Err(err) => {
                debug!(%err, "arena busy, deferring release of query parameters");
                let handles: Vec<_> = self.handles().collect();
                self.state.arena().defer_release(handles);
            }
        }
    }
}
