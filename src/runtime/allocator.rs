use crate::config::QueryDataConfig;
use crate::runtime::{
    arena::{Arena, ArenaGuard},
    error::{ParamError, ParamResult},
    internal::InternalKind,
    platform::{RandomProvider, SeededRandom, SystemClock, ThreadRandom, TimeProvider},
    value::TypedValue,
};
use std::sync::Arc;
use tracing::debug;

/// Memory and generator state shared between the query-data objects of one
/// query and the execution engine running it.
pub struct TxAllocatorState {
    arena: Arena,
    time: Arc<dyn TimeProvider>,
    random: Arc<dyn RandomProvider>,
}

impl TxAllocatorState {
    pub fn new(config: &QueryDataConfig) -> Self {
        let random: Arc<dyn RandomProvider> = match config.random_seed {
            Some(seed) => Arc::new(SeededRandom::new(seed)),
            None => Arc::new(ThreadRandom),
        };
        Self::with_providers(config, Arc::new(SystemClock), random)
    }

    pub fn with_providers(
        config: &QueryDataConfig,
        time: Arc<dyn TimeProvider>,
        random: Arc<dyn RandomProvider>,
    ) -> Self {
        Self {
            arena: Arena::new(config.memory_limit),
            time,
            random,
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn bind(&self) -> ParamResult<ArenaGuard> {
        self.arena.bind()
    }

    /// Produces the value of an internal parameter, generating it on first use
    /// and returning the memoized value afterwards. The returned handle is a
    /// fresh reference owned by the caller.
    pub fn resolve_internal(
        &self,
        guard: &mut ArenaGuard,
        kind: InternalKind,
    ) -> ParamResult<TypedValue> {
        self.check_guard(guard)?;
        let cached = guard.internals().is_cached(kind);
        let (data_kind, value) =
            guard
                .internals()
                .resolve(kind, self.time.as_ref(), self.random.as_ref())?;
        if !cached {
            debug!(kind = %kind, value = %value, "generated internal parameter");
        }
        let ty = guard.types().data(data_kind);
        let handle = guard.alloc(value)?;
        Ok(TypedValue::new(ty, handle))
    }

    /// Forgets every memoized internal value so the next query regenerates them.
    pub fn reset(&self, guard: &mut ArenaGuard) -> ParamResult<()> {
        self.check_guard(guard)?;
        guard.internals().reset();
        Ok(())
    }

    pub(crate) fn check_guard(&self, guard: &ArenaGuard) -> ParamResult<()> {
        if guard.arena_id() != self.arena.id() {
            return Err(ParamError::misuse(format!(
                "guard for arena {} passed to arena {}",
                guard.arena_id(),
                self.arena.id()
            )));
        }
        Ok(())
    }
}
