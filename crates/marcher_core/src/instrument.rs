//! Decorators over any [`StepOperator`].
//!
//! [`Timed`] reports the wall-clock duration of each step through the `log`
//! facade and [`Memoized`] answers repeated `(t, y, h)` queries from a cache
//! scoped by [`OperatorId`].
//! Both forward every call to the wrapped operator and return its result
//! untouched, so they can be stacked in either order.

use crate::traits::{OperatorId, Scalar, StepOperator};
use anyhow::Result;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct Timed<S> {
    inner: S,
    label: String,
    calls: usize,
    total: Duration,
}

impl<S> Timed<S> {
    pub fn new(inner: S) -> Self {
        Self::with_label(inner, "step")
    }

    pub fn with_label(inner: S, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
            calls: 0,
            total: Duration::ZERO,
        }
    }

    /// Number of timed invocations, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Accumulated time spent in the wrapped operator.
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<T: Scalar, S: StepOperator<T>> StepOperator<T> for Timed<S> {
    fn step_size(&self) -> T {
        self.inner.step_size()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn id(&self) -> OperatorId {
        self.inner.id()
    }

    fn advance(&mut self, t: T, y: &[T], h: T) -> Result<Vec<T>> {
        let start = Instant::now();
        let result = self.inner.advance(t, y, h);
        let elapsed = start.elapsed();
        self.calls += 1;
        self.total += elapsed;
        trace!(
            "{} took {:.6} s (t = {:?}, h = {:?})",
            self.label,
            elapsed.as_secs_f64(),
            t,
            h
        );
        result
    }
}

/// Exact bit pattern of a float, with both zeros mapped to +0.
type Bits = (u64, i16, i8);

fn bits<T: Scalar>(value: T) -> Bits {
    if value == T::zero() {
        T::zero().integer_decode()
    } else {
        value.integer_decode()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StepKey {
    operator: OperatorId,
    t: Bits,
    y: Vec<Bits>,
    h: Bits,
}

impl StepKey {
    fn new<T: Scalar>(operator: OperatorId, t: T, y: &[T], h: T) -> Self {
        Self {
            operator,
            t: bits(t),
            y: y.iter().copied().map(bits).collect(),
            h: bits(h),
        }
    }
}

/// Step results keyed by the operator and the exact `(t, y, h)` that
/// produced them, so operators with different schemes or systems never see
/// each other's entries.
///
/// Cloning yields another handle to the same entries; access is serialized
/// by a mutex so handles may live on different threads. The cache is never
/// evicted; call [`StepCache::clear`] to release it.
pub struct StepCache<T> {
    entries: Arc<Mutex<HashMap<StepKey, Vec<T>>>>,
}

impl<T> Clone for StepCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for StepCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Scalar> StepCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn get(&self, key: &StepKey) -> Option<Vec<T>> {
        self.lock().get(key).cloned()
    }

    fn insert(&self, key: StepKey, value: Vec<T>) {
        self.lock().insert(key, value);
    }

    // Entries are inserted whole, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<StepKey, Vec<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caches the results of the wrapped operator.
///
/// The wrapped operator must be pure: if its system has hidden state or is
/// changed between calls, cached states go stale and are returned anyway.
/// Failed steps are not cached.
pub struct Memoized<S, T> {
    inner: S,
    cache: StepCache<T>,
    hits: usize,
    misses: usize,
}

impl<S, T: Scalar> Memoized<S, T> {
    /// Wraps `inner` with a private cache.
    pub fn new(inner: S) -> Self {
        Self::with_cache(inner, StepCache::new())
    }

    /// Wraps `inner` with a cache that may be shared with other wrappers.
    ///
    /// Entries are scoped by [`StepOperator::id`]; only wrappers over the same
    /// scheme and system instance reuse each other's results.
    pub fn with_cache(inner: S, cache: StepCache<T>) -> Self {
        Self {
            inner,
            cache,
            hits: 0,
            misses: 0,
        }
    }

    pub fn cache(&self) -> &StepCache<T> {
        &self.cache
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<T: Scalar, S: StepOperator<T>> StepOperator<T> for Memoized<S, T> {
    fn step_size(&self) -> T {
        self.inner.step_size()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn id(&self) -> OperatorId {
        self.inner.id()
    }

    fn advance(&mut self, t: T, y: &[T], h: T) -> Result<Vec<T>> {
        let key = StepKey::new(self.inner.id(), t, y, h);
        if let Some(cached) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(cached);
        }
        let result = self.inner.advance(t, y, h)?;
        self.misses += 1;
        self.cache.insert(key, result.clone());
        Ok(result)
    }
}
