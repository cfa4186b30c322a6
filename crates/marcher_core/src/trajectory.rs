use crate::traits::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::TryReserveError;

/// Samples produced by one solve: `times[i]` pairs with `states[i]`.
///
/// `times[0]` and `states[0]` are exactly the requested start and initial
/// state; the last time is exactly the requested end of the interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory<T> {
    pub times: Vec<T>,
    pub states: Vec<Vec<T>>,
}

impl<T: Scalar> Trajectory<T> {
    /// Starts a trajectory at `(t0, y0)` with room for `capacity` samples.
    pub(crate) fn try_start(t0: T, y0: &[T], capacity: usize) -> Result<Self, TryReserveError> {
        let mut times = Vec::new();
        let mut states = Vec::new();
        times.try_reserve_exact(capacity)?;
        states.try_reserve_exact(capacity)?;
        times.push(t0);
        states.push(y0.to_vec());
        Ok(Self { times, states })
    }

    pub(crate) fn push(&mut self, t: T, state: Vec<T>) {
        self.times.push(t);
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.states.first().map_or(0, Vec::len)
    }

    /// Last `(t, y)` sample.
    pub fn last(&self) -> Option<(T, &[T])> {
        let t = *self.times.last()?;
        let y = self.states.last()?;
        Some((t, y.as_slice()))
    }

    /// Iterates over `(t, y)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (T, &[T])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.iter().map(Vec::as_slice))
    }

    /// Values of one state component over time, `None` if `index` is out of range.
    pub fn component(&self, index: usize) -> Option<Vec<T>> {
        self.states.iter().map(|state| state.get(index).copied()).collect()
    }

    /// Splits into the aligned `(times, states)` sequences.
    pub fn into_parts(self) -> (Vec<T>, Vec<Vec<T>>) {
        (self.times, self.states)
    }
}
