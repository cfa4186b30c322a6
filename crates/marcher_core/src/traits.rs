use anyhow::Result;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our integrators.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + Send + Sync + 'static {}

impl<T: Float + FromPrimitive + Debug + Send + Sync + 'static> Scalar for T {}

/// A first-order ODE system dy/dt = f(t, y).
///
/// Implementations must be pure: the same `(t, y)` always yields the same
/// derivative and evaluation has no side effects. Memoized stepping relies on it.
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: independent variable
    /// y: current state
    /// out: buffer to write dy/dt into, same length as `y`
    ///
    /// Errors are returned to the caller of `step`/`solve` untouched.
    fn apply(&self, t: T, y: &[T], out: &mut [T]) -> Result<()>;
}

impl<T: Scalar, S: OdeSystem<T> + ?Sized> OdeSystem<T> for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: T, y: &[T], out: &mut [T]) -> Result<()> {
        (**self).apply(t, y, out)
    }
}

/// A numerical scheme that advances a state in place by one step.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T)
        -> Result<()>;

    /// Short name of the scheme, distinct for every scheme.
    fn name(&self) -> &'static str;
}

/// Identifies the scheme and the system instance behind a step operator.
///
/// Two operators with equal ids produce the same state for the same
/// `(t, y, h)`, so they may share memoized results. The system type is part
/// of the id because zero-sized systems of different types can share an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorId {
    scheme: &'static str,
    system_type: &'static str,
    system: usize,
}

impl OperatorId {
    pub fn new<S: ?Sized>(scheme: &'static str, system: &S) -> Self {
        Self {
            scheme,
            system_type: std::any::type_name::<S>(),
            system: system as *const S as *const () as usize,
        }
    }
}

/// Anything that maps `(t, y, h)` to the next state.
///
/// Integrators implement this directly; the wrappers in [`crate::instrument`]
/// implement it by delegation, so they can be stacked in any order and driven
/// by [`crate::integrator::solve_with`].
pub trait StepOperator<T: Scalar> {
    /// Configured step size used by the solver loop for full steps.
    fn step_size(&self) -> T;

    /// Dimension of the states this operator accepts.
    fn dimension(&self) -> usize;

    /// Scheme and system this operator steps with.
    fn id(&self) -> OperatorId;

    /// Returns the state after one step of size `h` from `(t, y)`.
    fn advance(&mut self, t: T, y: &[T], h: T) -> Result<Vec<T>>;
}
