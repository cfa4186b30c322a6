pub mod batch;
pub mod error;
pub mod instrument;
pub mod integrator;
pub mod settings;
pub mod solvers;
pub mod systems;
pub mod trajectory;
/// The `marcher_core` crate provides fixed-step integrators for first-order ODE systems
/// dy/dt = f(t, y), generic over any floating-point `Scalar`.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `OdeSystem` (right-hand sides),
///   `Steppable` (schemes) and `StepOperator` (anything that advances a state).
/// - **Solvers**: explicit Euler and classical RK4 steppers.
/// - **Integrator**: validated step size, single steps and the interval solver loop.
/// - **Instrument**: stackable timing and memoization wrappers.
/// - **Batch**: parallel solves over many initial states.
pub mod traits;

pub use error::IntegratorError;
pub use integrator::{solve_with, EulerIntegrator, Integrator, RungeKutta4};
pub use settings::{Method, SolveSettings};
pub use trajectory::Trajectory;
pub use traits::{OdeSystem, OperatorId, Scalar, StepOperator, Steppable};
