use crate::integrator::validate_step_size;
use crate::settings::Method;
use crate::trajectory::Trajectory;
use crate::traits::{OdeSystem, Scalar};
use anyhow::Result;
use log::debug;
use rayon::prelude::*;

/// Solves `system` from every initial state in parallel.
///
/// Each task builds its own integrator, so nothing but the (pure) system is
/// shared. Trajectories come back in the order of `initial_states`; the first
/// failure aborts the batch.
pub fn solve_many<T, S, Y>(
    system: &S,
    method: Method,
    h: T,
    t_span: (T, T),
    initial_states: &[Y],
) -> Result<Vec<Trajectory<T>>>
where
    T: Scalar,
    S: OdeSystem<T> + Sync + ?Sized,
    Y: AsRef<[T]> + Sync,
{
    validate_step_size(h)?;
    debug!(
        "Solving {} initial states with {:?}",
        initial_states.len(),
        method
    );
    initial_states
        .par_iter()
        .map(|y0| method.build(system, h)?.solve(t_span, y0.as_ref()))
        .collect()
}
