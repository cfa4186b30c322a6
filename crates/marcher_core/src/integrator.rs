use crate::error::IntegratorError;
use crate::solvers::{Euler, RK4};
use crate::trajectory::Trajectory;
use crate::traits::{OdeSystem, OperatorId, Scalar, StepOperator, Steppable};
use anyhow::{anyhow, Result};
use log::debug;

/// A fixed-step integrator bound to one ODE system.
///
/// The system is borrowed, not owned, so several integrators (for example an
/// Euler and an RK4 one, for comparison) can share it. The step size is always
/// positive and finite.
pub struct Integrator<'a, T: Scalar, S: ?Sized, M> {
    system: &'a S,
    h: T,
    scheme: M,
}

pub type EulerIntegrator<'a, T, S> = Integrator<'a, T, S, Euler<T>>;
pub type RungeKutta4<'a, T, S> = Integrator<'a, T, S, RK4<T>>;

pub(crate) fn validate_step_size<T: Scalar>(h: T) -> Result<T, IntegratorError> {
    if h > T::zero() && h.is_finite() {
        Ok(h)
    } else {
        Err(IntegratorError::InvalidStepSize(
            h.to_f64().unwrap_or(f64::NAN),
        ))
    }
}

impl<'a, T: Scalar, S: OdeSystem<T> + ?Sized> Integrator<'a, T, S, Euler<T>> {
    pub fn euler(system: &'a S, h: T) -> Result<Self, IntegratorError> {
        Self::with_scheme(system, h, Euler::new(system.dimension()))
    }
}

impl<'a, T: Scalar, S: OdeSystem<T> + ?Sized> Integrator<'a, T, S, RK4<T>> {
    pub fn runge_kutta4(system: &'a S, h: T) -> Result<Self, IntegratorError> {
        Self::with_scheme(system, h, RK4::new(system.dimension()))
    }
}

impl<'a, T, S, M> Integrator<'a, T, S, M>
where
    T: Scalar,
    S: OdeSystem<T> + ?Sized,
    M: Steppable<T>,
{
    /// `scheme` must have been sized for `system.dimension()`.
    pub fn with_scheme(system: &'a S, h: T, scheme: M) -> Result<Self, IntegratorError> {
        Ok(Self {
            system,
            h: validate_step_size(h)?,
            scheme,
        })
    }

    pub fn system(&self) -> &'a S {
        self.system
    }

    pub fn step_size(&self) -> T {
        self.h
    }

    /// Replaces the step size. On error the previous value is kept.
    pub fn set_step_size(&mut self, h: T) -> Result<(), IntegratorError> {
        self.h = validate_step_size(h)?;
        Ok(())
    }

    /// Advances `y` from `t` by one step.
    ///
    /// A positive `h` overrides the configured step size for this call only;
    /// `None` or a non-positive override uses the configured one.
    pub fn step(&mut self, t: T, y: &[T], h: Option<T>) -> Result<Vec<T>> {
        let h = match h {
            Some(h) if h > T::zero() => h,
            _ => self.h,
        };
        self.advance_state(t, y, h)
    }

    /// Integrates over the closed interval `t_span` starting from `y0`.
    pub fn solve(&mut self, t_span: (T, T), y0: &[T]) -> Result<Trajectory<T>> {
        solve_with(self, t_span, y0)
    }

    fn advance_state(&mut self, mut t: T, y: &[T], h: T) -> Result<Vec<T>> {
        let dim = self.system.dimension();
        if y.len() != dim {
            return Err(IntegratorError::DimensionMismatch {
                expected: dim,
                actual: y.len(),
            }
            .into());
        }
        let mut state = y.to_vec();
        self.scheme.step(&self.system, &mut t, &mut state, h)?;
        Ok(state)
    }
}

impl<'a, T, S, M> StepOperator<T> for Integrator<'a, T, S, M>
where
    T: Scalar,
    S: OdeSystem<T> + ?Sized,
    M: Steppable<T>,
{
    fn step_size(&self) -> T {
        self.h
    }

    fn dimension(&self) -> usize {
        self.system.dimension()
    }

    fn id(&self) -> OperatorId {
        OperatorId::new(self.scheme.name(), self.system)
    }

    fn advance(&mut self, t: T, y: &[T], h: T) -> Result<Vec<T>> {
        self.advance_state(t, y, h)
    }
}

/// Remainders below this are rounding noise from `t_start + i * h`.
fn snap_tolerance<T: Scalar>(t_end: T) -> T {
    let scale = t_end.abs().max(T::one());
    T::epsilon() * scale * T::from_u8(16).unwrap_or_else(T::one)
}

/// Drives `op` across `t_span`, sampling every `op.step_size()`.
///
/// Samples sit at `t_start + i * h`. When `h` does not divide the interval
/// the final step is shortened so the last sample is exactly `t_end`.
pub fn solve_with<T, O>(op: &mut O, t_span: (T, T), y0: &[T]) -> Result<Trajectory<T>>
where
    T: Scalar,
    O: StepOperator<T> + ?Sized,
{
    let (t_start, t_end) = t_span;
    if !t_start.is_finite() || !t_end.is_finite() || t_end < t_start {
        return Err(IntegratorError::DegenerateInterval {
            start: t_start.to_f64().unwrap_or(f64::NAN),
            end: t_end.to_f64().unwrap_or(f64::NAN),
        }
        .into());
    }
    let dim = op.dimension();
    if y0.len() != dim {
        return Err(IntegratorError::DimensionMismatch {
            expected: dim,
            actual: y0.len(),
        }
        .into());
    }

    let h = op.step_size();
    let full_steps = ((t_end - t_start) / h)
        .floor()
        .to_usize()
        .ok_or_else(|| anyhow!("Interval {:?} is too long for step size {:?}.", t_span, h))?;
    // One extra slot for a clamped final step.
    let capacity = full_steps
        .checked_add(2)
        .ok_or_else(|| anyhow!("Interval {:?} is too long for step size {:?}.", t_span, h))?;
    let samples = full_steps + 1;

    let mut trajectory = Trajectory::try_start(t_start, y0, capacity).map_err(|err| {
        anyhow!(
            "Cannot allocate {} samples for interval {:?} with step size {:?}: {}",
            capacity,
            t_span,
            h,
            err
        )
    })?;
    let mut y = y0.to_vec();
    let mut t_prev = t_start;
    let mut index = T::zero();

    for _ in 1..samples {
        index = index + T::one();
        let nominal = t_start + index * h;
        if nominal > t_end {
            // Clamped below.
            break;
        }
        y = op.advance(t_prev, &y, h)?;
        trajectory.push(nominal, y.clone());
        t_prev = nominal;
    }

    let tolerance = snap_tolerance(t_end);
    loop {
        let remaining = t_end - t_prev;
        if remaining <= T::zero() {
            break;
        }
        if remaining <= tolerance && trajectory.len() > 1 {
            if let Some(last) = trajectory.times.last_mut() {
                *last = t_end;
            }
            break;
        }
        let (dt, t_next) = if remaining > h {
            (h, t_prev + h)
        } else {
            (remaining, t_end)
        };
        y = op.advance(t_prev, &y, dt)?;
        trajectory.push(t_next, y.clone());
        t_prev = t_next;
    }

    debug!(
        "Solved over [{:?}, {:?}] with h = {:?}: {} samples",
        t_start,
        t_end,
        h,
        trajectory.len()
    );
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::fn_system;
    use proptest::prelude::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: anyhow::Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn decay() -> impl OdeSystem<f64> {
        fn_system(1, |_t: f64, y: &[f64], out: &mut [f64]| {
            out[0] = -y[0];
            Ok(())
        })
    }

    fn growth() -> impl OdeSystem<f64> {
        fn_system(1, |_t: f64, y: &[f64], out: &mut [f64]| {
            out[0] = y[0];
            Ok(())
        })
    }

    /// Records every step it is asked to take and returns `y + h`.
    struct Recorder {
        h: f64,
        steps: Vec<(f64, f64)>,
    }

    impl StepOperator<f64> for Recorder {
        fn step_size(&self) -> f64 {
            self.h
        }

        fn dimension(&self) -> usize {
            1
        }

        fn id(&self) -> OperatorId {
            OperatorId::new("recorder", self)
        }

        fn advance(&mut self, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>> {
            self.steps.push((t, h));
            Ok(vec![y[0] + h])
        }
    }

    #[derive(Debug)]
    struct Singularity(f64);

    impl std::fmt::Display for Singularity {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "singular at t = {}", self.0)
        }
    }

    impl std::error::Error for Singularity {}

    #[test]
    fn decay_scenario_matches_reference_values() {
        let system = decay();
        let mut euler = Integrator::euler(&system, 0.1).unwrap();
        let mut rk4 = Integrator::runge_kutta4(&system, 0.1).unwrap();

        let euler_traj = euler.solve((0.0, 1.0), &[1.0]).unwrap();
        let rk4_traj = rk4.solve((0.0, 1.0), &[1.0]).unwrap();

        assert_eq!(euler_traj.len(), 11);
        assert_eq!(rk4_traj.len(), 11);

        let (t_euler, y_euler) = euler_traj.last().unwrap();
        let (t_rk4, y_rk4) = rk4_traj.last().unwrap();
        assert_eq!(t_euler, 1.0);
        assert_eq!(t_rk4, 1.0);
        assert!((y_euler[0] - 0.3487).abs() < 1e-4);
        assert!((y_rk4[0] - (-1.0_f64).exp()).abs() < 1e-5);
    }

    #[test]
    fn uneven_interval_ends_with_clamped_step() {
        let mut recorder = Recorder {
            h: 0.1,
            steps: Vec::new(),
        };
        let trajectory = solve_with(&mut recorder, (0.0, 0.25), &[0.0]).unwrap();

        let steps = &recorder.steps;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], (0.0, 0.1));
        assert_eq!(steps[1], (0.1, 0.1));
        assert_eq!(steps[2].0, 0.2);
        assert_eq!(steps[2].1, 0.25 - 0.2);
        assert!((steps[2].1 - 0.05).abs() < 1e-12);
        assert_eq!(trajectory.times, vec![0.0, 0.1, 0.2, 0.25]);
    }

    #[test]
    fn overshooting_nominal_sample_is_clamped_to_end() {
        // 17 * 0.1 rounds above 1.7 although floor(1.7 / 0.1) == 17.
        assert!(17.0 * 0.1 > 1.7);
        assert_eq!((1.7_f64 / 0.1).floor(), 17.0);

        let mut recorder = Recorder {
            h: 0.1,
            steps: Vec::new(),
        };
        let trajectory = solve_with(&mut recorder, (0.0, 1.7), &[0.0]).unwrap();

        let steps = &recorder.steps;
        assert_eq!(steps.len(), 17);
        let (t_last, h_last) = steps[16];
        assert_eq!(t_last, 16.0 * 0.1);
        assert_eq!(h_last, 1.7 - 16.0 * 0.1);
        assert!(h_last < 0.1);
        assert_eq!(trajectory.len(), 18);
        assert_eq!(trajectory.times[16], 16.0 * 0.1);
        assert_eq!(*trajectory.times.last().unwrap(), 1.7);
    }

    #[test]
    fn unallocatable_step_count_is_an_error() {
        let system = decay();
        let mut euler = Integrator::euler(&system, 1e-13).unwrap();
        assert_err_contains(euler.solve((0.0, 1e6), &[1.0]), "Cannot allocate");

        let mut rk4 = Integrator::runge_kutta4(&system, 1e-300).unwrap();
        assert_err_contains(rk4.solve((0.0, 1e300), &[1.0]), "too long");
    }

    #[test]
    fn first_sample_is_exact_initial_condition() {
        let system = decay();
        let mut rk4 = Integrator::runge_kutta4(&system, 0.3).unwrap();
        let trajectory = rk4.solve((-1.5, 2.0), &[0.125]).unwrap();
        assert_eq!(trajectory.times[0], -1.5);
        assert_eq!(trajectory.states[0], vec![0.125]);
        assert_eq!(*trajectory.times.last().unwrap(), 2.0);
    }

    #[test]
    fn zero_length_interval_yields_single_sample() {
        let system = decay();
        let mut euler = Integrator::euler(&system, 0.1).unwrap();
        let trajectory = euler.solve((3.0, 3.0), &[2.0]).unwrap();
        assert_eq!(trajectory.times, vec![3.0]);
        assert_eq!(trajectory.states, vec![vec![2.0]]);
    }

    #[test]
    fn interval_shorter_than_step_takes_one_partial_step() {
        let system = decay();
        let mut euler = Integrator::euler(&system, 1.0).unwrap();
        let trajectory = euler.solve((0.0, 0.25), &[1.0]).unwrap();
        assert_eq!(trajectory.times, vec![0.0, 0.25]);
        assert_eq!(trajectory.states[1], vec![0.75]);
    }

    #[test]
    fn reversed_interval_is_rejected() {
        let system = decay();
        let mut euler = Integrator::euler(&system, 0.1).unwrap();
        let err = euler.solve((1.0, 0.0), &[1.0]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<IntegratorError>(),
            Some(&IntegratorError::DegenerateInterval {
                start: 1.0,
                end: 0.0
            })
        );
        assert_err_contains(euler.solve((0.0, f64::INFINITY), &[1.0]), "Degenerate interval");
    }

    #[test]
    fn initial_state_dimension_is_checked() {
        let system = decay();
        let mut rk4 = Integrator::runge_kutta4(&system, 0.1).unwrap();
        assert_err_contains(rk4.solve((0.0, 1.0), &[1.0, 2.0]), "Expected 1, got 2");
        assert_err_contains(rk4.step(0.0, &[], None), "Expected 1, got 0");
    }

    #[test]
    fn non_positive_step_sizes_are_rejected() {
        let system = decay();
        for h in [0.0, -0.0, -1e-12, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Integrator::euler(&system, h),
                Err(IntegratorError::InvalidStepSize(_))
            ));
            assert!(matches!(
                Integrator::runge_kutta4(&system, h),
                Err(IntegratorError::InvalidStepSize(_))
            ));
        }
    }

    #[test]
    fn failed_assignment_keeps_previous_step_size() {
        let system = decay();
        let mut rk4 = Integrator::runge_kutta4(&system, 0.1).unwrap();
        assert_eq!(
            rk4.set_step_size(-0.5),
            Err(IntegratorError::InvalidStepSize(-0.5))
        );
        assert_eq!(rk4.step_size(), 0.1);
        rk4.set_step_size(0.05).unwrap();
        assert_eq!(rk4.step_size(), 0.05);
    }

    #[test]
    fn step_override_only_applies_when_positive() {
        let system = decay();
        let mut euler = Integrator::euler(&system, 0.1).unwrap();
        assert_eq!(euler.step(0.0, &[1.0], None).unwrap(), vec![0.9]);
        assert_eq!(euler.step(0.0, &[1.0], Some(0.5)).unwrap(), vec![0.5]);
        assert_eq!(euler.step(0.0, &[1.0], Some(-0.5)).unwrap(), vec![0.9]);
        assert_eq!(euler.step(0.0, &[1.0], Some(0.0)).unwrap(), vec![0.9]);
    }

    #[test]
    fn rk4_is_more_accurate_and_both_converge() {
        let system = growth();
        let exact = 1.0_f64.exp();
        let error = |h: f64, rk: bool| {
            let trajectory = if rk {
                Integrator::runge_kutta4(&system, h)
                    .unwrap()
                    .solve((0.0, 1.0), &[1.0])
            } else {
                Integrator::euler(&system, h).unwrap().solve((0.0, 1.0), &[1.0])
            }
            .unwrap();
            (trajectory.last().unwrap().1[0] - exact).abs()
        };

        for h in [0.2, 0.1, 0.05] {
            assert!(error(h, true) < error(h, false));
        }
        assert!(error(0.05, false) < error(0.1, false));
        assert!(error(0.05, true) < error(0.1, true));
    }

    #[test]
    fn system_errors_pass_through_unchanged() {
        let system = fn_system(1, |t: f64, _y: &[f64], _out: &mut [f64]| {
            if t >= 0.5 {
                return Err(Singularity(t).into());
            }
            Ok(())
        });
        let mut euler = Integrator::euler(&system, 0.25).unwrap();

        let err = euler.solve((0.0, 1.0), &[1.0]).unwrap_err();
        let source = err.downcast_ref::<Singularity>().expect("original error type");
        assert_eq!(source.0, 0.5);

        let err = euler.step(0.75, &[1.0], None).unwrap_err();
        assert_eq!(err.to_string(), "singular at t = 0.75");
    }

    #[test]
    fn works_through_trait_objects() {
        let system = decay();
        let dynamic: &dyn OdeSystem<f64> = &system;
        let mut rk4 = Integrator::runge_kutta4(dynamic, 0.5).unwrap();
        let trajectory = rk4.solve((0.0, 1.0), &[1.0]).unwrap();
        assert_eq!(trajectory.len(), 3);
    }

    #[test]
    fn single_precision_scalars_are_supported() {
        let system = fn_system(1, |_t: f32, y: &[f32], out: &mut [f32]| {
            out[0] = -y[0];
            Ok(())
        });
        let mut rk4 = Integrator::runge_kutta4(&system, 0.1_f32).unwrap();
        let trajectory = rk4.solve((0.0, 1.0), &[1.0]).unwrap();
        let (t, y) = trajectory.last().unwrap();
        assert_eq!(t, 1.0);
        assert!((y[0] - (-1.0_f32).exp()).abs() < 1e-4);
    }

    proptest! {
        #[test]
        fn trajectory_bounds_are_exact(
            t_start in -50.0..50.0_f64,
            length in 1e-6..20.0_f64,
            h in 1e-3..2.0_f64,
        ) {
            let t_end = t_start + length;
            prop_assume!(t_end > t_start);
            let system = decay();
            let mut euler = Integrator::euler(&system, h).unwrap();
            let trajectory = euler.solve((t_start, t_end), &[1.0]).unwrap();

            prop_assert_eq!(trajectory.times[0], t_start);
            prop_assert_eq!(&trajectory.states[0], &vec![1.0]);
            prop_assert_eq!(*trajectory.times.last().unwrap(), t_end);
            prop_assert_eq!(trajectory.times.len(), trajectory.states.len());
            for window in trajectory.times.windows(2) {
                prop_assert!(window[1] > window[0]);
                prop_assert!(window[1] - window[0] <= h * (1.0 + 1e-9));
            }
        }

        #[test]
        fn steps_are_deterministic_and_preserve_dimension(
            t in -10.0..10.0_f64,
            y in proptest::collection::vec(-100.0..100.0_f64, 3),
            h in 1e-4..1.0_f64,
        ) {
            let system = fn_system(3, |t: f64, y: &[f64], out: &mut [f64]| {
                out[0] = y[1];
                out[1] = -y[0] * t.cos();
                out[2] = y[0] * y[1] - y[2];
                Ok(())
            });
            let mut rk4 = Integrator::runge_kutta4(&system, h).unwrap();
            let mut euler = Integrator::euler(&system, h).unwrap();

            let first = rk4.step(t, &y, None).unwrap();
            let second = rk4.step(t, &y, None).unwrap();
            prop_assert_eq!(first.len(), y.len());
            prop_assert_eq!(
                first.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                second.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
            prop_assert_eq!(euler.step(t, &y, None).unwrap().len(), y.len());
        }

        #[test]
        fn invalid_step_sizes_always_fail(h in -1e6..=0.0_f64) {
            let system = decay();
            prop_assert!(Integrator::euler(&system, h).is_err());
            let mut rk4 = Integrator::runge_kutta4(&system, 1.0).unwrap();
            prop_assert!(rk4.set_step_size(h).is_err());
            prop_assert_eq!(rk4.step_size(), 1.0);
        }
    }
}
