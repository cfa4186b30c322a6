use crate::traits::{OdeSystem, Scalar, Steppable};
use anyhow::Result;

/// Explicit (forward) Euler solver.
pub struct Euler<T: Scalar> {
    k1: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(
        &mut self,
        system: &impl OdeSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<()> {
        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1)?;

        // y_next = y + dt * k1
        for i in 0..state.len() {
            state[i] = state[i] + dt * self.k1[i];
        }

        *t = t0 + dt;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "euler"
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(
        &mut self,
        system: &impl OdeSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<()> {
        let two = T::one() + T::one();
        let half_dt = dt / two;
        let sixth_dt = dt / (two + two + two);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1)?;

        // k2 = f(t + dt/2, y + dt/2 * k1)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half_dt * self.k1[i];
        }
        system.apply(t0 + half_dt, &self.tmp, &mut self.k2)?;

        // k3 = f(t + dt/2, y + dt/2 * k2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half_dt * self.k2[i];
        }
        system.apply(t0 + half_dt, &self.tmp, &mut self.k3)?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + sixth_dt * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rk4"
    }
}

/// Scheme chosen at runtime, see [`crate::settings::Method`].
pub enum Scheme<T: Scalar> {
    Euler(Euler<T>),
    Rk4(RK4<T>),
}

impl<T: Scalar> Steppable<T> for Scheme<T> {
    fn step(
        &mut self,
        system: &impl OdeSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<()> {
        match self {
            Scheme::Euler(s) => s.step(system, t, state, dt),
            Scheme::Rk4(s) => s.step(system, t, state, dt),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Scheme::Euler(s) => s.name(),
            Scheme::Rk4(s) => s.name(),
        }
    }
}
