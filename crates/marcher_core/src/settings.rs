use crate::error::IntegratorError;
use crate::integrator::{validate_step_size, Integrator};
use crate::solvers::{Euler, Scheme, RK4};
use crate::traits::{OdeSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Integration scheme selectable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Euler,
    RungeKutta4,
}

impl Method {
    fn scheme<T: Scalar>(self, dim: usize) -> Scheme<T> {
        match self {
            Method::Euler => Scheme::Euler(Euler::new(dim)),
            Method::RungeKutta4 => Scheme::Rk4(RK4::new(dim)),
        }
    }

    /// Builds an integrator for `system` using this scheme.
    pub fn build<'a, T, S>(
        self,
        system: &'a S,
        h: T,
    ) -> Result<Integrator<'a, T, S, Scheme<T>>, IntegratorError>
    where
        T: Scalar,
        S: OdeSystem<T> + ?Sized,
    {
        Integrator::with_scheme(system, h, self.scheme(system.dimension()))
    }

    /// System evaluations performed per step.
    pub fn evaluations_per_step(self) -> usize {
        match self {
            Method::Euler => 1,
            Method::RungeKutta4 => 4,
        }
    }

    /// Order of the global error.
    pub fn order(self) -> u32 {
        match self {
            Method::Euler => 1,
            Method::RungeKutta4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveSettings {
    pub method: Method,
    pub step_size: f64,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            method: Method::RungeKutta4,
            step_size: 0.01,
        }
    }
}

impl SolveSettings {
    pub fn validate(&self) -> Result<(), IntegratorError> {
        validate_step_size(self.step_size).map(|_| ())
    }

    pub fn build<'a, S>(
        &self,
        system: &'a S,
    ) -> Result<Integrator<'a, f64, S, Scheme<f64>>, IntegratorError>
    where
        S: OdeSystem<f64> + ?Sized,
    {
        self.method.build(system, self.step_size)
    }
}
