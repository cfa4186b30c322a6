use crate::error::IntegratorError;
use crate::traits::{OdeSystem, Scalar};
use anyhow::Result;
use nalgebra::{DMatrix, DVectorView, DVectorViewMut};
use std::marker::PhantomData;

/// Adapts a closure `f(t, y, out)` into an [`OdeSystem`].
pub struct FnSystem<T, F> {
    dim: usize,
    f: F,
    _scalar: PhantomData<fn(T)>,
}

impl<T, F> FnSystem<T, F>
where
    T: Scalar,
    F: Fn(T, &[T], &mut [T]) -> Result<()>,
{
    pub fn new(dim: usize, f: F) -> Self {
        Self {
            dim,
            f,
            _scalar: PhantomData,
        }
    }
}

/// Shorthand for [`FnSystem::new`].
pub fn fn_system<T, F>(dim: usize, f: F) -> FnSystem<T, F>
where
    T: Scalar,
    F: Fn(T, &[T], &mut [T]) -> Result<()>,
{
    FnSystem::new(dim, f)
}

impl<T, F> OdeSystem<T> for FnSystem<T, F>
where
    T: Scalar,
    F: Fn(T, &[T], &mut [T]) -> Result<()>,
{
    fn dimension(&self) -> usize {
        self.dim
    }

    fn apply(&self, t: T, y: &[T], out: &mut [T]) -> Result<()> {
        (self.f)(t, y, out)
    }
}

/// Autonomous linear system dy/dt = A y with a constant square matrix.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    matrix: DMatrix<f64>,
}

impl LinearSystem {
    pub fn new(matrix: DMatrix<f64>) -> Result<Self, IntegratorError> {
        if !matrix.is_square() {
            return Err(IntegratorError::InvalidSystem(format!(
                "linear system matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        Ok(Self { matrix })
    }

    /// Builds the system from row-major entries of a `dim x dim` matrix.
    pub fn from_row_slice(dim: usize, entries: &[f64]) -> Result<Self, IntegratorError> {
        let expected = dim.checked_mul(dim).ok_or_else(|| {
            IntegratorError::InvalidSystem(format!("matrix dimension {dim} is too large"))
        })?;
        if entries.len() != expected {
            return Err(IntegratorError::InvalidSystem(format!(
                "expected {} matrix entries, got {}",
                expected,
                entries.len()
            )));
        }
        Self::new(DMatrix::from_row_slice(dim, dim, entries))
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

impl OdeSystem<f64> for LinearSystem {
    fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&self, _t: f64, y: &[f64], out: &mut [f64]) -> Result<()> {
        let dim = self.dimension();
        let x = DVectorView::from_slice(y, dim);
        let mut dx = DVectorViewMut::from_slice(out, dim);
        dx.gemv(1.0, &self.matrix, &x, 0.0);
        Ok(())
    }
}
