//! Models shared by the integration tests.

use std::path::PathBuf;

use econ_model_core::{ModelDefinition, ModelState, Settings};
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Default number of grid points.
pub const NA: i64 = 10;

/// Default number of periods.
pub const T: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SavingsError {
    #[error("grid needs at least two points, got {0}")]
    GridTooSmall(i64),
    #[error("number of periods must be positive, got {0}")]
    NoPeriods(i64),
}

/// A finite-horizon consumption-saving model.
///
/// `par` holds the primitives and the asset grid, `sol` the consumption and
/// value functions (`T x Na`), `sim` a seed and simulated assets, and the
/// extra `moments` namespace a summary statistic.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionSaving {
    /// Adds a text attribute `par.method`, which neither backend accepts.
    pub method: Option<String>,
    /// Declared as the model's native backend source.
    pub manifest: Option<PathBuf>,
}

impl ConsumptionSaving {
    #[must_use]
    pub fn with_method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_manifest(path: impl Into<PathBuf>) -> Self {
        Self {
            manifest: Some(path.into()),
            ..Self::default()
        }
    }
}

impl ModelDefinition for ConsumptionSaving {
    type Error = SavingsError;

    fn settings(&mut self, settings: &mut Settings) {
        settings.namespace("moments").other_attr("info", "baseline");
        if let Some(path) = &self.manifest {
            settings.native_backend_source(path.clone());
        }
    }

    fn setup(&mut self, state: &mut ModelState) -> Result<(), SavingsError> {
        let par = state.par_mut();
        par.set("beta", 0.96);
        par.set("rho", 2.0);
        par.set("Na", NA);
        par.set("a_max", 5.0);
        par.set("T", T);
        if let Some(method) = &self.method {
            par.set("method", method.as_str());
        }

        state.sim_mut().set("seed", 1917);
        if let Some(moments) = state.namespace_mut("moments") {
            moments.set("mean_a", 0.0);
        }
        Ok(())
    }

    fn allocate(&mut self, state: &mut ModelState) -> Result<(), SavingsError> {
        let par = state.par();
        let na = par.int("Na").unwrap_or_default();
        let t = par.int("T").unwrap_or_default();
        let a_max = par.float("a_max").unwrap_or(1.0);

        let na = usize::try_from(na)
            .ok()
            .filter(|&n| n >= 2)
            .ok_or(SavingsError::GridTooSmall(na))?;
        let t = usize::try_from(t)
            .ok()
            .filter(|&t| t > 0)
            .ok_or(SavingsError::NoPeriods(t))?;

        state.par_mut().set("grid_a", Array1::linspace(0.0, a_max, na));

        let sol = state.sol_mut();
        sol.set("c", Array2::<f64>::zeros((t, na)));
        sol.set("v", Array2::<f64>::zeros((t, na)));

        state.sim_mut().set("a", Array1::<f64>::zeros(t));
        Ok(())
    }
}
