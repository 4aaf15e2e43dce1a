//! Numerical parameters for the engines
//!
//! - `EngineParams`   how the fixed-step engine runs a tick
//! - `AdaptiveParams` error and event tolerances of the adaptive engine
//! - `Parameters`     run length, step size and seed of a scenario

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub parallel: bool, // run accumulating forces and body updates on the rayon pool
    pub contain_body_failures: bool, // log and skip a failing body instead of aborting the tick
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            parallel: false,
            contain_body_failures: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveParams {
    pub tolerance: f64, // accepted position mismatch between one step and two half steps
    pub time_tolerance: f64, // width of the stop-event bisection bracket
    pub min_step: f64, // steps below this are accepted without further subdivision
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            time_tolerance: 0.001,
            min_step: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameters {
    pub t_end: f64, // time end
    pub h0: f64, // step size
    pub seed: u64, // seed for the surface fallback search
}
