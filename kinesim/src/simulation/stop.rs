//! Stop conditions
//!
//! A condition is asked after every tick whether the run may continue; the
//! engine keeps going only while all of them agree.

use crate::simulation::engine::KinematicsEngine;

pub trait StopCondition: Send + Sync {
    /// `true` while the run may continue
    fn should_continue(&self, engine: &KinematicsEngine) -> bool;
}

/// Continue while the engine clock is before `end_time`
pub struct TimeStopCondition {
    pub end_time: f64,
}

impl StopCondition for TimeStopCondition {
    fn should_continue(&self, engine: &KinematicsEngine) -> bool {
        engine.time() < self.end_time
    }
}

/// Halt once any body is below the ground plane z = 0, or sits on it after
/// the start of the run
pub struct HitGroundStopCondition;

impl StopCondition for HitGroundStopCondition {
    fn should_continue(&self, engine: &KinematicsEngine) -> bool {
        let started = engine.time() > 0.0;
        !engine.bodies().iter().any(|b| {
            let z = b.position().z;
            z < 0.0 || (z == 0.0 && started)
        })
    }
}

/// Continue while at least one body is strictly inside the cube |x|,|y|,|z| < max
pub struct CubeExitStopCondition {
    pub max: f64,
}

impl StopCondition for CubeExitStopCondition {
    fn should_continue(&self, engine: &KinematicsEngine) -> bool {
        engine.bodies().iter().any(|b| b.position().iter().all(|c| c.abs() < self.max))
    }
}
