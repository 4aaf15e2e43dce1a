//! Adaptive time stepping on top of [`KinematicsEngine`]
//!
//! Each requested step is tried once whole and once as two halves from the
//! same starting state. If the body positions disagree by more than the
//! tolerance the step is split and each half handled the same way. A trial
//! that trips a stop condition triggers a bisection for the largest step that
//! does not, so the run ends within `time_tolerance` of the event.

use tracing::debug;

use crate::error::{Result, SimError};
use crate::simulation::engine::{KinematicsEngine, Stepper};
use crate::simulation::params::AdaptiveParams;
use crate::simulation::states::NVec3;

/// Hook around the raw engine tick, for subclass-like extensions that need
/// to act on every trial or committed step
pub trait StepHook: Send {
    /// Tick used while measuring the error of a step; state is rewound afterwards
    fn trial_increment(&mut self, engine: &mut KinematicsEngine, dt: f64) -> Result<bool> {
        engine.increment(dt)
    }

    /// Tick used when a step is committed
    fn final_increment(&mut self, engine: &mut KinematicsEngine, dt: f64) -> Result<bool> {
        self.trial_increment(engine, dt)
    }
}

/// Plain engine ticks
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainIncrement;

impl StepHook for PlainIncrement {}

enum Trial {
    Completed(Vec<NVec3>), // body positions after the trial
    Crossed, // a stop condition tripped during the trial
}

enum Subdivision {
    Completed,
    Crossed { step: f64 }, // remaining step that trips a stop condition
}

pub struct AdaptiveEngine<H: StepHook = PlainIncrement> {
    engine: KinematicsEngine,
    params: AdaptiveParams,
    hook: H,
    n_divisions: usize, // subdivisions made by the last increment
}

impl AdaptiveEngine<PlainIncrement> {
    pub fn new(engine: KinematicsEngine, params: AdaptiveParams) -> Result<Self> {
        Self::with_hook(engine, params, PlainIncrement)
    }
}

impl<H: StepHook> AdaptiveEngine<H> {
    pub fn with_hook(engine: KinematicsEngine, params: AdaptiveParams, hook: H) -> Result<Self> {
        if !(params.tolerance > 0.0 && params.time_tolerance > 0.0 && params.min_step > 0.0) {
            return Err(SimError::InvalidConfig(format!("adaptive tolerances must be positive: {params:?}")));
        }
        Ok(Self { engine, params, hook, n_divisions: 0 })
    }

    pub fn params(&self) -> &AdaptiveParams {
        &self.params
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn n_divisions(&self) -> usize {
        self.n_divisions
    }

    pub fn engine(&self) -> &KinematicsEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut KinematicsEngine {
        &mut self.engine
    }

    pub fn into_inner(self) -> KinematicsEngine {
        self.engine
    }

    /// Advance by `dt`, subdividing as needed; `Ok(false)` once a stop
    /// condition halts the run
    pub fn increment(&mut self, dt: f64) -> Result<bool> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::InvalidTimestep(dt));
        }
        self.n_divisions = 0;
        match self.subdivide(dt)? {
            Subdivision::Completed => Ok(self.engine.should_continue()),
            Subdivision::Crossed { step } => {
                self.find_end_point(step)?;
                Ok(false)
            }
        }
    }

    fn subdivide(&mut self, dt: f64) -> Result<Subdivision> {
        let Some(difference) = self.difference_squared(dt)? else {
            return Ok(Subdivision::Crossed { step: dt });
        };

        let tolerance = self.params.tolerance;
        if difference < tolerance * tolerance || dt * 0.5 < self.params.min_step {
            self.hook.final_increment(&mut self.engine, dt)?;
            return Ok(Subdivision::Completed);
        }

        self.n_divisions += 1;
        debug!(time = self.engine.time(), dt, difference = difference.sqrt(), "subdividing step");
        let half = dt * 0.5;
        match self.subdivide(half)? {
            Subdivision::Completed => self.subdivide(half),
            crossed => Ok(crossed),
        }
    }

    /// Largest squared position mismatch between one step of `dt` and two of
    /// `dt / 2`; `None` if either trips a stop condition
    fn difference_squared(&mut self, dt: f64) -> Result<Option<f64>> {
        let Trial::Completed(whole) = self.trial(dt, 1)? else {
            return Ok(None);
        };
        let Trial::Completed(halves) = self.trial(dt, 2)? else {
            return Ok(None);
        };
        let worst = whole
            .iter()
            .zip(&halves)
            .map(|(a, b)| (a - b).norm_squared())
            .fold(0.0, f64::max);
        Ok(Some(worst))
    }

    /// Run `dt` as `steps` equal ticks and rewind
    fn trial(&mut self, dt: f64, steps: u32) -> Result<Trial> {
        let snapshot = self.engine.snapshot();
        let tick = dt / f64::from(steps);

        let mut outcome = Ok(true);
        for _ in 0..steps {
            outcome = self.hook.trial_increment(&mut self.engine, tick);
            if !matches!(outcome, Ok(true)) {
                break;
            }
        }
        let positions = self.engine.bodies().iter().map(|b| b.position()).collect();
        self.engine.restore(&snapshot);

        Ok(if outcome? { Trial::Completed(positions) } else { Trial::Crossed })
    }

    /// Bisect `[0, step]` for the largest tick that keeps every stop
    /// condition satisfied, then commit it
    fn find_end_point(&mut self, step: f64) -> Result<()> {
        let (mut lower, mut upper) = (0.0, step);
        while upper - lower > self.params.time_tolerance {
            let middle = 0.5 * (lower + upper);
            match self.trial(middle, 1)? {
                Trial::Completed(_) => lower = middle,
                Trial::Crossed => upper = middle,
            }
        }
        debug!(time = self.engine.time(), lower, upper, "stop event bracketed");
        if lower > 0.0 {
            self.hook.final_increment(&mut self.engine, lower)?;
        }
        Ok(())
    }
}

impl<H: StepHook> Stepper for AdaptiveEngine<H> {
    fn increment(&mut self, dt: f64) -> Result<bool> {
        AdaptiveEngine::increment(self, dt)
    }

    fn engine(&self) -> &KinematicsEngine {
        AdaptiveEngine::engine(self)
    }

    fn engine_mut(&mut self) -> &mut KinematicsEngine {
        AdaptiveEngine::engine_mut(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::forces::ConstantGravitationForce;
    use crate::simulation::projectile::Projectile;
    use crate::simulation::stop::TimeStopCondition;

    #[derive(Default)]
    struct CountingHook {
        trials: usize,
        commits: usize,
    }

    impl StepHook for CountingHook {
        fn trial_increment(&mut self, engine: &mut KinematicsEngine, dt: f64) -> Result<bool> {
            self.trials += 1;
            engine.increment(dt)
        }

        fn final_increment(&mut self, engine: &mut KinematicsEngine, dt: f64) -> Result<bool> {
            self.commits += 1;
            engine.increment(dt)
        }
    }

    #[test]
    fn uniform_field_needs_no_subdivision() {
        let mut engine = KinematicsEngine::default().with(ConstantGravitationForce { field: NVec3::new(0.0, 0.0, -9.8) });
        engine.add_body(Projectile::new(NVec3::zeros(), NVec3::new(3.0, 0.0, 4.0), 1.0).unwrap());
        let mut adaptive = AdaptiveEngine::with_hook(engine, AdaptiveParams::default(), CountingHook::default()).unwrap();

        assert!(adaptive.increment(0.5).unwrap());
        assert_eq!(adaptive.n_divisions(), 0);
        assert_eq!(adaptive.hook().trials, 3);
        assert_eq!(adaptive.hook().commits, 1);
        assert!((adaptive.engine().time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn time_stop_is_bracketed() {
        let mut engine = KinematicsEngine::default();
        engine.add_body(Projectile::new(NVec3::zeros(), NVec3::x(), 1.0).unwrap());
        engine.add_stop_condition(TimeStopCondition { end_time: 1.0 });
        let params = AdaptiveParams::default();
        let mut adaptive = AdaptiveEngine::new(engine, params).unwrap();

        let mut ticks = 0;
        while adaptive.increment(0.3).unwrap() {
            ticks += 1;
            assert!(ticks < 10);
        }
        let time = adaptive.engine().time();
        assert!(time < 1.0);
        assert!(1.0 - time <= params.time_tolerance, "stopped at {time}");
    }

    #[test]
    fn rejects_bad_tolerances() {
        let params = AdaptiveParams { tolerance: 0.0, ..AdaptiveParams::default() };
        assert!(AdaptiveEngine::new(KinematicsEngine::default(), params).is_err());
    }
}
