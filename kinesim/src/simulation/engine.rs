//! Fixed-step kinematics engine
//!
//! One tick of `increment(dt)`:
//! 1. advance the clock,
//! 2. run every accumulating force, then every corrective force,
//! 3. update every body under its accumulated force,
//! 4. advance the playback cursor of a loaded trajectory,
//! 5. ask the stop conditions whether to continue.

use std::path::Path;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{Result, SimError};
use crate::simulation::forces::{Force, ForceContext, ForceStage};
use crate::simulation::params::EngineParams;
use crate::simulation::projectile::Projectile;
use crate::simulation::states::{Body, BodyId, BodyState, NVec3};
use crate::simulation::stop::StopCondition;
use crate::simulation::trajectory::{self, Playback, PlaybackCursor};

/// Anything that advances a [`KinematicsEngine`] tick by tick
pub trait Stepper: Send {
    /// Advance by `dt`; `Ok(false)` once a stop condition halts the run
    fn increment(&mut self, dt: f64) -> Result<bool>;

    fn engine(&self) -> &KinematicsEngine;

    fn engine_mut(&mut self) -> &mut KinematicsEngine;
}

/// Everything needed to rewind an engine: clock, body states, playback cursor
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    time: f64,
    old_time: f64,
    bodies: Vec<BodyState>,
    cursor: Option<PlaybackCursor>,
}

pub struct KinematicsEngine {
    time: f64, // s
    old_time: f64, // clock before the last tick
    bodies: Vec<Body>,
    forces: Vec<Box<dyn Force>>,
    stop_conditions: Vec<Box<dyn StopCondition>>,
    params: EngineParams,
    playback: Option<Playback>,
}

impl Default for KinematicsEngine {
    fn default() -> Self {
        Self::new(EngineParams::default())
    }
}

impl KinematicsEngine {
    pub fn new(params: EngineParams) -> Self {
        Self {
            time: 0.0,
            old_time: 0.0,
            bodies: Vec::new(),
            forces: Vec::new(),
            stop_conditions: Vec::new(),
            params,
            playback: None,
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.old_time = time;
    }

    /// Length of the last tick
    pub fn delta_time(&self) -> f64 {
        self.time - self.old_time
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Result<&Body> {
        self.bodies.get(id.0).ok_or(SimError::UnknownBody(id.0))
    }

    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut Body> {
        self.bodies.get_mut(id.0).ok_or(SimError::UnknownBody(id.0))
    }

    pub fn add_body(&mut self, body: impl Into<Body>) -> BodyId {
        self.bodies.push(body.into());
        BodyId(self.bodies.len() - 1)
    }

    pub fn add_force<F: Force + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    /// Builder form of [`add_force`](Self::add_force)
    pub fn with<F: Force + 'static>(mut self, force: F) -> Self {
        self.add_force(force);
        self
    }

    pub fn add_stop_condition<C: StopCondition + 'static>(&mut self, condition: C) {
        self.stop_conditions.push(Box::new(condition));
    }

    /// `true` while every stop condition allows the run to continue
    pub fn should_continue(&self) -> bool {
        self.stop_conditions.iter().all(|c| c.should_continue(self))
    }

    /// Run one tick of length `dt`
    pub fn increment(&mut self, dt: f64) -> Result<bool> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::InvalidTimestep(dt));
        }
        self.old_time = self.time;
        self.time += dt;

        self.apply_forces(dt)?;
        self.update_bodies(dt)?;

        let time = self.time;
        if let Some(playback) = self.playback.as_mut() {
            playback.advance_to(time);
        }
        Ok(self.should_continue())
    }

    fn apply_forces(&self, dt: f64) -> Result<()> {
        let ctx = ForceContext {
            time: self.time,
            delta_time: dt,
            bodies: &self.bodies,
            preprocessed: self.preprocessed(),
        };
        let accumulate = |f: &&Box<dyn Force>| f.stage() == ForceStage::Accumulate;

        if self.params.parallel {
            self.forces.par_iter().filter(accumulate).try_for_each(|f| f.apply(&ctx))?;
        } else {
            self.forces.iter().filter(accumulate).try_for_each(|f| f.apply(&ctx))?;
        }
        // corrective forces see every other contribution
        self.forces
            .iter()
            .filter(|f| f.stage() == ForceStage::Corrective)
            .try_for_each(|f| f.apply(&ctx))
    }

    fn update_bodies(&mut self, dt: f64) -> Result<()> {
        let failures: Vec<(usize, SimError)> = if self.params.parallel {
            self.bodies
                .par_iter_mut()
                .enumerate()
                .filter_map(|(i, b)| b.update(dt).err().map(|e| (i, e)))
                .collect()
        } else {
            self.bodies
                .iter_mut()
                .enumerate()
                .filter_map(|(i, b)| b.update(dt).err().map(|e| (i, e)))
                .collect()
        };

        for (index, error) in failures {
            if !self.params.contain_body_failures {
                return Err(error);
            }
            warn!(body = index, time = self.time, %error, "body update failed; state kept for this tick");
        }
        Ok(())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            time: self.time,
            old_time: self.old_time,
            bodies: self.bodies.iter().map(Body::state).collect(),
            cursor: self.playback.as_ref().map(Playback::cursor),
        }
    }

    /// Rewind to `snapshot`; bodies added since it was taken are left alone
    pub fn restore(&mut self, snapshot: &EngineSnapshot) {
        self.time = snapshot.time;
        self.old_time = snapshot.old_time;
        for (body, state) in self.bodies.iter_mut().zip(&snapshot.bodies) {
            body.restore(state);
        }
        if let (Some(playback), Some(cursor)) = (self.playback.as_mut(), snapshot.cursor) {
            playback.seek(cursor);
        }
    }

    /// Run until `duration` or a stop condition, writing every tick to `path`
    pub fn preprocess(&mut self, path: impl AsRef<Path>, duration: f64, time_step: f64) -> Result<usize> {
        trajectory::preprocess(self, path, duration, time_step)
    }

    /// Load a recorded trajectory for playback; its bodies follow the engine
    /// clock from now on
    pub fn load_preprocessed(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut playback = Playback::load(path.as_ref())?;
        playback.advance_to(self.time);
        info!(
            path = %path.as_ref().display(),
            bodies = playback.bodies().len(),
            frames = playback.len(),
            "loaded trajectory"
        );
        self.playback = Some(playback);
        Ok(())
    }

    /// Playback bodies at the current clock
    pub fn preprocessed(&self) -> &[Projectile] {
        self.playback.as_ref().map(Playback::bodies).unwrap_or_default()
    }

    /// Every simulated body followed by every playback body
    pub fn all_projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.bodies.iter().map(Body::projectile).chain(self.preprocessed())
    }

    /// Mass of every simulated and playback body
    pub fn total_mass(&self) -> f64 {
        self.all_projectiles().map(Projectile::mass).sum()
    }

    /// Mass-weighted mean position; NaN for an empty engine
    pub fn cm_position(&self) -> NVec3 {
        self.mass_weighted(|p| p.position)
    }

    pub fn cm_velocity(&self) -> NVec3 {
        self.mass_weighted(|p| p.velocity)
    }

    pub fn cm_acceleration(&self) -> NVec3 {
        self.mass_weighted(Projectile::acceleration)
    }

    fn mass_weighted(&self, quantity: impl Fn(&Projectile) -> NVec3) -> NVec3 {
        let weighted: NVec3 = self.all_projectiles().map(|p| quantity(p) * p.mass()).sum();
        weighted / self.total_mass()
    }
}

impl Stepper for KinematicsEngine {
    fn increment(&mut self, dt: f64) -> Result<bool> {
        KinematicsEngine::increment(self, dt)
    }

    fn engine(&self) -> &KinematicsEngine {
        self
    }

    fn engine_mut(&mut self) -> &mut KinematicsEngine {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::forces::{ConstantForce, ConstantGravitationForce};
    use crate::simulation::stop::TimeStopCondition;
    use approx::assert_relative_eq;

    #[test]
    fn free_body_moves_linearly() {
        let mut engine = KinematicsEngine::default();
        let id = engine.add_body(Projectile::new(NVec3::zeros(), NVec3::new(1.0, 2.0, 0.0), 1.0).unwrap());
        for _ in 0..10 {
            assert!(engine.increment(0.1).unwrap());
        }
        assert_relative_eq!(engine.body(id).unwrap().position(), NVec3::new(1.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(engine.time(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(engine.delta_time(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn negative_step_is_rejected() {
        let mut engine = KinematicsEngine::default();
        assert!(matches!(engine.increment(-0.1), Err(SimError::InvalidTimestep(_))));
        assert!(matches!(engine.increment(f64::NAN), Err(SimError::InvalidTimestep(_))));
    }

    #[test]
    fn frozen_body_ignores_forces() {
        let mut engine = KinematicsEngine::default().with(ConstantGravitationForce { field: NVec3::new(0.0, 0.0, -9.8) });
        let id = engine.add_body(Body::frozen(NVec3::new(1.0, 1.0, 1.0), 5.0).unwrap());
        engine.increment(0.5).unwrap();
        assert_eq!(engine.body(id).unwrap().position(), NVec3::new(1.0, 1.0, 1.0));
        assert_eq!(engine.body(id).unwrap().projectile().net_force(), NVec3::zeros());
    }

    #[test]
    fn failing_body_is_contained_or_propagated() {
        let build = |contain| {
            let mut engine = KinematicsEngine::new(EngineParams { parallel: false, contain_body_failures: contain });
            let bad = engine.add_body(Projectile::at_rest(NVec3::zeros(), 1.0).unwrap());
            let good = engine.add_body(Projectile::new(NVec3::zeros(), NVec3::x(), 1.0).unwrap());
            engine.add_force(ConstantForce { body: bad, force: NVec3::new(f64::NAN, 0.0, 0.0) });
            (engine, bad, good)
        };

        let (mut engine, bad, good) = build(true);
        assert!(engine.increment(1.0).unwrap());
        assert_eq!(engine.body(bad).unwrap().position(), NVec3::zeros());
        assert_relative_eq!(engine.body(good).unwrap().position(), NVec3::x());

        let (mut engine, _, _) = build(false);
        assert!(matches!(engine.increment(1.0), Err(SimError::NonFinite { .. })));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut engine = KinematicsEngine::default().with(ConstantGravitationForce { field: NVec3::new(0.0, 0.0, -9.8) });
        engine.add_body(Projectile::new(NVec3::zeros(), NVec3::x(), 2.0).unwrap());
        engine.increment(0.1).unwrap();

        let snapshot = engine.snapshot();
        let before = engine.bodies()[0].state();
        engine.increment(0.3).unwrap();
        engine.restore(&snapshot);

        assert_eq!(engine.bodies()[0].state(), before);
        assert_relative_eq!(engine.time(), 0.1);
    }

    #[test]
    fn stop_conditions_are_combined() {
        let mut engine = KinematicsEngine::default();
        engine.add_body(Projectile::at_rest(NVec3::zeros(), 1.0).unwrap());
        engine.add_stop_condition(TimeStopCondition { end_time: 1.0 });
        engine.add_stop_condition(TimeStopCondition { end_time: 0.25 });
        assert!(engine.increment(0.2).unwrap());
        assert!(!engine.increment(0.2).unwrap());
    }

    #[test]
    fn center_of_mass_is_mass_weighted() {
        let mut engine = KinematicsEngine::default();
        assert!(engine.cm_position().x.is_nan());
        engine.add_body(Projectile::new(NVec3::zeros(), NVec3::x(), 1.0).unwrap());
        engine.add_body(Projectile::at_rest(NVec3::new(3.0, 0.0, 0.0), 2.0).unwrap());
        assert_relative_eq!(engine.cm_position(), NVec3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(engine.cm_velocity(), NVec3::new(1.0 / 3.0, 0.0, 0.0));
    }
}
