//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a runtime
//! [`Scenario`] containing:
//! - run parameters (`Parameters`)
//! - an engine (fixed-step or adaptive) with its bodies, forces, surfaces
//!   and stop conditions registered

use std::path::Path;

use tracing::info;

use crate::collision::surface::Surface;
use crate::collision::surface_force::SurfaceForce;
use crate::collision::triangle::{SurfaceTag, Triangle};
use crate::configuration::config::{BodyConfig, ForceConfig, ScenarioConfig, StopConfig, SurfaceConfig};
use crate::error::{Result, SimError};
use crate::simulation::adaptive::AdaptiveEngine;
use crate::simulation::constrained::{CirclePath, ConstrainedProjectile, LinePath};
use crate::simulation::engine::{KinematicsEngine, Stepper};
use crate::simulation::extended::{ExtendedProjectile, SolidBox, SolidSphere};
use crate::simulation::forces::{
    AirResistanceForce, ConstantForce, ConstantGravitationForce, FixedSpringForce, ProjectileBoundSpringForce,
    UniversalGravitationForce,
};
use crate::simulation::params::{AdaptiveParams, EngineParams, Parameters};
use crate::simulation::projectile::Projectile;
use crate::simulation::states::{Body, BodyId, NVec3};
use crate::simulation::stop::{CubeExitStopCondition, HitGroundStopCondition, TimeStopCondition};
use crate::simulation::telemetry::TelemetrySink;
use crate::simulation::trajectory;

/// Runtime bundle constructed from a [`ScenarioConfig`]
pub struct Scenario {
    pub parameters: Parameters,
    pub engine: Box<dyn Stepper>,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: usize,
    pub final_time: f64,
    pub halted: bool, // a stop condition ended the run before t_end
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> Result<Self> {
        // Parameters (runtime) from ParametersConfig
        let p_cfg = &cfg.parameters;
        if !(p_cfg.h0 > 0.0 && p_cfg.h0.is_finite()) {
            return Err(SimError::InvalidTimestep(p_cfg.h0));
        }
        if !p_cfg.t_end.is_finite() {
            return Err(SimError::InvalidConfig(format!("t_end must be finite, got {}", p_cfg.t_end)));
        }
        let parameters = Parameters {
            t_end: p_cfg.t_end,
            h0: p_cfg.h0,
            seed: p_cfg.seed,
        };

        let e_cfg = &cfg.engine;
        let mut engine = KinematicsEngine::new(EngineParams {
            parallel: e_cfg.parallel,
            contain_body_failures: e_cfg.contain_body_failures,
        });

        for bc in &cfg.bodies {
            engine.add_body(build_body(bc)?);
        }
        let n_bodies = engine.bodies().len();

        for fc in &cfg.forces {
            register_force(&mut engine, fc, n_bodies)?;
        }

        if !cfg.surfaces.is_empty() {
            let mut surfaces = SurfaceForce::new(parameters.seed);
            for sc in &cfg.surfaces {
                surfaces.add_surface(build_surface(sc)?);
            }
            engine.add_force(surfaces);
        }

        for sc in &cfg.stop {
            match *sc {
                StopConfig::Time { end } => engine.add_stop_condition(TimeStopCondition { end_time: end }),
                StopConfig::HitGround => engine.add_stop_condition(HitGroundStopCondition),
                StopConfig::CubeExit { max } => engine.add_stop_condition(CubeExitStopCondition { max }),
            }
        }

        let engine: Box<dyn Stepper> = if e_cfg.adaptive {
            let defaults = AdaptiveParams::default();
            let params = AdaptiveParams {
                tolerance: e_cfg.tolerance.unwrap_or(defaults.tolerance),
                time_tolerance: e_cfg.time_tolerance.unwrap_or(defaults.time_tolerance),
                min_step: e_cfg.min_step.unwrap_or(defaults.min_step),
            };
            Box::new(AdaptiveEngine::new(engine, params)?)
        } else {
            Box::new(engine)
        };

        info!(
            bodies = n_bodies,
            forces = cfg.forces.len(),
            surfaces = cfg.surfaces.len(),
            adaptive = e_cfg.adaptive,
            "scenario built"
        );
        Ok(Self { parameters, engine })
    }

    /// Step with `h0` until `t_end` or a stop condition, reporting every tick
    pub fn run(&mut self, sink: &mut dyn TelemetrySink) -> Result<RunSummary> {
        let mut ticks = 0;
        let mut halted = false;
        while self.engine.engine().time() < self.parameters.t_end {
            let keep_going = self.engine.increment(self.parameters.h0)?;
            ticks += 1;
            let engine = self.engine.engine();
            sink.record(engine.time(), engine.bodies());
            if !keep_going {
                halted = true;
                break;
            }
        }
        let final_time = self.engine.engine().time();
        info!(ticks, final_time, halted, "run finished");
        Ok(RunSummary { ticks, final_time, halted })
    }

    /// Record the whole run to `path` instead of reporting it
    pub fn preprocess(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        trajectory::preprocess(self.engine.as_mut(), path, self.parameters.t_end, self.parameters.h0)
    }
}

fn vec3(a: &[f64; 3]) -> NVec3 {
    NVec3::from(*a)
}

fn build_body(bc: &BodyConfig) -> Result<Body> {
    let body = match bc {
        BodyConfig::Point { x, v, m } => Projectile::new(vec3(x), vec3(v), *m)?.into(),
        BodyConfig::Frozen { x, m } => Body::frozen(vec3(x), *m)?,
        BodyConfig::Sphere { x, v, omega, m, radius } => {
            ExtendedProjectile::continuous(vec3(x), vec3(v), *m, SolidSphere { radius: *radius })?
                .with_angular_velocity(vec3(omega))
                .into()
        }
        BodyConfig::Box { x, v, omega, m, half_extents } => {
            ExtendedProjectile::continuous(vec3(x), vec3(v), *m, SolidBox { half_extents: vec3(half_extents) })?
                .with_angular_velocity(vec3(omega))
                .into()
        }
        BodyConfig::Aggregate { omega, points } => {
            let constituents = points
                .iter()
                .map(|p| Projectile::new(vec3(&p.x), vec3(&p.v), p.m))
                .collect::<Result<Vec<_>>>()?;
            ExtendedProjectile::discrete(constituents)?.with_angular_velocity(vec3(omega)).into()
        }
        BodyConfig::Line { x, v, m, start, end } => {
            let path = LinePath::new(vec3(start), vec3(end))?;
            ConstrainedProjectile::new(vec3(x), vec3(v), *m, path)?.into()
        }
        BodyConfig::Circle { x, v, m, center, radius, axis } => {
            let path = CirclePath::new(vec3(center), *radius, vec3(axis))?;
            ConstrainedProjectile::new(vec3(x), vec3(v), *m, path)?.into()
        }
    };
    Ok(body)
}

fn body_id(index: usize, n_bodies: usize) -> Result<BodyId> {
    if index < n_bodies {
        Ok(BodyId(index))
    } else {
        Err(SimError::UnknownBody(index))
    }
}

fn register_force(engine: &mut KinematicsEngine, fc: &ForceConfig, n_bodies: usize) -> Result<()> {
    match fc {
        ForceConfig::Gravity { field } => engine.add_force(ConstantGravitationForce { field: vec3(field) }),
        ForceConfig::Drag { coefficient } => engine.add_force(AirResistanceForce { coefficient: *coefficient }),
        ForceConfig::Constant { body, force } => engine.add_force(ConstantForce {
            body: body_id(*body, n_bodies)?,
            force: vec3(force),
        }),
        ForceConfig::Spring { body, k, anchor, rest_length, attachment } => engine.add_force(FixedSpringForce {
            body: body_id(*body, n_bodies)?,
            k: *k,
            anchor: vec3(anchor),
            rest_length: *rest_length,
            attachment: vec3(attachment),
        }),
        ForceConfig::BoundSpring { body, other, k, rest_length } => engine.add_force(ProjectileBoundSpringForce {
            body: body_id(*body, n_bodies)?,
            other: body_id(*other, n_bodies)?,
            k: *k,
            rest_length: *rest_length,
        }),
        ForceConfig::UniversalGravitation { big_g, eps2 } => engine.add_force(UniversalGravitationForce {
            big_g: *big_g,
            eps2: *eps2,
        }),
    }
    Ok(())
}

fn build_surface(sc: &SurfaceConfig) -> Result<Surface> {
    let mut surface = Surface::new(sc.elasticity, sc.friction);
    for [p1, p2, p3] in &sc.triangles {
        surface.add_triangle(Triangle::new(vec3(p1), vec3(p2), vec3(p3))?);
    }
    for [p1, p2, p3, p4] in &sc.quads {
        surface.add_quad(vec3(p1), vec3(p2), vec3(p3), vec3(p4), SurfaceTag::default())?;
    }
    Ok(surface)
}
