//! Core state types for the kinematics engine.
//!
//! - `NVec3` / `NMat3` / `Rotation` nalgebra aliases used everywhere
//! - [`Body`] the closed set of body variants the engine steps
//! - [`BodyState`] a plain copy of one body's state, used for snapshots
//!
//! Each variant exposes its linear [`Projectile`] so forces, stop conditions
//! and the surface response can treat every body as a point mass.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::error::Result;
use crate::simulation::constrained::ConstrainedProjectile;
use crate::simulation::extended::ExtendedProjectile;
use crate::simulation::projectile::Projectile;

pub type NVec3 = Vector3<f64>;
pub type NMat3 = Matrix3<f64>;
pub type Rotation = UnitQuaternion<f64>;

/// Index of a body inside an engine, handed out by `add_body`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub usize);

#[derive(Debug)]
pub enum Body {
    Point(Projectile), // free point mass
    Frozen(Projectile), // never moves; forces on it are discarded
    Constrained(ConstrainedProjectile), // moves along a path
    Rigid(ExtendedProjectile), // rotating body
}

/// Copy of the mutable state of one body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub position: NVec3,
    pub velocity: NVec3,
    pub acceleration: NVec3,
    pub orientation: Rotation,
    pub angular_velocity: NVec3,
    pub parameter: f64, // path parameter, constrained bodies only
}

impl Body {
    /// Body pinned at `position`
    pub fn frozen(position: NVec3, mass: f64) -> Result<Self> {
        Ok(Self::Frozen(Projectile::at_rest(position, mass)?))
    }

    /// Linear (centre of mass) part of the body
    pub fn projectile(&self) -> &Projectile {
        match self {
            Self::Point(p) | Self::Frozen(p) => p,
            Self::Constrained(c) => c.linear(),
            Self::Rigid(r) => r.linear(),
        }
    }

    pub fn position(&self) -> NVec3 {
        self.projectile().position
    }

    pub fn velocity(&self) -> NVec3 {
        self.projectile().velocity
    }

    pub fn mass(&self) -> f64 {
        self.projectile().mass()
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, Self::Frozen(_))
    }

    pub fn as_rigid(&self) -> Option<&ExtendedProjectile> {
        match self {
            Self::Rigid(r) => Some(r),
            _ => None,
        }
    }

    /// Add a force through the centre of mass
    pub fn add_force(&self, force: NVec3) {
        self.projectile().add_force(force);
    }

    /// World position of the point at body-frame `offset`; only rigid
    /// bodies have extent, every other body answers with its position
    pub fn attachment(&self, offset: &NVec3) -> NVec3 {
        match self {
            Self::Rigid(r) => r.world_point(offset),
            _ => self.position(),
        }
    }

    /// Add a force acting at world `location`; rigid bodies pick up the torque
    pub fn add_force_at(&self, force: NVec3, location: NVec3) {
        match self {
            Self::Rigid(r) => r.add_force_at(force, location),
            _ => self.add_force(force),
        }
    }

    pub fn update(&mut self, dt: f64) -> Result<()> {
        match self {
            Self::Point(p) => p.update(dt),
            Self::Frozen(p) => {
                p.take_force();
                Ok(())
            }
            Self::Constrained(c) => c.update(dt),
            Self::Rigid(r) => r.update(dt),
        }
    }

    pub fn state(&self) -> BodyState {
        let p = self.projectile();
        let (orientation, angular_velocity) = match self {
            Self::Rigid(r) => (r.orientation, r.angular_velocity),
            _ => (Rotation::identity(), NVec3::zeros()),
        };
        let parameter = match self {
            Self::Constrained(c) => c.parameter(),
            _ => 0.0,
        };
        BodyState {
            position: p.position,
            velocity: p.velocity,
            acceleration: p.acceleration(),
            orientation,
            angular_velocity,
            parameter,
        }
    }

    /// Put the body back into `state` and clear its accumulators
    pub fn restore(&mut self, state: &BodyState) {
        let commit = |p: &mut Projectile| {
            p.take_force();
            p.commit(state.position, state.velocity, state.acceleration);
        };
        match self {
            Self::Point(p) | Self::Frozen(p) => commit(p),
            Self::Constrained(c) => {
                c.restore(state.parameter);
                commit(c.linear_mut());
            }
            Self::Rigid(r) => {
                commit(r.linear_mut());
                r.orientation = state.orientation;
                r.angular_velocity = state.angular_velocity;
                r.clear_torque();
                r.synchronize();
            }
        }
    }
}

impl From<Projectile> for Body {
    fn from(p: Projectile) -> Self {
        Self::Point(p)
    }
}

impl From<ConstrainedProjectile> for Body {
    fn from(c: ConstrainedProjectile) -> Self {
        Self::Constrained(c)
    }
}

impl From<ExtendedProjectile> for Body {
    fn from(r: ExtendedProjectile) -> Self {
        Self::Rigid(r)
    }
}
