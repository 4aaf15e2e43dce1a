//! Point-mass projectile
//!
//! A `Projectile` carries position, velocity, the acceleration derived on its
//! last update, a strictly positive mass, and a net-force accumulator.
//! Forces may be added concurrently through `&self`; the accumulator is
//! consumed and reset by [`Projectile::update`].

use std::sync::{Mutex, PoisonError};

use crate::error::{Result, SimError};
use crate::simulation::states::NVec3;

#[derive(Debug)]
pub struct Projectile {
    pub position: NVec3, // m
    pub velocity: NVec3, // m/s
    acceleration: NVec3, // derived from the force consumed by the last update
    net_force: Mutex<NVec3>, // sum of forces since the last update
    mass: f64, // kg, always > 0
}

impl Projectile {
    pub fn new(position: NVec3, velocity: NVec3, mass: f64) -> Result<Self> {
        validate_mass(mass)?;
        Ok(Self {
            position,
            velocity,
            acceleration: NVec3::zeros(),
            net_force: Mutex::new(NVec3::zeros()),
            mass,
        })
    }

    /// Body at rest at `position`
    pub fn at_rest(position: NVec3, mass: f64) -> Result<Self> {
        Self::new(position, NVec3::zeros(), mass)
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Replace the mass; the old value is kept when `mass` is not positive
    pub fn set_mass(&mut self, mass: f64) -> Result<()> {
        validate_mass(mass)?;
        self.mass = mass;
        Ok(())
    }

    pub fn acceleration(&self) -> NVec3 {
        self.acceleration
    }

    /// Force accumulated since the last update
    pub fn net_force(&self) -> NVec3 {
        *self.net_force.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `force` to the accumulator; safe to call from several threads
    pub fn add_force(&self, force: NVec3) {
        let mut net = self.net_force.lock().unwrap_or_else(PoisonError::into_inner);
        *net += force;
    }

    pub fn momentum(&self) -> NVec3 {
        self.velocity * self.mass
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }

    /// Position and velocity one tick of `dt` ahead if `extra` were added to
    /// the accumulated force
    pub fn predict(&self, extra: NVec3, dt: f64) -> (NVec3, NVec3) {
        let acceleration = (self.net_force() + extra) / self.mass;
        kinematic_step(&self.position, &self.velocity, &acceleration, dt)
    }

    /// Advance by `dt` under the accumulated force, then clear it
    ///
    /// State is left untouched if the step would produce a non-finite value;
    /// the accumulator is cleared either way.
    pub fn update(&mut self, dt: f64) -> Result<()> {
        let force = self.take_force();
        let acceleration = force / self.mass;
        let (position, velocity) = kinematic_step(&self.position, &self.velocity, &acceleration, dt);

        ensure_finite(&acceleration, "acceleration")?;
        ensure_finite(&velocity, "velocity")?;
        ensure_finite(&position, "position")?;

        self.commit(position, velocity, acceleration);
        Ok(())
    }

    /// Drain the accumulator, returning what it held
    pub(crate) fn take_force(&mut self) -> NVec3 {
        let net = self.net_force.get_mut().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(net, NVec3::zeros())
    }

    pub(crate) fn commit(&mut self, position: NVec3, velocity: NVec3, acceleration: NVec3) {
        self.position = position;
        self.velocity = velocity;
        self.acceleration = acceleration;
    }
}

impl Clone for Projectile {
    fn clone(&self) -> Self {
        Self {
            position: self.position,
            velocity: self.velocity,
            acceleration: self.acceleration,
            net_force: Mutex::new(self.net_force()),
            mass: self.mass,
        }
    }
}

/// x' = x + v·dt + ½a·dt², v' = v + a·dt
pub fn kinematic_step(position: &NVec3, velocity: &NVec3, acceleration: &NVec3, dt: f64) -> (NVec3, NVec3) {
    let new_position = position + velocity * dt + acceleration * (0.5 * dt * dt);
    let new_velocity = velocity + acceleration * dt;
    (new_position, new_velocity)
}

pub(crate) fn validate_mass(mass: f64) -> Result<()> {
    if mass > 0.0 && mass.is_finite() {
        Ok(())
    } else {
        Err(SimError::InvalidMass(mass))
    }
}

pub(crate) fn ensure_finite(v: &NVec3, quantity: &'static str) -> Result<()> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(SimError::NonFinite { quantity })
    }
}
