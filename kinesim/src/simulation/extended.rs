//! Rigid (extended) bodies
//!
//! An [`ExtendedProjectile`] wraps a linear [`Projectile`] located at the
//! centre of mass and adds orientation, angular velocity and a torque
//! accumulator. Its mass distribution is supplied through the
//! [`MassDistribution`] trait:
//! - [`ContinuousBody`] derives the inertia tensor from a [`SolidShape`]
//! - [`DiscreteBody`] aggregates point constituents rigidly attached to the body

use std::fmt;
use std::sync::{Mutex, PoisonError};

use nalgebra::Matrix3;

use crate::error::{Result, SimError};
use crate::simulation::projectile::{ensure_finite, Projectile};
use crate::simulation::states::{NMat3, NVec3, Rotation};

/// Inertial description of a rigid body, expressed in the body frame
pub trait MassDistribution: Send + Sync + fmt::Debug {
    /// Inverse inertia tensor about the centre of mass
    fn inverse_inertia(&self) -> NMat3;

    /// Point constituents, if the body is made of any
    fn constituents(&self) -> &[Projectile] {
        &[]
    }

    /// Called after every rigid update and after a state restore so that
    /// derived data can follow the body
    fn synchronize(
        &mut self,
        _center: &NVec3,
        _velocity: &NVec3,
        _orientation: &Rotation,
        _angular_velocity: &NVec3,
    ) {
    }
}

/// Solid of uniform density, centred on the body origin
pub trait SolidShape: Send + Sync + fmt::Debug {
    /// Inertia tensor about the centre of mass for total mass `mass`
    fn inertia_tensor(&self, mass: f64) -> NMat3;
}

#[derive(Debug, Clone, Copy)]
pub struct SolidSphere {
    pub radius: f64, // m
}

impl SolidShape for SolidSphere {
    fn inertia_tensor(&self, mass: f64) -> NMat3 {
        NMat3::identity() * (0.4 * mass * self.radius * self.radius)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolidBox {
    pub half_extents: NVec3, // m, along the body axes
}

impl SolidShape for SolidBox {
    fn inertia_tensor(&self, mass: f64) -> NMat3 {
        let h = self.half_extents.component_mul(&self.half_extents);
        let k = mass / 3.0;
        NMat3::from_diagonal(&NVec3::new(k * (h.y + h.z), k * (h.x + h.z), k * (h.x + h.y)))
    }
}

/// Mass distribution backed by an analytic shape
#[derive(Debug)]
pub struct ContinuousBody {
    shape: Box<dyn SolidShape>,
    inverse_inertia: NMat3,
}

impl ContinuousBody {
    pub fn new<S: SolidShape + 'static>(shape: S, mass: f64) -> Result<Self> {
        let inverse_inertia = invert(&shape.inertia_tensor(mass))?;
        Ok(Self { shape: Box::new(shape), inverse_inertia })
    }

    pub fn shape(&self) -> &dyn SolidShape {
        self.shape.as_ref()
    }
}

impl MassDistribution for ContinuousBody {
    fn inverse_inertia(&self) -> NMat3 {
        self.inverse_inertia
    }
}

/// Mass distribution made of point masses held at fixed body-frame offsets
/// from the centre of mass
#[derive(Debug)]
pub struct DiscreteBody {
    offsets: Vec<NVec3>, // body frame, relative to the centre of mass
    constituents: Vec<Projectile>, // world-frame copies kept in sync with the body
    inverse_inertia: NMat3,
}

impl DiscreteBody {
    /// Returns the distribution together with the aggregate centre of mass,
    /// velocity and total mass
    fn from_constituents(constituents: Vec<Projectile>) -> Result<(Self, NVec3, NVec3, f64)> {
        if constituents.is_empty() {
            return Err(SimError::EmptyAggregate);
        }
        let mass: f64 = constituents.iter().map(Projectile::mass).sum();
        let center = constituents.iter().map(|c| c.position * c.mass()).sum::<NVec3>() / mass;
        let velocity = constituents.iter().map(Projectile::momentum).sum::<NVec3>() / mass;

        let offsets: Vec<NVec3> = constituents.iter().map(|c| c.position - center).collect();

        // I = Σ mᵢ (|rᵢ|² E − rᵢ rᵢᵀ)
        let inertia = constituents.iter().zip(&offsets).fold(NMat3::zeros(), |acc, (c, r)| {
            acc + (NMat3::identity() * r.norm_squared() - r * r.transpose()) * c.mass()
        });
        let inverse_inertia = invert(&inertia)?;

        Ok((Self { offsets, constituents, inverse_inertia }, center, velocity, mass))
    }
}

impl MassDistribution for DiscreteBody {
    fn inverse_inertia(&self) -> NMat3 {
        self.inverse_inertia
    }

    fn constituents(&self) -> &[Projectile] {
        &self.constituents
    }

    fn synchronize(
        &mut self,
        center: &NVec3,
        velocity: &NVec3,
        orientation: &Rotation,
        angular_velocity: &NVec3,
    ) {
        for (constituent, offset) in self.constituents.iter_mut().zip(&self.offsets) {
            let r = orientation * offset;
            constituent.position = center + r;
            constituent.velocity = velocity + angular_velocity.cross(&r);
        }
    }
}

/// Rigid body with linear and rotational state
#[derive(Debug)]
pub struct ExtendedProjectile {
    linear: Projectile, // centre of mass motion
    pub orientation: Rotation, // body frame -> world frame
    pub angular_velocity: NVec3, // rad/s, world frame
    angular_acceleration: NVec3, // derived on the last update
    net_torque: Mutex<NVec3>, // about the centre of mass, world frame
    distribution: Box<dyn MassDistribution>,
}

impl ExtendedProjectile {
    pub fn new(linear: Projectile, distribution: Box<dyn MassDistribution>) -> Result<Self> {
        // reject distributions whose tensor could not be inverted
        if !distribution.inverse_inertia().iter().all(|c| c.is_finite()) {
            return Err(SimError::SingularInertia);
        }
        let mut body = Self {
            linear,
            orientation: Rotation::identity(),
            angular_velocity: NVec3::zeros(),
            angular_acceleration: NVec3::zeros(),
            net_torque: Mutex::new(NVec3::zeros()),
            distribution,
        };
        body.synchronize();
        Ok(body)
    }

    /// Uniform solid centred on `position`
    pub fn continuous<S: SolidShape + 'static>(
        position: NVec3,
        velocity: NVec3,
        mass: f64,
        shape: S,
    ) -> Result<Self> {
        let linear = Projectile::new(position, velocity, mass)?;
        let distribution = ContinuousBody::new(shape, mass)?;
        Self::new(linear, Box::new(distribution))
    }

    /// Rigid aggregate of point masses; position, velocity and mass are
    /// derived from the constituents
    pub fn discrete(constituents: Vec<Projectile>) -> Result<Self> {
        let (distribution, center, velocity, mass) = DiscreteBody::from_constituents(constituents)?;
        let linear = Projectile::new(center, velocity, mass)?;
        Self::new(linear, Box::new(distribution))
    }

    pub fn with_angular_velocity(mut self, angular_velocity: NVec3) -> Self {
        self.angular_velocity = angular_velocity;
        self.synchronize();
        self
    }

    pub fn linear(&self) -> &Projectile {
        &self.linear
    }

    pub fn linear_mut(&mut self) -> &mut Projectile {
        &mut self.linear
    }

    pub fn constituents(&self) -> &[Projectile] {
        self.distribution.constituents()
    }

    pub fn center_of_mass(&self) -> NVec3 {
        self.linear.position
    }

    /// World position of a point fixed at body-frame `offset` from the
    /// centre of mass
    pub fn world_point(&self, offset: &NVec3) -> NVec3 {
        self.linear.position + self.orientation * offset
    }

    /// R·I⁻¹·Rᵀ
    pub fn inverse_inertia_world(&self) -> NMat3 {
        let r: Matrix3<f64> = self.orientation.to_rotation_matrix().into_inner();
        r * self.distribution.inverse_inertia() * r.transpose()
    }

    pub fn angular_acceleration(&self) -> NVec3 {
        self.angular_acceleration
    }

    pub fn net_torque(&self) -> NVec3 {
        *self.net_torque.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_torque(&self, torque: NVec3) {
        let mut net = self.net_torque.lock().unwrap_or_else(PoisonError::into_inner);
        *net += torque;
    }

    /// Force through the centre of mass
    pub fn add_force(&self, force: NVec3) {
        self.linear.add_force(force);
    }

    /// Force applied at world-frame `location`; contributes torque (location − com) × F
    pub fn add_force_at(&self, force: NVec3, location: NVec3) {
        self.linear.add_force(force);
        self.add_torque((location - self.center_of_mass()).cross(&force));
    }

    pub fn angular_momentum(&self) -> NVec3 {
        let r: Matrix3<f64> = self.orientation.to_rotation_matrix().into_inner();
        let inertia_world = invert(&self.distribution.inverse_inertia())
            .map(|inertia| r * inertia * r.transpose())
            .unwrap_or_else(|_| NMat3::zeros());
        inertia_world * self.angular_velocity
    }

    /// Linear and rotational update
    ///
    /// α = R·I⁻¹·Rᵀ·τ, ω' = ω + α·dt, and the orientation is right-multiplied
    /// by the rotation of angle |ω'|·dt about ω'. Nothing is committed unless
    /// both parts are finite; both accumulators are cleared either way.
    pub fn update(&mut self, dt: f64) -> Result<()> {
        let torque = {
            let net = self.net_torque.get_mut().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(net, NVec3::zeros())
        };

        let angular_acceleration = self.inverse_inertia_world() * torque;
        let angular_velocity = self.angular_velocity + angular_acceleration * dt;
        if let Err(error) = ensure_finite(&angular_velocity, "angular velocity") {
            self.linear.take_force();
            return Err(error);
        }

        self.linear.update(dt)?;

        self.orientation *= Rotation::from_scaled_axis(angular_velocity * dt);
        self.angular_acceleration = angular_acceleration;
        self.angular_velocity = angular_velocity;
        self.synchronize();
        Ok(())
    }

    /// Bring the distribution's derived data in line with the current state
    pub fn synchronize(&mut self) {
        let center = self.center_of_mass();
        let velocity = self.linear.velocity;
        self.distribution.synchronize(&center, &velocity, &self.orientation, &self.angular_velocity);
    }

    pub(crate) fn clear_torque(&mut self) {
        *self.net_torque.get_mut().unwrap_or_else(PoisonError::into_inner) = NVec3::zeros();
    }
}

fn invert(inertia: &NMat3) -> Result<NMat3> {
    const SINGULAR_EPS: f64 = 1e-12;
    let scale = inertia.abs().max().max(f64::MIN_POSITIVE);
    if inertia.determinant().abs() <= SINGULAR_EPS * scale.powi(3) {
        return Err(SimError::SingularInertia);
    }
    inertia.try_inverse().ok_or(SimError::SingularInertia)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn point(x: f64, y: f64, z: f64, m: f64) -> Projectile {
        Projectile::at_rest(NVec3::new(x, y, z), m).unwrap()
    }

    #[test]
    fn sphere_inertia() {
        let body =
            ExtendedProjectile::continuous(NVec3::zeros(), NVec3::zeros(), 5.0, SolidSphere { radius: 2.0 }).unwrap();
        // I = 2/5 m r² = 8
        assert_relative_eq!(body.inverse_inertia_world(), NMat3::identity() / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn discrete_aggregate_inertia() {
        // four unit masses on a square of side 2 in the xy plane
        let body = ExtendedProjectile::discrete(vec![
            point(1.0, 1.0, 0.0, 1.0),
            point(-1.0, 1.0, 0.0, 1.0),
            point(-1.0, -1.0, 0.0, 1.0),
            point(1.0, -1.0, 0.0, 1.0),
        ])
        .unwrap();

        assert_relative_eq!(body.linear().mass(), 4.0);
        assert_relative_eq!(body.center_of_mass(), NVec3::zeros(), epsilon = 1e-12);
        // Ixx = Σ m y² = 4, Iyy = 4, Izz = Σ m (x² + y²) = 8
        let expected = NMat3::from_diagonal(&NVec3::new(0.25, 0.25, 0.125));
        assert_relative_eq!(body.inverse_inertia_world(), expected, epsilon = 1e-12);
    }

    #[test]
    fn aggregate_construction_errors() {
        assert!(matches!(ExtendedProjectile::discrete(Vec::new()), Err(SimError::EmptyAggregate)));
        // collinear constituents have no inertia about their common axis
        let line = vec![point(-1.0, 0.0, 0.0, 1.0), point(1.0, 0.0, 0.0, 1.0)];
        assert!(matches!(ExtendedProjectile::discrete(line), Err(SimError::SingularInertia)));
    }

    #[test]
    fn off_center_force_spins_body() {
        let mut body =
            ExtendedProjectile::continuous(NVec3::zeros(), NVec3::zeros(), 1.0, SolidSphere { radius: 1.0 }).unwrap();
        body.add_force_at(NVec3::new(0.0, 1.0, 0.0), NVec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(body.net_torque(), NVec3::new(0.0, 0.0, 1.0));

        body.update(0.1).unwrap();
        // α = τ / (0.4) = 2.5 about z
        assert_relative_eq!(body.angular_velocity, NVec3::new(0.0, 0.0, 0.25), epsilon = 1e-12);
        assert_relative_eq!(body.linear().velocity, NVec3::new(0.0, 0.1, 0.0), epsilon = 1e-12);
        assert_eq!(body.net_torque(), NVec3::zeros());
    }

    #[test]
    fn constituents_follow_rotation() {
        let body = ExtendedProjectile::discrete(vec![
            point(1.0, 0.0, 0.0, 1.0),
            point(-1.0, 0.0, 0.0, 1.0),
            point(0.0, 0.0, 1.0, 1.0),
            point(0.0, 0.0, -1.0, 1.0),
        ])
        .unwrap();
        let mut body = body.with_angular_velocity(NVec3::new(0.0, 0.0, FRAC_PI_2));
        body.update(1.0).unwrap();

        // quarter turn about z takes +x to +y
        let first = body.constituents()[0].position;
        assert_relative_eq!(first, NVec3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(body.constituents()[0].velocity, NVec3::new(-FRAC_PI_2, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn world_point_turns_with_body() {
        let shape = SolidBox { half_extents: NVec3::new(1.0, 0.5, 0.5) };
        let mut body = ExtendedProjectile::continuous(NVec3::new(1.0, 0.0, 0.0), NVec3::zeros(), 1.0, shape)
            .unwrap()
            .with_angular_velocity(NVec3::new(0.0, 0.0, FRAC_PI_2));
        body.update(1.0).unwrap();

        assert_relative_eq!(body.world_point(&NVec3::new(1.0, 0.0, 0.0)), NVec3::new(1.0, 1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn non_finite_spin_leaves_body_untouched() {
        let mut body =
            ExtendedProjectile::continuous(NVec3::zeros(), NVec3::new(1.0, 0.0, 0.0), 2.0, SolidSphere { radius: 0.5 })
                .unwrap();
        body.add_force(NVec3::new(0.0, 4.0, 0.0));
        body.add_torque(NVec3::new(f64::NAN, 0.0, 0.0));

        assert!(matches!(body.update(0.1), Err(SimError::NonFinite { .. })));
        assert_eq!(body.linear().position, NVec3::zeros());
        assert_eq!(body.linear().velocity, NVec3::new(1.0, 0.0, 0.0));
        assert_eq!(body.angular_velocity, NVec3::zeros());
        assert_eq!(body.orientation, Rotation::identity());
        // both accumulators were drained
        assert_eq!(body.linear().net_force(), NVec3::zeros());
        assert_eq!(body.net_torque(), NVec3::zeros());
    }
}
