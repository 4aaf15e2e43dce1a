//! Force contributors for the kinematics engine
//!
//! Every force implements [`Force`] and adds its contribution into the
//! bodies' accumulators during a tick. Forces run in two stages:
//! - [`ForceStage::Accumulate`] ordinary forces, independent of each other
//!   and safe to run concurrently
//! - [`ForceStage::Corrective`] forces that read what the others accumulated
//!   (the surface response); run afterwards, one at a time

use crate::error::{Result, SimError};
use crate::simulation::projectile::Projectile;
use crate::simulation::states::{Body, BodyId, NVec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceStage {
    Accumulate,
    Corrective,
}

/// What a force sees while it is applied
pub struct ForceContext<'a> {
    pub time: f64, // time at the end of the tick being computed
    pub delta_time: f64, // length of the tick
    pub bodies: &'a [Body],
    pub preprocessed: &'a [Projectile], // playback bodies, empty without a loaded trajectory
}

impl<'a> ForceContext<'a> {
    pub fn body(&self, id: BodyId) -> Result<&'a Body> {
        self.bodies.get(id.0).ok_or(SimError::UnknownBody(id.0))
    }
}

/// A force law acting on some or all bodies
pub trait Force: Send + Sync {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()>;

    fn stage(&self) -> ForceStage {
        ForceStage::Accumulate
    }
}

/// Uniform field: F = m·g on every body
pub struct ConstantGravitationForce {
    pub field: NVec3, // m/s²
}

impl Force for ConstantGravitationForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        for body in ctx.bodies {
            body.add_force(self.field * body.mass());
        }
        Ok(())
    }
}

/// Quadratic drag: F = −c·|v|²·v̂
pub struct AirResistanceForce {
    pub coefficient: f64,
}

impl Force for AirResistanceForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        for body in ctx.bodies {
            let v = body.velocity();
            // |v|²·v̂ = |v|·v
            body.add_force(-v * (self.coefficient * v.norm()));
        }
        Ok(())
    }
}

/// Fixed force on a single body
pub struct ConstantForce {
    pub body: BodyId,
    pub force: NVec3, // N
}

impl Force for ConstantForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        ctx.body(self.body)?.add_force(self.force);
        Ok(())
    }
}

/// Hooke spring between a fixed anchor point and a point on a body
///
/// `attachment` is the body-frame offset of the spring's end from the centre
/// of mass. On a rigid body an off-centre attachment also produces torque.
pub struct FixedSpringForce {
    pub body: BodyId,
    pub k: f64, // N/m
    pub anchor: NVec3,
    pub rest_length: f64, // m
    pub attachment: NVec3,
}

impl Force for FixedSpringForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        let body = ctx.body(self.body)?;
        let end = body.attachment(&self.attachment);
        body.add_force_at(spring_force(self.k, self.rest_length, &(end - self.anchor)), end);
        Ok(())
    }
}

/// Hooke spring joining two bodies; equal and opposite forces
pub struct ProjectileBoundSpringForce {
    pub body: BodyId,
    pub other: BodyId,
    pub k: f64, // N/m
    pub rest_length: f64, // m
}

impl Force for ProjectileBoundSpringForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        let a = ctx.body(self.body)?;
        let b = ctx.body(self.other)?;
        let force = spring_force(self.k, self.rest_length, &(a.position() - b.position()));
        a.add_force(force);
        b.add_force(-force);
        Ok(())
    }
}

/// Pairwise Newtonian gravity with softening
/// Uses `eps2` to smooth close encounters and avoid singularities at small
/// separations. Playback bodies attract the simulated ones but are not
/// pulled back.
pub struct UniversalGravitationForce {
    pub big_g: f64, // gravitational constant
    pub eps2: f64, // softening
}

impl UniversalGravitationForce {
    /// Pull on a body of mass `m` at `x` towards a mass `other_m` at `other_x`
    fn pull(&self, x: &NVec3, m: f64, other_x: &NVec3, other_m: f64) -> NVec3 {
        let r = other_x - x;
        let r2 = r.norm_squared() + self.eps2;
        if r2 == 0.0 {
            return NVec3::zeros();
        }
        r * (self.big_g * m * other_m / (r2 * r2.sqrt()))
    }
}

impl Force for UniversalGravitationForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        let bodies = ctx.bodies;
        for (i, a) in bodies.iter().enumerate() {
            let (xa, ma) = (a.position(), a.mass());
            for b in &bodies[i + 1..] {
                let force = self.pull(&xa, ma, &b.position(), b.mass());
                a.add_force(force);
                b.add_force(-force);
            }
            for p in ctx.preprocessed {
                a.add_force(self.pull(&xa, ma, &p.position, p.mass()));
            }
        }
        Ok(())
    }
}

/// Restoring force for a spring currently spanning `offset` (from the far
/// end to the body)
fn spring_force(k: f64, rest_length: f64, offset: &NVec3) -> NVec3 {
    let length = offset.norm();
    if length == 0.0 {
        return NVec3::zeros();
    }
    -offset * (k * (length - rest_length) / length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::extended::{ExtendedProjectile, SolidBox};
    use approx::assert_relative_eq;

    fn bodies() -> Vec<Body> {
        vec![
            Projectile::new(NVec3::new(-1.0, 0.0, 0.0), NVec3::new(2.0, 0.0, 0.0), 2.0).unwrap().into(),
            Projectile::at_rest(NVec3::new(1.0, 0.0, 0.0), 3.0).unwrap().into(),
        ]
    }

    fn apply(force: &dyn Force, bodies: &[Body]) {
        let ctx = ForceContext { time: 0.0, delta_time: 0.1, bodies, preprocessed: &[] };
        force.apply(&ctx).unwrap();
    }

    #[test]
    fn gravity_field_scales_with_mass() {
        let bodies = bodies();
        apply(&ConstantGravitationForce { field: NVec3::new(0.0, 0.0, -9.8) }, &bodies);
        assert_relative_eq!(bodies[0].projectile().net_force(), NVec3::new(0.0, 0.0, -19.6));
        assert_relative_eq!(bodies[1].projectile().net_force(), NVec3::new(0.0, 0.0, -29.4));
    }

    #[test]
    fn drag_opposes_velocity() {
        let bodies = bodies();
        apply(&AirResistanceForce { coefficient: 0.5 }, &bodies);
        assert_relative_eq!(bodies[0].projectile().net_force(), NVec3::new(-2.0, 0.0, 0.0));
        assert_eq!(bodies[1].projectile().net_force(), NVec3::zeros());
    }

    #[test]
    fn bound_spring_is_symmetric() {
        let bodies = bodies();
        apply(&ProjectileBoundSpringForce { body: BodyId(0), other: BodyId(1), k: 10.0, rest_length: 1.0 }, &bodies);
        // stretched by 1 m: pulls the pair together with 10 N
        assert_relative_eq!(bodies[0].projectile().net_force(), NVec3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(bodies[1].projectile().net_force(), NVec3::new(-10.0, 0.0, 0.0));
    }

    #[test]
    fn off_centre_spring_twists_rigid_body() {
        let shape = SolidBox { half_extents: NVec3::new(0.5, 0.5, 0.5) };
        let cube = ExtendedProjectile::continuous(NVec3::zeros(), NVec3::zeros(), 1.0, shape).unwrap();
        let bodies = vec![Body::from(cube)];
        let spring = FixedSpringForce {
            body: BodyId(0),
            k: 2.0,
            anchor: NVec3::new(0.5, 1.0, 0.0),
            rest_length: 0.0,
            attachment: NVec3::new(0.5, 0.0, 0.0),
        };
        apply(&spring, &bodies);

        // stretched 1 m along +y from the corner at x = 0.5
        let rigid = bodies[0].as_rigid().unwrap();
        assert_relative_eq!(rigid.linear().net_force(), NVec3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(rigid.net_torque(), NVec3::new(0.0, 0.0, 1.0), epsilon = 1e-12);

        // point bodies ignore the attachment offset
        let points = self::bodies();
        apply(&FixedSpringForce { body: BodyId(1), ..spring }, &points);
        assert_relative_eq!(points[1].projectile().net_force(), NVec3::new(-1.0, 2.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn universal_gravitation_newton_third_law() {
        let bodies = bodies();
        apply(&UniversalGravitationForce { big_g: 1.0, eps2: 0.0 }, &bodies);
        let f0 = bodies[0].projectile().net_force();
        let f1 = bodies[1].projectile().net_force();
        assert_relative_eq!(f0 + f1, NVec3::zeros(), epsilon = 1e-12);
        // G m1 m2 / r² = 6 / 4
        assert_relative_eq!(f0, NVec3::new(1.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn unknown_body_is_an_error() {
        let bodies = bodies();
        let ctx = ForceContext { time: 0.0, delta_time: 0.1, bodies: &bodies, preprocessed: &[] };
        let force = ConstantForce { body: BodyId(7), force: NVec3::x() };
        assert!(matches!(force.apply(&ctx), Err(SimError::UnknownBody(7))));
    }
}
