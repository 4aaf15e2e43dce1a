use std::time::Instant;

use crate::collision::surface::Surface;
use crate::collision::surface_force::SurfaceForce;
use crate::collision::triangle::SurfaceTag;
use crate::error::Result;
use crate::simulation::adaptive::AdaptiveEngine;
use crate::simulation::engine::KinematicsEngine;
use crate::simulation::forces::{ConstantGravitationForce, FixedSpringForce};
use crate::simulation::params::{AdaptiveParams, EngineParams};
use crate::simulation::projectile::Projectile;
use crate::simulation::states::NVec3;

/// Floor of `cells` × `cells` quads covering [-5, 5]² at z = 0
fn tiled_floor(cells: usize) -> Result<Surface> {
    let mut floor = Surface::new(0.7, 0.2);
    let size = 10.0 / cells as f64;
    for i in 0..cells {
        for j in 0..cells {
            let x0 = -5.0 + i as f64 * size;
            let y0 = -5.0 + j as f64 * size;
            floor.add_quad(
                NVec3::new(x0, y0, 0.0),
                NVec3::new(x0 + size, y0, 0.0),
                NVec3::new(x0 + size, y0 + size, 0.0),
                NVec3::new(x0, y0 + size, 0.0),
                SurfaceTag::default(),
            )?;
        }
    }
    Ok(floor)
}

/// Marbles dropped onto the floor, deterministic positions
fn marbles(engine: &mut KinematicsEngine, n: usize) -> Result<()> {
    for i in 0..n {
        let i_f = i as f64;
        let x = NVec3::new((i_f * 0.37).sin() * 4.0, (i_f * 0.13).cos() * 4.0, 0.5 + (i_f * 0.07).sin().abs());
        engine.add_body(Projectile::new(x, NVec3::new(0.3, -0.2, 0.0), 0.01)?);
    }
    Ok(())
}

/// Time per tick of the surface response against body and triangle counts
pub fn bench_surface_force() -> Result<()> {
    let steps = 200;
    println!("bodies,triangles,sequential_ms,parallel_ms");

    for n in [10, 100, 1000] {
        for cells in [1, 8, 32] {
            let mut per_tick = [0.0; 2];
            for (slot, parallel) in [false, true].into_iter().enumerate() {
                let mut engine = KinematicsEngine::new(EngineParams { parallel, contain_body_failures: true })
                    .with(ConstantGravitationForce { field: NVec3::new(0.0, 0.0, -9.8) })
                    .with(SurfaceForce::new(42).with_surface(tiled_floor(cells)?));
                marbles(&mut engine, n)?;

                let t0 = Instant::now();
                for _ in 0..steps {
                    engine.increment(0.005)?;
                }
                per_tick[slot] = t0.elapsed().as_secs_f64() * 1000.0 / steps as f64;
            }
            println!("{},{},{:.6},{:.6}", n, 2 * cells * cells, per_tick[0], per_tick[1]);
        }
    }
    Ok(())
}

/// Fixed fine stepping against adaptive stepping on a stiff spring
pub fn bench_adaptive() -> Result<()> {
    let duration = 1.0;

    let spring_engine = || -> Result<KinematicsEngine> {
        let mut engine = KinematicsEngine::default();
        let id = engine.add_body(Projectile::at_rest(NVec3::new(1.0, 0.0, 0.0), 1.0)?);
        engine.add_force(FixedSpringForce {
            body: id,
            k: 400.0,
            anchor: NVec3::zeros(),
            rest_length: 0.0,
            attachment: NVec3::zeros(),
        });
        Ok(engine)
    };

    // Fixed step
    for h in [1e-3, 1e-4, 1e-5] {
        let mut engine = spring_engine()?;
        let t0 = Instant::now();
        while engine.time() < duration {
            engine.increment(h)?;
        }
        let x = engine.bodies()[0].position().x;
        println!("fixed    h = {h:8.1e}, x = {x:+.6}, {:8.3} ms", t0.elapsed().as_secs_f64() * 1000.0);
    }

    // Adaptive, coarse outer step
    for tolerance in [1e-3, 1e-4, 1e-5] {
        let params = AdaptiveParams { tolerance, ..AdaptiveParams::default() };
        let mut adaptive = AdaptiveEngine::new(spring_engine()?, params)?;
        let mut divisions = 0;
        let t0 = Instant::now();
        while adaptive.engine().time() < duration {
            adaptive.increment(0.05)?;
            divisions += adaptive.n_divisions();
        }
        let x = adaptive.engine().bodies()[0].position().x;
        println!(
            "adaptive tol = {tolerance:6.1e}, x = {x:+.6}, {divisions:6} divisions, {:8.3} ms",
            t0.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(())
}
