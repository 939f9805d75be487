use narwhal::PhysicsOptions;
use narwhal::spatial::{Body, QuadTree, pair_force};

// Small LCG so the fixtures do not depend on the crate's own generator.
struct Lcg(u64);

impl Lcg {
    fn next_signed(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

fn jittered_grid(side: usize, spacing: f64) -> Vec<Body> {
    let mut rng = Lcg(7);
    let mut bodies = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            bodies.push(Body {
                x: i as f64 * spacing + rng.next_signed() * spacing * 0.2,
                y: j as f64 * spacing + rng.next_signed() * spacing * 0.2,
                mass: 1.0 + ((i * j) % 3) as f64,
                radius: 10.0,
            });
        }
    }
    bodies
}

fn direct_force(bodies: &[Body], target: usize, options: &PhysicsOptions) -> (f64, f64) {
    bodies
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != target)
        .fold((0.0, 0.0), |acc, (j, b)| {
            let (fx, fy) = pair_force(target, &bodies[target], j, b, options);
            (acc.0 + fx, acc.1 + fy)
        })
}

#[test]
fn root_mass_equals_the_sum_of_body_masses() {
    let bodies = jittered_grid(10, 100.0);
    let expected: f64 = bodies.iter().map(|b| b.mass).sum();
    let (ex, ey) = bodies.iter().fold((0.0, 0.0), |(sx, sy), b| {
        (sx + b.x * b.mass, sy + b.y * b.mass)
    });

    let mut tree = QuadTree::new();
    tree.build(bodies.iter().copied());
    assert_eq!(tree.len(), bodies.len());
    assert!((tree.total_mass() - expected).abs() < 1e-9);

    let (cx, cy) = tree.center_of_mass().unwrap();
    assert!((cx - ex / expected).abs() < 1e-9);
    assert!((cy - ey / expected).abs() < 1e-9);
}

#[test]
fn zero_theta_matches_the_direct_sum() {
    let bodies = jittered_grid(10, 100.0);
    let options = PhysicsOptions::default();
    let mut tree = QuadTree::new();
    tree.build(bodies.iter().copied());

    for target in 0..bodies.len() {
        let (bx, by) = tree.apply_repulsion(target, &options, 0.0);
        let (dx, dy) = direct_force(&bodies, target, &options);
        let scale = dx.hypot(dy).max(1.0);
        assert!((bx - dx).hypot(by - dy) / scale < 1e-9, "body {target}");
    }
}

#[test]
fn small_theta_stays_close_to_the_direct_sum() {
    let bodies = jittered_grid(10, 100.0);
    let options = PhysicsOptions::default();
    let mut tree = QuadTree::new();
    tree.build(bodies.iter().copied());

    let mut error = 0.0;
    let mut total = 0.0;
    for target in 0..bodies.len() {
        let (bx, by) = tree.apply_repulsion(target, &options, 0.3);
        let (dx, dy) = direct_force(&bodies, target, &options);
        error += (bx - dx).hypot(by - dy);
        total += dx.hypot(dy);
    }
    assert!(error / total < 0.05, "relative error {}", error / total);
}

#[test]
fn distant_cluster_acts_as_one_body() {
    let mut bodies = vec![Body {
        x: 0.0,
        y: 0.0,
        mass: 1.0,
        radius: 1.0,
    }];
    for (dx, dy) in [(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)] {
        bodies.push(Body {
            x: 1000.0 + dx,
            y: dy,
            mass: 1.0,
            radius: 1.0,
        });
    }
    let options = PhysicsOptions::default();
    let mut tree = QuadTree::new();
    tree.build(bodies.iter().copied());

    let (fx, fy) = tree.apply_repulsion(0, &options, 0.8);
    let expected = options.repulsion * 4.0 / 1000.0;
    assert!((fx + expected).abs() < 1e-4, "fx = {fx}");
    assert!(fy.abs() < 1e-9);
}
