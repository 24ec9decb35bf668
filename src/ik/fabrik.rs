//! Forward And Backward Reaching Inverse Kinematics.

use glam::Vec3;

/// Default solver iteration count.
pub const DEFAULT_ITERATIONS: usize = 10;
/// Default convergence tolerance in meters.
pub const DEFAULT_TOLERANCE: f32 = 1e-2;

/// FABRIK solver over a positional joint chain.
///
/// Chains are effector-first: index 0 is the joint moved onto the target,
/// the last index is the chain root, which stays pinned.
#[derive(Debug, Clone, Copy)]
pub struct FabrikSolver {
    iterations: usize,
    tolerance: f32,
}

impl Default for FabrikSolver {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl FabrikSolver {
    /// Solver with default iteration count and tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the iteration budget.
    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations.max(1);
    }

    /// Current iteration budget.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Solve the chain toward `target`, preserving segment lengths.
    ///
    /// Returns the adjusted joint positions in the input order. Chains of
    /// fewer than two joints are returned unchanged. Unreachable targets
    /// leave the chain fully extended toward the target.
    #[must_use]
    pub fn solve(&self, joints: &[Vec3], target: Vec3) -> Vec<Vec3> {
        let mut positions = joints.to_vec();
        if positions.len() < 2 {
            return positions;
        }

        let lengths: Vec<f32> = positions
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .collect();
        let root = positions[positions.len() - 1];

        for _ in 0..self.iterations {
            if positions[0].distance(target) <= self.tolerance {
                break;
            }

            // Forward pass: drag the effector onto the target, then pull
            // each parent to segment distance.
            positions[0] = target;
            for i in 1..positions.len() {
                let dir = (positions[i] - positions[i - 1]).normalize_or_zero();
                positions[i] = positions[i - 1] + dir * lengths[i - 1];
            }

            // Backward pass: re-pin the root and push children back out.
            let last = positions.len() - 1;
            positions[last] = root;
            for i in (0..last).rev() {
                let dir = (positions[i] - positions[i + 1]).normalize_or_zero();
                positions[i] = positions[i + 1] + dir * lengths[i];
            }
        }

        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg() -> Vec<Vec3> {
        // Foot, knee, hip: two segments of length 1.
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ]
    }

    fn segment_lengths(points: &[Vec3]) -> Vec<f32> {
        points.windows(2).map(|p| p[0].distance(p[1])).collect()
    }

    #[test]
    fn reachable_target_converges_within_tolerance() {
        let solver = FabrikSolver::new();
        let target = Vec3::new(0.8, 0.3, 0.2);
        let solved = solver.solve(&leg(), target);
        assert!(solved[0].distance(target) < DEFAULT_TOLERANCE);
    }

    #[test]
    fn root_stays_pinned() {
        let solver = FabrikSolver::new();
        let solved = solver.solve(&leg(), Vec3::new(1.0, 0.5, 0.0));
        assert!(solved[2].distance(Vec3::new(0.0, 2.0, 0.0)) < 1e-6);
    }

    #[test]
    fn segment_lengths_are_preserved() {
        let solver = FabrikSolver::new();
        let original = leg();
        let solved = solver.solve(&original, Vec3::new(1.2, 0.4, -0.3));
        let before = segment_lengths(&original);
        let after = segment_lengths(&solved);
        for (b, a) in before.iter().zip(&after) {
            assert!((b - a).abs() < 1e-4);
        }
    }

    #[test]
    fn unreachable_target_extends_chain() {
        let solver = FabrikSolver::new();
        let target = Vec3::new(10.0, 0.0, 0.0);
        let solved = solver.solve(&leg(), target);
        // Chain length is 2; the effector ends up on the line toward the
        // target at full extension.
        let root = solved[2];
        assert!((solved[0].distance(root) - 2.0).abs() < 1e-3);
        let dir = (target - root).normalize();
        let effector_dir = (solved[0] - root).normalize();
        assert!(dir.dot(effector_dir) > 0.999);
    }

    #[test]
    fn short_chains_are_returned_unchanged() {
        let solver = FabrikSolver::new();
        let single = vec![Vec3::ONE];
        assert_eq!(solver.solve(&single, Vec3::ZERO), single);
    }

    #[test]
    fn more_iterations_never_hurt() {
        let mut strict = FabrikSolver::new();
        strict.set_iterations(50);
        let target = Vec3::new(0.5, 1.2, 0.4);
        let d_default = FabrikSolver::new().solve(&leg(), target)[0].distance(target);
        let d_strict = strict.solve(&leg(), target)[0].distance(target);
        assert!(d_strict <= d_default + 1e-6);
    }
}
