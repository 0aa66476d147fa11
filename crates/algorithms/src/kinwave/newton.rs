//! Per-node depth solve
//!
//! Finds h ≥ 0 with
//!
//! ```text
//! f(h)  = h + c·h_eff^p − b = 0
//! f'(h) = 1 + c·p·w·h_eff^(p−1)
//! h_eff = w·h + (1 − w)·h_old
//! ```
//!
//! by Newton–Raphson. With w = 1 this is the backward-Euler balance
//! h + c·h^p = b. f is strictly increasing for h ≥ 0, so there is at most
//! one root. With w < 1 and f(0) ≥ 0 the old depth alone would push out
//! at least the available water b: the node empties and h = 0.

use super::params::KinwaveParams;

/// Outcome of one node's depth solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSolve {
    /// Solved depth, floored at zero
    pub depth: f64,
    /// Newton iterations taken
    pub iterations: usize,
    /// |f(depth)| at exit
    pub residual: f64,
    /// Whether the residual met the tolerance
    pub converged: bool,
}

/// Solve for the new depth of one node.
///
/// * `h_old` - depth at the start of the step
/// * `c` - outflow coefficient (dt/A)·α·K
/// * `b` - h_old + dt·r + (dt/A)·Q_in
///
/// Never fails: when the iteration budget runs out the last iterate is
/// returned with `converged = false`.
pub fn solve_depth(h_old: f64, c: f64, b: f64, params: &KinwaveParams) -> DepthSolve {
    let h_old = h_old.max(0.0);

    // Nothing stored, nothing arriving
    if b <= 0.0 && h_old == 0.0 {
        return DepthSolve {
            depth: 0.0,
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }
    // No way out: everything stays
    if c == 0.0 {
        return DepthSolve {
            depth: b.max(0.0),
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let p = params.depth_exponent;
    let w = params.weight;
    let floor = params.min_initial_depth;
    let threshold = (params.tolerance * b).max(params.abs_tolerance);

    let h_eff = |h: f64| (w * h + (1.0 - w) * h_old).max(0.0);
    let f = |h: f64| h + c * h_eff(h).powf(p) - b;

    if f(0.0) >= 0.0 {
        return DepthSolve {
            depth: 0.0,
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let mut h = if h_old > floor { h_old } else { floor };
    let mut residual = f(h);
    let mut iterations = 0;

    while residual.abs() >= threshold && iterations < params.max_iterations {
        let slope = 1.0 + c * p * w * h_eff(h).max(floor).powf(p - 1.0);
        h = (h - residual / slope).max(0.0);
        residual = f(h);
        iterations += 1;
    }

    DepthSolve {
        depth: h.max(0.0),
        iterations,
        residual: residual.abs(),
        converged: residual.abs() < threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(n: f64) -> KinwaveParams {
        KinwaveParams {
            roughness: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_node() {
        // A = 100 m², S = 0.01, width = 10 m, n = 0.15, r = 87 mm/hr,
        // dt = 500 s, starting dry
        let p = params(0.15);
        let c = (500.0 / 100.0) * p.alpha() * 0.01_f64.sqrt() * 10.0;
        let b = 500.0 * 87.0 / 3.6e6;
        let s = solve_depth(0.0, c, b, &p);

        assert!(s.converged);
        assert_relative_eq!(s.depth, 0.005_815_122_864_146_4, max_relative = 1e-6);
        assert!(s.iterations <= 10);
    }

    #[test]
    fn test_dry_and_idle_is_exactly_zero() {
        let s = solve_depth(0.0, 5.0, 0.0, &params(0.1));
        assert_eq!(s.depth, 0.0);
        assert_eq!(s.iterations, 0);
        assert!(s.converged);
    }

    #[test]
    fn test_drainage_only_decreases_depth() {
        let p = params(0.05);
        let s = solve_depth(0.02, 3.0, 0.02, &p);
        assert!(s.converged);
        assert!(s.depth < 0.02 && s.depth > 0.0);
        // f(h) = 0 at the solution
        assert!((s.depth + 3.0 * s.depth.powf(5.0 / 3.0) - 0.02).abs() < 1e-7);
    }

    #[test]
    fn test_no_conveyance_keeps_everything() {
        let s = solve_depth(0.01, 0.0, 0.015, &params(0.1));
        assert_eq!(s.depth, 0.015);
        assert!(s.converged);
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let p = KinwaveParams {
            max_iterations: 1,
            tolerance: 1e-15,
            abs_tolerance: 0.0,
            ..params(0.15)
        };
        let s = solve_depth(0.0, 33.0, 0.012, &p);
        assert!(!s.converged);
        assert_eq!(s.iterations, 1);
        assert!(s.depth >= 0.0);
        assert!(s.residual > 0.0);
    }

    #[test]
    fn test_sub_linear_exponent_from_dry() {
        // p < 1: derivative blows up at h = 0 without the initial floor
        let p = KinwaveParams {
            depth_exponent: 0.5,
            ..params(0.1)
        };
        let s = solve_depth(0.0, 2.0, 0.01, &p);
        assert!(s.depth.is_finite());
        assert!(s.converged, "residual {}", s.residual);
        assert!((s.depth + 2.0 * s.depth.sqrt() - 0.01).abs() < 1e-7);
    }

    #[test]
    fn test_weighted_scheme_empties_node() {
        // c·(0.5·0.1)^(5/3) ≈ 0.41 > b = 0.1: no root with h ≥ 0
        let p = KinwaveParams {
            weight: 0.5,
            ..params(0.01)
        };
        let s = solve_depth(0.1, 60.0, 0.1, &p);
        assert_eq!(s.depth, 0.0);
        assert!(s.converged);
        assert_eq!(s.iterations, 0);
    }

    #[test]
    fn test_weighted_scheme() {
        let p = KinwaveParams {
            weight: 0.5,
            ..params(0.1)
        };
        let s = solve_depth(0.01, 4.0, 0.012, &p);
        assert!(s.converged);
        let h_eff = 0.5 * s.depth + 0.5 * 0.01;
        assert!((s.depth + 4.0 * h_eff.powf(5.0 / 3.0) - 0.012).abs() < 1e-7);
    }
}
