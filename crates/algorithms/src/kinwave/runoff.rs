//! Runoff input
//!
//! Runoff intensity is supplied in millimeters per hour and converted to
//! meters per second by dividing by exactly 3.6×10⁶. Zero is a valid rate;
//! negative or non-finite rates are rejected before any state changes.

use runnel_core::{Error, GridTopology, Raster, Result};

/// mm/hr → m/s divisor: 1000 mm/m × 3600 s/hr
pub const MM_PER_HR_TO_M_PER_S_DIVISOR: f64 = 3.6e6;

/// Convert a runoff rate from mm/hr to m/s
pub fn mm_per_hr_to_m_per_s(rate: f64) -> f64 {
    rate / MM_PER_HR_TO_M_PER_S_DIVISOR
}

/// Runoff intensity for one time step, in mm/hr
#[derive(Debug, Clone, PartialEq)]
pub enum Runoff {
    /// Same rate on every node
    Uniform(f64),
    /// One rate per node, indexed by node id
    PerNode(Vec<f64>),
}

impl Runoff {
    /// No runoff anywhere
    pub fn none() -> Self {
        Runoff::Uniform(0.0)
    }

    /// Per-node rates sampled from a runoff raster laid over `topology`
    pub fn from_raster(topology: &GridTopology, rates: &Raster<f64>) -> Result<Self> {
        if rates.shape() != topology.shape() {
            let (rows, cols) = topology.shape();
            return Err(Error::SizeMismatch {
                expected: rows * cols,
                actual: rates.len(),
            });
        }
        let n = topology.graph().num_nodes();
        let mut per_node = Vec::with_capacity(n);
        for node in 0..n {
            let (row, col) = topology.cell_of(node)?;
            per_node.push(rates.get(row, col)?);
        }
        Ok(Runoff::PerNode(per_node))
    }

    /// Validate and convert to m/s for a graph of `nodes` nodes.
    pub fn to_m_per_s(&self, nodes: usize) -> Result<Vec<f64>> {
        match self {
            Runoff::Uniform(rate) => {
                check_rate(None, *rate)?;
                Ok(vec![mm_per_hr_to_m_per_s(*rate); nodes])
            }
            Runoff::PerNode(rates) => {
                if rates.len() != nodes {
                    return Err(Error::SizeMismatch {
                        expected: nodes,
                        actual: rates.len(),
                    });
                }
                rates
                    .iter()
                    .enumerate()
                    .map(|(node, &rate)| check_rate(Some(node), rate).map(|_| mm_per_hr_to_m_per_s(rate)))
                    .collect()
            }
        }
    }
}

fn check_rate(node: Option<usize>, rate: f64) -> Result<()> {
    if rate.is_nan() || rate.is_infinite() {
        return Err(Error::invalid_parameter("runoff", rate, "must be finite"));
    }
    if rate < 0.0 {
        return Err(Error::NegativeRunoff { node, rate });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(mm_per_hr_to_m_per_s(3.6e6), 1.0);
        assert_eq!(mm_per_hr_to_m_per_s(87.0), 87.0 / 3.6e6);
        assert_eq!(mm_per_hr_to_m_per_s(0.0), 0.0);
    }

    #[test]
    fn test_zero_is_accepted() {
        let rates = Runoff::none().to_m_per_s(3).unwrap();
        assert_eq!(rates, vec![0.0; 3]);
    }

    #[test]
    fn test_negative_rejected() {
        let err = Runoff::PerNode(vec![1.0, -0.5]).to_m_per_s(2).unwrap_err();
        assert_eq!(
            err,
            Error::NegativeRunoff {
                node: Some(1),
                rate: -0.5
            }
        );
        let err = Runoff::Uniform(-1.0).to_m_per_s(2).unwrap_err();
        assert_eq!(
            err,
            Error::NegativeRunoff {
                node: None,
                rate: -1.0
            }
        );
    }

    #[test]
    fn test_length_and_nan_rejected() {
        assert!(Runoff::PerNode(vec![1.0]).to_m_per_s(2).is_err());
        assert!(Runoff::Uniform(f64::NAN).to_m_per_s(2).is_err());
    }
}
