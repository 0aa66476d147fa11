//! Discharge time series at one node

use runnel_core::{Error, NodeId, Result};

/// Discharge samples at a fixed node.
///
/// Each sample is the discharge at the end of a step and stands for the
/// whole step (backward Euler), so [`Hydrograph::volume`] integrates it
/// as a step function from the start time.
#[derive(Debug, Clone, PartialEq)]
pub struct Hydrograph {
    node: NodeId,
    start_time: f64,
    times: Vec<f64>,
    discharge: Vec<f64>,
}

impl Hydrograph {
    /// Empty hydrograph for `node`, with time counted from `start_time` (s)
    pub fn new(node: NodeId, start_time: f64) -> Self {
        Self {
            node,
            start_time,
            times: Vec::new(),
            discharge: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Append a sample. Times must increase strictly.
    pub fn record(&mut self, time: f64, discharge: f64) -> Result<()> {
        let last = self.times.last().copied().unwrap_or(self.start_time);
        if time.is_nan() || time <= last {
            return Err(Error::invalid_parameter(
                "time",
                time,
                format!("must be after the previous sample at {}", last),
            ));
        }
        self.times.push(time);
        self.discharge.push(discharge);
        Ok(())
    }

    /// Sample times (s)
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Sampled discharge (m³/s)
    pub fn discharge(&self) -> &[f64] {
        &self.discharge
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// (time, discharge) of the largest sample
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.times
            .iter()
            .zip(&self.discharge)
            .fold(None, |best: Option<(f64, f64)>, (&t, &q)| match best {
                Some((_, bq)) if bq >= q => best,
                _ => Some((t, q)),
            })
    }

    /// Total volume passed (m³)
    pub fn volume(&self) -> f64 {
        let mut previous = self.start_time;
        let mut volume = 0.0;
        for (&t, &q) in self.times.iter().zip(&self.discharge) {
            volume += q * (t - previous);
            previous = t;
        }
        volume
    }

    /// Iterate over (time, discharge) samples
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.discharge.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_and_volume() {
        let mut h = Hydrograph::new(3, 0.0);
        h.record(10.0, 1.0).unwrap();
        h.record(20.0, 3.0).unwrap();
        h.record(40.0, 2.0).unwrap();

        assert_eq!(h.peak(), Some((20.0, 3.0)));
        assert_eq!(h.volume(), 10.0 + 30.0 + 40.0);
        assert_eq!(h.len(), 3);
        assert_eq!(h.node(), 3);
    }

    #[test]
    fn test_times_must_increase() {
        let mut h = Hydrograph::new(0, 5.0);
        assert!(h.record(5.0, 1.0).is_err());
        h.record(6.0, 1.0).unwrap();
        assert!(h.record(6.0, 1.0).is_err());
    }

    #[test]
    fn test_empty() {
        let h = Hydrograph::new(0, 0.0);
        assert!(h.is_empty());
        assert_eq!(h.peak(), None);
        assert_eq!(h.volume(), 0.0);
    }
}
