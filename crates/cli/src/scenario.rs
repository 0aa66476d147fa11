//! Synthetic catchments with the flow directions that come with them
//!
//! Directions are laid out by construction from the terrain shape, using
//! the D8 direction encoding of `runnel_core::graph` (1=E, 5=W, 6=SW,
//! 7=S, 8=SE). The bottom row leaves the domain.

use runnel_core::graph::FlowRouting;
use runnel_core::{GeoTransform, Raster, Result};

const EAST: u8 = 1;
const WEST: u8 = 5;
const SOUTH_WEST: u8 = 6;
const SOUTH: u8 = 7;
const SOUTH_EAST: u8 = 8;

/// Share of MFD flow sent straight downhill; the rest goes diagonally
const MFD_MAIN_SHARE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terrain {
    /// Plane dropping towards the bottom row
    Plane,
    /// Two side slopes meeting at a channel down the middle column
    VCatchment,
}

#[derive(Debug, Clone, Copy)]
pub struct Catchment {
    pub terrain: Terrain,
    pub rows: usize,
    pub cols: usize,
    /// Cell size (m)
    pub cell_size: f64,
    /// Downhill gradient towards the bottom row (m/m)
    pub slope: f64,
    /// Gradient of the V side slopes towards the middle column (m/m)
    pub side_slope: f64,
}

impl Catchment {
    fn center(&self) -> usize {
        self.cols / 2
    }

    /// Elevation raster. Row 0 is the top of the slope.
    pub fn elevation(&self) -> Result<Raster<f64>> {
        let mut dem = Raster::new(self.rows, self.cols);
        dem.set_transform(GeoTransform::new(
            0.0,
            self.rows as f64 * self.cell_size,
            self.cell_size,
            -self.cell_size,
        ));
        let center = self.center() as f64;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let mut z = (self.rows - row) as f64 * self.cell_size * self.slope;
                if self.terrain == Terrain::VCatchment {
                    z += (col as f64 - center).abs() * self.cell_size * self.side_slope;
                }
                dem.set(row, col, z)?;
            }
        }
        Ok(dem)
    }

    /// (direction code, share) pairs leaving a cell; empty for outlets
    fn outflows(&self, row: usize, col: usize, mfd: bool) -> Vec<(u8, f64)> {
        let last_row = row + 1 == self.rows;
        match self.terrain {
            Terrain::Plane => {
                if last_row {
                    return Vec::new();
                }
                if !mfd {
                    return vec![(SOUTH, 1.0)];
                }
                let side = (1.0 - MFD_MAIN_SHARE) / 2.0;
                let mut out = vec![(SOUTH, MFD_MAIN_SHARE)];
                if col > 0 {
                    out.push((SOUTH_WEST, side));
                }
                if col + 1 < self.cols {
                    out.push((SOUTH_EAST, side));
                }
                normalize(out)
            }
            Terrain::VCatchment => {
                let center = self.center();
                if col == center {
                    return if last_row { Vec::new() } else { vec![(SOUTH, 1.0)] };
                }
                let (across, diagonal) = if col < center {
                    (EAST, SOUTH_EAST)
                } else {
                    (WEST, SOUTH_WEST)
                };
                if !mfd || last_row {
                    vec![(across, 1.0)]
                } else {
                    vec![(across, MFD_MAIN_SHARE), (diagonal, 1.0 - MFD_MAIN_SHARE)]
                }
            }
        }
    }

    /// D8 codes (single direction) or MFD fraction rasters for the catchment
    pub fn routing(&self, mfd: bool) -> Result<FlowRouting> {
        if mfd {
            let mut fractions: [Raster<f64>; 8] =
                std::array::from_fn(|_| Raster::new(self.rows, self.cols));
            for row in 0..self.rows {
                for col in 0..self.cols {
                    for (code, share) in self.outflows(row, col, true) {
                        fractions[(code - 1) as usize].set(row, col, share)?;
                    }
                }
            }
            Ok(FlowRouting::Mfd(Box::new(fractions)))
        } else {
            let mut dirs = Raster::new(self.rows, self.cols);
            for row in 0..self.rows {
                for col in 0..self.cols {
                    if let Some(&(code, _)) = self.outflows(row, col, false).first() {
                        dirs.set(row, col, code)?;
                    }
                }
            }
            Ok(FlowRouting::D8(dirs))
        }
    }
}

fn normalize(mut out: Vec<(u8, f64)>) -> Vec<(u8, f64)> {
    let total: f64 = out.iter().map(|o| o.1).sum();
    for o in out.iter_mut() {
        o.1 /= total;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnel_core::graph::{GraphParams, GridTopology};

    fn catchment(terrain: Terrain) -> Catchment {
        Catchment {
            terrain,
            rows: 6,
            cols: 5,
            cell_size: 10.0,
            slope: 0.01,
            side_slope: 0.05,
        }
    }

    fn topology(c: &Catchment, mfd: bool) -> GridTopology {
        let dem = c.elevation().unwrap();
        GridTopology::new(&dem, &c.routing(mfd).unwrap(), GraphParams::default()).unwrap()
    }

    #[test]
    fn test_plane_outlets_on_bottom_row() {
        let c = catchment(Terrain::Plane);
        for mfd in [false, true] {
            let topo = topology(&c, mfd);
            let outlets: Vec<_> = topo.graph().outlets().collect();
            assert_eq!(outlets.len(), 5);
            for id in outlets {
                assert_eq!(topo.cell_of(id).unwrap().0, 5);
            }
        }
    }

    #[test]
    fn test_v_catchment_single_outlet() {
        let c = catchment(Terrain::VCatchment);
        for mfd in [false, true] {
            let topo = topology(&c, mfd);
            let outlets: Vec<_> = topo.graph().outlets().collect();
            assert_eq!(outlets, vec![topo.node_at(5, 2).unwrap()]);
        }
    }

    #[test]
    fn test_mfd_edge_cells_renormalized() {
        let c = catchment(Terrain::Plane);
        let shares = c.outflows(0, 0, true);
        assert_eq!(shares.len(), 2);
        let total: f64 = shares.iter().map(|s| s.1).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((shares[0].1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_d8_codes() {
        let c = catchment(Terrain::VCatchment);
        let FlowRouting::D8(dirs) = c.routing(false).unwrap() else {
            panic!("expected D8 routing");
        };
        assert_eq!(dirs.get(2, 0).unwrap(), EAST);
        assert_eq!(dirs.get(2, 4).unwrap(), WEST);
        assert_eq!(dirs.get(2, 2).unwrap(), SOUTH);
        assert_eq!(dirs.get(5, 2).unwrap(), 0);
    }
}
