//! Routing graphs from gridded flow directions
//!
//! Flow directions are supplied, never computed here: either a D8 code
//! raster or eight MFD fraction rasters (one per direction). Every valid
//! elevation cell becomes a node with area equal to the cell area.
//!
//! Direction encoding (shared with the D8 rasters this crate consumes):
//! ```text
//!   4  3  2
//!   5  0  1
//!   6  7  8
//! ```
//! 0 = no outflow. A cell coded 0, or whose D8 direction leaves the grid
//! or lands on a no-data cell, becomes an outlet.

use super::{GraphParams, NodeId, RoutingGraph, RoutingGraphBuilder};
use crate::error::{Error, Result};
use crate::raster::Raster;
use crate::Algorithm;

/// D8 neighbor offsets: (row_offset, col_offset)
/// Indexed to match the direction encoding (1=E, 2=NE, ..., 8=SE)
pub const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (-1, 1),  // 2: NE
    (-1, 0),  // 3: N
    (-1, -1), // 4: NW
    (0, -1),  // 5: W
    (1, -1),  // 6: SW
    (1, 0),   // 7: S
    (1, 1),   // 8: SE
];

/// Distance factors for each D8 direction (1.0 cardinal, sqrt(2) diagonal)
const D8_DIST: [f64; 8] = [
    1.0, std::f64::consts::SQRT_2, 1.0, std::f64::consts::SQRT_2,
    1.0, std::f64::consts::SQRT_2, 1.0, std::f64::consts::SQRT_2,
];

/// Flow width across each D8 direction, as a multiple of the cell size.
/// Cardinal flow crosses a full cell face; diagonal flow a corner.
const D8_WIDTH: [f64; 8] = [
    1.0, std::f64::consts::FRAC_1_SQRT_2, 1.0, std::f64::consts::FRAC_1_SQRT_2,
    1.0, std::f64::consts::FRAC_1_SQRT_2, 1.0, std::f64::consts::FRAC_1_SQRT_2,
];

/// Supplied flow-direction data for a grid
#[derive(Debug, Clone)]
pub enum FlowRouting {
    /// Single flow direction codes (0-8)
    D8(Raster<u8>),
    /// Per-direction outflow fractions, indexed like [`D8_OFFSETS`]
    Mfd(Box<[Raster<f64>; 8]>),
}

/// A routing graph laid over a raster grid
#[derive(Debug, Clone)]
pub struct GridTopology {
    rows: usize,
    cols: usize,
    template: Raster<f64>,
    /// Node id per cell (row-major), `None` for no-data cells
    node_of_cell: Vec<Option<NodeId>>,
    /// Cell (row, col) per node
    cell_of_node: Vec<(usize, usize)>,
    graph: RoutingGraph,
}

impl GridTopology {
    /// Build from an elevation raster and supplied flow directions.
    pub fn new(elevation: &Raster<f64>, routing: &FlowRouting, params: GraphParams) -> Result<Self> {
        let (rows, cols) = elevation.shape();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        match routing {
            FlowRouting::D8(dirs) => check_shape(elevation, dirs)?,
            FlowRouting::Mfd(fractions) => {
                for f in fractions.iter() {
                    check_shape(elevation, f)?;
                }
            }
        }

        let cell_size = elevation.cell_size();
        let area = elevation.cell_area();
        let mut builder = RoutingGraphBuilder::with_capacity(rows * cols, rows * cols);
        let mut node_of_cell = vec![None; rows * cols];
        let mut cell_of_node = Vec::with_capacity(rows * cols);

        for row in 0..rows {
            for col in 0..cols {
                let z = elevation.get(row, col)?;
                if elevation.is_nodata(z) {
                    continue;
                }
                let id = builder.add_node(z, area)?;
                node_of_cell[row * cols + col] = Some(id);
                cell_of_node.push((row, col));
            }
        }

        let neighbor = |row: usize, col: usize, idx: usize| -> Option<NodeId> {
            let (dr, dc) = D8_OFFSETS[idx];
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || (nr as usize) >= rows || (nc as usize) >= cols {
                return None;
            }
            node_of_cell[nr as usize * cols + nc as usize]
        };

        for (id, &(row, col)) in cell_of_node.iter().enumerate() {
            match routing {
                FlowRouting::D8(dirs) => {
                    let dir = dirs.get(row, col)?;
                    if dir == 0 {
                        continue;
                    }
                    if dir > 8 {
                        return Err(Error::invalid_parameter(
                            "flow_direction",
                            dir,
                            format!("invalid D8 code at ({}, {})", row, col),
                        ));
                    }
                    let idx = (dir - 1) as usize;
                    if let Some(target) = neighbor(row, col, idx) {
                        builder.add_link(
                            id,
                            target,
                            D8_DIST[idx] * cell_size,
                            D8_WIDTH[idx] * cell_size,
                            1.0,
                        )?;
                    }
                }
                FlowRouting::Mfd(fractions) => {
                    for idx in 0..8 {
                        let fraction = fractions[idx].get(row, col)?;
                        if fraction == 0.0 || fraction.is_nan() {
                            continue;
                        }
                        let target = neighbor(row, col, idx).ok_or_else(|| {
                            Error::invalid_parameter(
                                "fraction",
                                fraction,
                                format!(
                                    "cell ({}, {}) routes flow off the grid in direction {}",
                                    row,
                                    col,
                                    idx + 1
                                ),
                            )
                        })?;
                        builder.add_link(
                            id,
                            target,
                            D8_DIST[idx] * cell_size,
                            D8_WIDTH[idx] * cell_size,
                            fraction,
                        )?;
                    }
                }
            }
        }

        let graph = builder.build(params)?;
        tracing::debug!(
            "grid topology {}x{}: {} nodes, {} links",
            rows,
            cols,
            graph.num_nodes(),
            graph.num_links()
        );

        Ok(Self {
            rows,
            cols,
            template: elevation.with_same_meta::<f64>(rows, cols),
            node_of_cell,
            cell_of_node,
            graph,
        })
    }

    /// Grid dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// The routing graph
    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    /// Consume the topology and return the routing graph
    pub fn into_graph(self) -> RoutingGraph {
        self.graph
    }

    /// Node id at (row, col), `None` for no-data or out-of-range cells
    pub fn node_at(&self, row: usize, col: usize) -> Option<NodeId> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.node_of_cell[row * self.cols + col]
    }

    /// Cell (row, col) of a node
    pub fn cell_of(&self, node: NodeId) -> Result<(usize, usize)> {
        self.cell_of_node.get(node).copied().ok_or(Error::UnknownNode {
            node,
            nodes: self.cell_of_node.len(),
        })
    }

    /// Lay a per-node field back onto the grid. No-data cells get NaN.
    pub fn field_to_raster(&self, field: &[f64]) -> Result<Raster<f64>> {
        if field.len() != self.cell_of_node.len() {
            return Err(Error::SizeMismatch {
                expected: self.cell_of_node.len(),
                actual: field.len(),
            });
        }
        let mut out = self.template.like(f64::NAN);
        out.set_nodata(Some(f64::NAN));
        for (&(row, col), &value) in self.cell_of_node.iter().zip(field) {
            out.set(row, col, value)?;
        }
        Ok(out)
    }
}

fn check_shape<T: crate::raster::RasterElement>(
    elevation: &Raster<f64>,
    other: &Raster<T>,
) -> Result<()> {
    if elevation.shape() != other.shape() {
        return Err(Error::SizeMismatch {
            expected: elevation.len(),
            actual: other.len(),
        });
    }
    Ok(())
}

/// Routing graph construction from gridded flow directions
#[derive(Debug, Clone, Default)]
pub struct BuildGridTopology;

impl Algorithm for BuildGridTopology {
    type Input = (Raster<f64>, FlowRouting);
    type Output = GridTopology;
    type Params = GraphParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Grid Topology"
    }

    fn description(&self) -> &'static str {
        "Build a routing graph from an elevation raster and supplied flow directions"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (elevation, routing) = input;
        GridTopology::new(&elevation, &routing, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    fn strip(cols: usize) -> (Raster<f64>, Raster<u8>) {
        // 1 x cols strip sloping east, every cell flows E
        let mut dem = Raster::new(1, cols);
        dem.set_transform(GeoTransform::new(0.0, 1.0, 10.0, -10.0));
        let mut dirs = Raster::new(1, cols);
        for col in 0..cols {
            dem.set(0, col, (cols - col) as f64).unwrap();
            dirs.set(0, col, 1).unwrap();
        }
        (dem, dirs)
    }

    #[test]
    fn test_d8_strip() {
        let (dem, dirs) = strip(4);
        let topo = GridTopology::new(&dem, &FlowRouting::D8(dirs), GraphParams::default()).unwrap();
        let g = topo.graph();

        assert_eq!(g.num_nodes(), 4);
        // Last cell points off-grid: outlet
        assert_eq!(g.num_links(), 3);
        assert_eq!(g.outlets().collect::<Vec<_>>(), vec![3]);

        let link = g.link(0).unwrap();
        assert_eq!((link.upstream(), link.downstream()), (0, 1));
        assert_relative_eq!(link.length(), 10.0);
        assert_relative_eq!(link.width(), 10.0);
        assert_relative_eq!(link.slope(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(g.node(2).unwrap().area(), 100.0);
    }

    #[test]
    fn test_nodata_cells_are_skipped() {
        let (mut dem, dirs) = strip(4);
        dem.set_nodata(Some(-9999.0));
        dem.set(0, 2, -9999.0).unwrap();
        let topo = GridTopology::new(&dem, &FlowRouting::D8(dirs), GraphParams::default()).unwrap();

        assert_eq!(topo.graph().num_nodes(), 3);
        assert_eq!(topo.node_at(0, 2), None);
        assert_eq!(topo.node_at(0, 3), Some(2));
        // Cell 1 drains into the gap and becomes an outlet
        assert!(topo.graph().is_outlet(1));
    }

    #[test]
    fn test_mfd_split() {
        // 2x2: top-left splits S and E, the rest are outlets
        let mut dem = Raster::new(2, 2);
        dem.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        dem.set(0, 0, 3.0).unwrap();
        dem.set(0, 1, 2.0).unwrap();
        dem.set(1, 0, 2.0).unwrap();
        dem.set(1, 1, 1.0).unwrap();

        let mut fractions: [Raster<f64>; 8] = std::array::from_fn(|_| Raster::new(2, 2));
        fractions[0].set(0, 0, 0.25).unwrap(); // E
        fractions[6].set(0, 0, 0.75).unwrap(); // S

        let topo = GridTopology::new(
            &dem,
            &FlowRouting::Mfd(Box::new(fractions)),
            GraphParams::default(),
        )
        .unwrap();
        let node = topo.graph().node(0).unwrap();
        assert_eq!(node.outgoing().len(), 2);
        let total: f64 = node
            .outgoing()
            .iter()
            .map(|&l| topo.graph().link(l).unwrap().fraction())
            .sum();
        assert_relative_eq!(total, 1.0);
    }

    #[test]
    fn test_mfd_off_grid_rejected() {
        let (dem, _) = strip(2);
        let mut fractions: [Raster<f64>; 8] = std::array::from_fn(|_| Raster::new(1, 2));
        fractions[2].set(0, 0, 1.0).unwrap(); // N, off the grid
        let result = GridTopology::new(
            &dem,
            &FlowRouting::Mfd(Box::new(fractions)),
            GraphParams::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_field_to_raster() {
        let (dem, dirs) = strip(3);
        let topo = BuildGridTopology
            .execute((dem, FlowRouting::D8(dirs)), GraphParams::default())
            .unwrap();
        let raster = topo.field_to_raster(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(raster.shape(), (1, 3));
        assert_relative_eq!(raster.get(0, 2).unwrap(), 3.0);
        assert!(topo.field_to_raster(&[1.0]).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let (dem, _) = strip(3);
        let dirs: Raster<u8> = Raster::new(2, 3);
        assert!(GridTopology::new(&dem, &FlowRouting::D8(dirs), GraphParams::default()).is_err());
    }
}
