//! Routing graph: an index-addressed arena of nodes and links
//!
//! Nodes carry elevation and contributing area; links carry the geometry
//! of one flow path (length, slope, width) and the share of the upstream
//! node's outflow routed along it. A node without outgoing links is an
//! outlet: water reaching it leaves the domain.
//!
//! The graph is validated once at construction. Fractions of every node's
//! outgoing links must sum to 1 within [`GraphParams::fraction_tolerance`].
//! Acyclicity is checked by the routing order builder, which runs before
//! any numeric work.

mod grid;

pub use grid::{BuildGridTopology, FlowRouting, GridTopology, D8_OFFSETS};

use crate::error::{Error, Result};

/// Index of a node in a [`RoutingGraph`]
pub type NodeId = usize;

/// Index of a link in a [`RoutingGraph`]
pub type LinkId = usize;

/// Parameters for routing graph validation
#[derive(Debug, Clone)]
pub struct GraphParams {
    /// Maximum allowed deviation of a node's outgoing fraction sum from 1.
    /// Default: 1e-6
    pub fraction_tolerance: f64,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            fraction_tolerance: 1e-6,
        }
    }
}

/// A location that stores water and routes it downstream
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    elevation: f64,
    area: f64,
    outgoing: Vec<LinkId>,
    incoming: Vec<LinkId>,
}

impl Node {
    /// Surface elevation (m)
    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    /// Contributing cell area (m²)
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Links leaving this node
    pub fn outgoing(&self) -> &[LinkId] {
        &self.outgoing
    }

    /// Links entering this node
    pub fn incoming(&self) -> &[LinkId] {
        &self.incoming
    }

    /// Whether this node is an outlet (no outgoing links)
    pub fn is_outlet(&self) -> bool {
        self.outgoing.is_empty()
    }
}

/// A directed flow path between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    upstream: NodeId,
    downstream: NodeId,
    length: f64,
    slope: f64,
    width: f64,
    fraction: f64,
    /// Slope was supplied by the caller rather than derived from elevations
    fixed_slope: bool,
}

impl Link {
    /// Node the link drains
    pub fn upstream(&self) -> NodeId {
        self.upstream
    }

    /// Node the link feeds
    pub fn downstream(&self) -> NodeId {
        self.downstream
    }

    /// Flow path length (m)
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Bed slope (m/m, non-negative)
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Flow width (m)
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Share of the upstream node's outflow sent along this link
    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

/// Validated routing graph
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingGraph {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl RoutingGraph {
    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// All nodes, indexed by [`NodeId`]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All links, indexed by [`LinkId`]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(Error::UnknownNode {
            node: id,
            nodes: self.nodes.len(),
        })
    }

    /// Get a link by id
    pub fn link(&self, id: LinkId) -> Result<&Link> {
        self.links
            .get(id)
            .ok_or_else(|| Error::invalid_parameter("link", id, "no such link"))
    }

    /// Whether `id` is an outlet node
    pub fn is_outlet(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_outlet)
    }

    /// Ids of all outlet nodes, in id order
    pub fn outlets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_outlet())
            .map(|(id, _)| id)
    }

    /// Node areas in id order
    pub fn areas(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.area).collect()
    }

    /// Replace node elevations and re-derive the slope of every link whose
    /// slope was not supplied explicitly.
    ///
    /// Any routing order computed from this graph must be invalidated by
    /// the caller afterwards; the solver component does this for you.
    pub fn set_elevations(&mut self, elevations: &[f64]) -> Result<()> {
        if elevations.len() != self.nodes.len() {
            return Err(Error::SizeMismatch {
                expected: self.nodes.len(),
                actual: elevations.len(),
            });
        }
        if let Some(z) = elevations.iter().find(|z| !z.is_finite()) {
            return Err(Error::invalid_parameter("elevation", z, "must be finite"));
        }

        // Validate every derived slope before touching anything
        let mut slopes = Vec::with_capacity(self.links.len());
        for link in &self.links {
            if link.fixed_slope {
                slopes.push(link.slope);
            } else {
                slopes.push(derived_slope(
                    elevations[link.upstream],
                    elevations[link.downstream],
                    link.length,
                )?);
            }
        }

        for (node, &z) in self.nodes.iter_mut().zip(elevations) {
            node.elevation = z;
        }
        for (link, slope) in self.links.iter_mut().zip(slopes) {
            link.slope = slope;
        }
        Ok(())
    }
}

fn derived_slope(z_up: f64, z_down: f64, length: f64) -> Result<f64> {
    let slope = (z_up - z_down) / length;
    if slope < 0.0 {
        return Err(Error::invalid_parameter(
            "slope",
            slope,
            "link runs uphill; flow directions must point downslope",
        ));
    }
    Ok(slope)
}

/// Incremental constructor for a [`RoutingGraph`]
///
/// ```
/// use runnel_core::graph::{GraphParams, RoutingGraphBuilder};
///
/// let mut builder = RoutingGraphBuilder::new();
/// let hill = builder.add_node(2.0, 100.0).unwrap();
/// let outlet = builder.add_node(1.0, 100.0).unwrap();
/// builder.add_link(hill, outlet, 10.0, 10.0, 1.0).unwrap();
/// let graph = builder.build(GraphParams::default()).unwrap();
/// assert!(graph.is_outlet(outlet));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoutingGraphBuilder {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl RoutingGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for nodes and links
    pub fn with_capacity(nodes: usize, links: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            links: Vec::with_capacity(links),
        }
    }

    /// Add a node with the given elevation (m) and contributing area (m²)
    pub fn add_node(&mut self, elevation: f64, area: f64) -> Result<NodeId> {
        if !elevation.is_finite() {
            return Err(Error::invalid_parameter("elevation", elevation, "must be finite"));
        }
        if !(area.is_finite() && area > 0.0) {
            return Err(Error::invalid_parameter("area", area, "must be positive"));
        }
        self.nodes.push(Node {
            elevation,
            area,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        });
        Ok(self.nodes.len() - 1)
    }

    /// Add a link whose slope is derived from the endpoint elevations.
    pub fn add_link(
        &mut self,
        upstream: NodeId,
        downstream: NodeId,
        length: f64,
        width: f64,
        fraction: f64,
    ) -> Result<LinkId> {
        self.check_node(upstream)?;
        self.check_node(downstream)?;
        check_length(length)?;
        let slope = derived_slope(
            self.nodes[upstream].elevation,
            self.nodes[downstream].elevation,
            length,
        )?;
        self.push_link(upstream, downstream, length, slope, width, fraction, false)
    }

    /// Add a link with an explicitly supplied slope.
    ///
    /// The slope is kept when elevations are later replaced.
    pub fn add_link_with_slope(
        &mut self,
        upstream: NodeId,
        downstream: NodeId,
        length: f64,
        slope: f64,
        width: f64,
        fraction: f64,
    ) -> Result<LinkId> {
        self.check_node(upstream)?;
        self.check_node(downstream)?;
        check_length(length)?;
        if !(slope.is_finite() && slope >= 0.0) {
            return Err(Error::invalid_parameter("slope", slope, "must be non-negative"));
        }
        self.push_link(upstream, downstream, length, slope, width, fraction, true)
    }

    /// Validate fractions and freeze the graph.
    pub fn build(self, params: GraphParams) -> Result<RoutingGraph> {
        for (id, node) in self.nodes.iter().enumerate() {
            if node.outgoing.is_empty() {
                continue;
            }
            let sum: f64 = node.outgoing.iter().map(|&l| self.links[l].fraction).sum();
            if (sum - 1.0).abs() > params.fraction_tolerance {
                return Err(Error::InvalidFractions { node: id, sum });
            }
        }

        Ok(RoutingGraph {
            nodes: self.nodes,
            links: self.links,
        })
    }

    fn check_node(&self, id: NodeId) -> Result<()> {
        if id >= self.nodes.len() {
            return Err(Error::UnknownNode {
                node: id,
                nodes: self.nodes.len(),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_link(
        &mut self,
        upstream: NodeId,
        downstream: NodeId,
        length: f64,
        slope: f64,
        width: f64,
        fraction: f64,
        fixed_slope: bool,
    ) -> Result<LinkId> {
        if !(width.is_finite() && width >= 0.0) {
            return Err(Error::invalid_parameter("width", width, "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::invalid_parameter("fraction", fraction, "must lie in [0, 1]"));
        }

        let id = self.links.len();
        self.links.push(Link {
            upstream,
            downstream,
            length,
            slope,
            width,
            fraction,
            fixed_slope,
        });
        self.nodes[upstream].outgoing.push(id);
        self.nodes[downstream].incoming.push(id);
        Ok(id)
    }
}

fn check_length(length: f64) -> Result<()> {
    if !(length.is_finite() && length > 0.0) {
        return Err(Error::invalid_parameter("length", length, "must be positive"));
    }
    Ok(())
}
