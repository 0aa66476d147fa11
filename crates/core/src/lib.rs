//! # Runnel Core
//!
//! Core types for the Runnel overland flow engine.
//!
//! This crate provides:
//! - `RoutingGraph`: arena of nodes and links with MFD routing fractions
//! - `GridTopology`: builds a routing graph from supplied flow-direction rasters
//! - `Raster<T>`: 2D grid container used for gridded inputs and outputs
//! - `GeoTransform`: cell geometry of a grid
//! - `Error`/`Result`: the error type shared by every Runnel crate

pub mod error;
pub mod graph;
pub mod raster;

pub use error::{Error, Result};
pub use graph::{
    GraphParams, GridTopology, Link, LinkId, Node, NodeId, RoutingGraph, RoutingGraphBuilder,
};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::graph::{
        GraphParams, GridTopology, Link, LinkId, Node, NodeId, RoutingGraph, RoutingGraphBuilder,
    };
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Core trait for algorithms that transform an input into an output.
///
/// Implemented by the stateless stages of the engine (graph construction,
/// routing order); the stateful solver exposes its own stepping API.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
