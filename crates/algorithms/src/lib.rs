//! # Runnel Algorithms
//!
//! Overland flow routing for Runnel.
//!
//! ## Available Algorithm Categories
//!
//! - **kinwave**: routing order, implicit kinematic-wave step solver,
//!   discharge calculation, runoff input conversion, hydrographs

pub mod kinwave;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::kinwave::{
        mm_per_hr_to_m_per_s, solve_in_order, Hydrograph, KinwaveImplicit, KinwaveParams,
        MassBalance, NonConvergence, RoutingOrder, Runoff, StepReport, SweepResult,
        DEPTH_FIELD, INFLOW_FIELD, OUTFLOW_FIELD,
    };
    pub use runnel_core::prelude::*;
    pub use runnel_parallel::ProcessingMode;
}
