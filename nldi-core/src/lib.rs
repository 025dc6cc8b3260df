//! Polygon queries against the NHDPlus hydrologic network.
//!
//! Given an area of interest, [`query::PolyQuery`] resolves the catchments
//! overlapping it, optionally traces the flowline network draining them,
//! and optionally collects stream gages inside and downstream of it.
pub mod aoi;
pub mod catchment;
#[cfg(feature = "api")]
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod flowline;
pub mod gage;
pub mod query;
pub mod services;

pub use error::{QueryError, Result};
