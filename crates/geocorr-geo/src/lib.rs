//! geocorr Geo - Projection of boreholes onto survey lines
//!
//! This crate holds the planar geometry of the registration step: the
//! coordinate projector, the borehole R-tree and the spatial matcher.

pub mod index;
pub mod matcher;
pub mod projection;

pub use index::BoreholeIndex;
pub use matcher::{accept, register_all, register_line, Registration};
pub use projection::{Projection, Projector};
