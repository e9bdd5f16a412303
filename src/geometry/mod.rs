//! Region geometry
//!
//! Everything here is pure: no records, no I/O.
//! - Regions are a union of closed polygons (concave allowed, disjoint allowed)
//! - Boundary points count as inside
//! - A spot is valid when a fixed constellation of samples around it is inside

pub mod path;
pub mod region;
pub mod validator;

pub use path::{PathError, parse_path_data};
pub use region::{Bounds, CanvasSize, Polygon, Region};
pub use validator::{SpotValidator, is_valid_spot, sample_offsets};
