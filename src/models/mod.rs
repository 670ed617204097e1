pub mod location;
pub mod scan;

pub use location::{Location, LocationSource};
pub use scan::{ScanEntry, ScanSnapshot, WorkUnits};
