pub mod adjustments;
pub mod fill;
pub mod filters;
pub mod transform;
