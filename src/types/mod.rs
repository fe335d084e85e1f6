// ABOUTME: Validated value types used throughout relevo.
// ABOUTME: Entity names and container image references.

mod entity_name;
mod image_ref;

pub use entity_name::{EntityName, EntityNameError};
pub use image_ref::{ImageRef, ParseImageRefError};
