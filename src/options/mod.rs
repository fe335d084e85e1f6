// ABOUTME: Declarative option/attribute model rendered into CLI flags.
// ABOUTME: Static schemas, override merging, and removable-option diffing.

mod removable;
mod schema;
mod value;

pub use removable::{PathSeg, RemovableDef, RemovableDiff, collect_path, diff};
pub use schema::{
    AttributeDef, DefaultValue, OptionDef, Overrides, Resolved, ResolvedOption, Schema, Scope,
    resolve,
};
pub use value::{OptionValue, shell_quote};
