pub mod catalog;
pub mod registry;
pub mod spec;

pub use catalog::build_registry;
pub use registry::{RegistryError, ToolRegistry};
pub use spec::{ParamKind, ParamSpec, SideEffect, ToolDefinition, ToolSpec};
