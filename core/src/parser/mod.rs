pub mod dependency;
pub mod header;
pub mod pipeline;
pub mod variables;

pub use dependency::parse_dependency;
pub use header::find_header_marker;
pub use pipeline::{split_line, Fragment, PipelineBuilder};
pub use variables::{TempResources, VariableExpander};
