// Feed materialization - turns the flat node table into decorated trees.

pub mod limits;
pub mod materializer;

pub use limits::TraversalLimits;
pub use materializer::ThreadMaterializer;
