pub mod context;
pub mod error;
pub mod graph;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{GraphError, Result};
pub use graph::{Graph, GraphBuilder};
pub use task::{NextAction, Task, TaskResult};
