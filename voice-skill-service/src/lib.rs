pub mod bindings;
pub mod config;
pub mod downstream;
pub mod envelope;
pub mod format;
pub mod intent;
pub mod kv;
pub mod models;
pub mod replies;
pub mod service;
pub mod tasks;
pub mod workflow;

pub use config::SkillConfig;
pub use service::{AppState, TurnEngine, build_router, create_app};
pub use workflow::build_turn_graph;
