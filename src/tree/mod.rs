pub mod name;
mod orchestrator;
pub mod walk;

pub use orchestrator::{FileTree, GarbageReport};
pub use walk::TreeIndex;
