mod models;
mod privilege;
mod tree;

pub use models::*;
pub use privilege::*;
pub use tree::*;
