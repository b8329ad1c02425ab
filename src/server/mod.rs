pub mod dto;
pub mod extract;
mod project;
pub mod response;
mod router;

pub use project::{MAX_UPLOAD_BYTES, project_router};
pub use router::{AppState, create_router};
