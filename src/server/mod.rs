pub mod content;
pub mod dto;
mod projects;
mod refs;
pub mod response;
mod router;
mod snapshots;
mod users;
pub mod validation;

pub use content::content_router;
pub use router::{AppState, create_router};
