mod models;
mod visibility;

pub use models::*;
pub use visibility::Visibility;
