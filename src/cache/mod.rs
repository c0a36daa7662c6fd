mod model;
mod store;

pub use model::{ProcessingStatus, Show};
pub use store::Cache;
