mod error;
mod models;
mod store;

pub use error::{ProjectError, ProjectResult};
pub use models::Project;
pub use store::{SqliteProjectStore, SqliteProjectStoreBuilder};
