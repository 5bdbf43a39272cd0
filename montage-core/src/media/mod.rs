mod error;
mod ingest;
mod probe;

pub use error::{MediaError, MediaResult};
pub use ingest::MediaIngestor;
pub use probe::{MediaProber, SourceProbe};
