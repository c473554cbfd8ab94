pub mod model;
pub mod service;

pub use model::{ConversionCallback, ConversionStatus};
pub use service::{ConversionService, IngestOutcome};
