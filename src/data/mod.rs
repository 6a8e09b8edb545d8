//! Data module - CSV loading, cleaning and filtering

mod loader;
pub mod processor;

pub use loader::{DataLoader, LoaderError};
pub use processor::{DataProcessor, ProcessorError};
