pub mod export;

pub use export::{ExportService, ExportServiceImpl};
