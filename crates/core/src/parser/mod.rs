mod csv;
mod json;
pub mod metadata;
mod registry;
pub mod text;
pub mod timestamp;
mod traits;

pub use registry::{build_sample, ParserInfo, ParserRegistry, SAMPLE_MAX_CHARS, SAMPLE_MAX_LINES};
pub use traits::LogParser;

pub use csv::CsvParser;
pub use json::JsonParser;
pub use text::TextParser;
