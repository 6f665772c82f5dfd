//! Live streaming of selected tool-call arguments to the client.

pub mod extractor;
pub mod printer;
pub mod repair;

pub use extractor::ArgumentExtractor;
pub use printer::StreamPrinter;
pub use repair::JsonAutoCloser;
