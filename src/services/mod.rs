//! Service layer separating I/O, formats, scratch files and progress from the pipeline

pub mod format;
pub mod io;
pub mod progress;
pub mod scratch;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
pub use scratch::{CleanupPolicy, ScratchFiles};
