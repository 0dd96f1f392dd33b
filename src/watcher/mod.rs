mod recorder;
mod report;
mod scanner;

pub use recorder::{ChatEvent, Recorder};
pub use report::build_report;
pub use scanner::Scanner;
