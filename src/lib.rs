pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod output;
pub mod scanner;

pub use config::Config;
pub use detector::{detect, DetectOptions, Detector};
pub use error::{DetectError, MissingHeaderError};
pub use model::{
    CandidatePath, Diagnostic, DiagnosticKind, HeaderFieldSet, PluginRecord, ScanResult,
    ScanStats, VersionSource,
};
pub use scanner::Scanner;
