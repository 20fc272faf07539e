//! Configuration lifecycle: parsing, merging and validating the agent's
//! shell-style configuration, plus the installer's own [`Settings`].
pub mod bookkeeping;
pub mod document;
pub mod extract;
pub mod merge;
pub mod placeholder;
pub mod settings;
pub mod validation;

pub use bookkeeping::RecoveryBookkeeping;
pub use document::ConfigDocument;
pub use extract::{ConfigVariable, extract};
pub use merge::{MergeResult, merge_config, merge_files};
pub use placeholder::is_placeholder;
pub use settings::Settings;
pub use validation::{ValidationMode, ValidationReport, Validator};
