//! Persistent configuration: engine tunables and journal figure rules.

pub mod journals;
pub mod settings;

pub use journals::{DEFAULT_JOURNAL, JournalRule, JournalRules};
pub use settings::EngineSettings;
