pub mod history;
pub mod snapshot;

pub use history::{HistoryManager, RestoreStatus};
pub use snapshot::{ProjectSnapshot, SNAPSHOT_VERSION};
