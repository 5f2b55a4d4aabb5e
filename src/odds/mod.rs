pub mod detector;
pub mod history;
pub mod policy;

pub use detector::{ChangeDetector, OddsChange};
pub use history::OddsHistory;
