pub mod sqlite_store;
pub mod summarizer;
pub mod traits;

pub use sqlite_store::SqliteContextStore;
pub use summarizer::summarize_channel;
pub use traits::{ContextMessage, ContextStats, ContextStore, Role};
