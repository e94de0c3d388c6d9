pub mod handler;

pub use handler::{CommandContext, CommandHandler};
