pub mod handler;

pub use handler::MessageHandler;
