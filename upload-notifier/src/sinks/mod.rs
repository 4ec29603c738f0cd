pub mod discord;
pub mod log;

pub use discord::DiscordSink;
pub use log::LogSink;
