// Messaging - Lock-free command and progress plumbing between threads

pub mod channels;
pub mod command;
pub mod progress;

pub use channels::{CommandConsumer, CommandProducer, create_command_channel};
pub use command::TransportCommand;
pub use progress::{PlaybackProgress, SharedProgress};
