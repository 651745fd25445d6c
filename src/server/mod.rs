pub mod builder;
pub mod daemon;
pub mod handler;

pub use builder::ServerBuilder;
pub use daemon::Daemon;
pub use handler::PingHandler;
