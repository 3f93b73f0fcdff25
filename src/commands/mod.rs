pub mod replay;
pub mod watch;

pub use replay::handle_replay;
pub use watch::handle_watch;
