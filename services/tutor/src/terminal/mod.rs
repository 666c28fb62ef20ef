pub mod protocol;
pub mod render;
pub mod session;

// Re-export the session entry points so the binary can start a terminal session.
pub use session::{run, Terminal};
