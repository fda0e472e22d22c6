pub mod compress;
pub mod server;
pub mod stream;

pub use server::ServerConnection;
pub use stream::{CvsStream, StreamStats};
