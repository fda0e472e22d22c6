//! Line protocol primitives: request builders and reply readers.

pub mod reply;
pub mod request;

pub use reply::{first_match, get_reply, next_message, next_message_bytes, next_reply, ReplyLine};
pub use request::{argument, arguments, entry_line, entry_revision, split_path, DirectoryWalker};
