//! CLI command implementations

mod info;
mod stream;

pub use info::info;
pub use stream::{stream, StreamArgs};
