pub mod reader;
pub mod search;

pub use reader::{BinaryReader, ByteView};
pub use search::{contains, contains_opt};
