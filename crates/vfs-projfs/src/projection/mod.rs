//! Item metadata shared by stores and the provider.

pub mod types;

pub use types::{FileAttributes, FileTimes, ProjectedFileInfo};
