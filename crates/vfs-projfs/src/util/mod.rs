//! Utility functions for ProjFS operations.

pub mod compare;
pub mod filetime;
#[cfg(target_os = "windows")]
pub mod wstr;

pub use compare::{prj_file_name_compare, prj_file_name_equals, prj_file_name_match};
