//! Path resolution for user-supplied locations

pub mod resolver;

pub use resolver::{display_name, read_pdf, resolve_path};
