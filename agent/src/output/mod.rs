//! Output formats for collected hang samples

pub mod dump;
pub mod json;

pub use dump::{render_stack_dump, write_stack_dump, STACK_DUMP_FILE_NAME};
pub use json::write_profile;
