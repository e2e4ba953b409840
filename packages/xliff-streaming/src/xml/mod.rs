//! XML helpers for the isolated unit trees.

mod utils;

pub use utils::{element_children, find_child, get_tag_name, has_tag, text_content};
