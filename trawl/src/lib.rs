pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    default_filter, overrides_from_args, parse_feed_target, parse_set_target,
};
