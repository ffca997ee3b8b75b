pub mod target;

pub use target::validate_target_value;
