pub mod attach;
pub mod provision;
pub mod rm;
