pub mod error;
pub mod level;
pub mod options;
