pub mod error;
pub mod radio;
