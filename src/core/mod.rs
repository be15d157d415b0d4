pub mod error;
pub mod generator;
pub mod quota;
pub mod services;
pub mod traits;
