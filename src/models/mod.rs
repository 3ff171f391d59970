pub mod capture;
pub mod config;
pub mod frame;
pub mod result;
