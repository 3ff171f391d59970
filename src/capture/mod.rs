pub mod decoder;
pub mod dns;
pub mod parser;
