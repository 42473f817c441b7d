pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod output;
pub mod parser;
pub mod range;
pub mod records;
pub mod summary;
pub mod transit;
pub mod validator;
