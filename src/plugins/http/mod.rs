pub mod cli;
pub mod fetch;
pub mod resolver;
