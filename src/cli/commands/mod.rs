pub mod migrate;
pub mod ping;
pub mod quote;
pub mod token;
