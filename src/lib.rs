pub mod config;
pub mod decoder;
pub mod events;
pub mod ledger;
pub mod output;
pub mod rpc;
pub mod scanner;
pub mod types;
