pub mod client;
pub mod remote;
pub mod types;
