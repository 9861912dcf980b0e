pub mod api_server;
pub mod authorization;
pub mod did_manager;
pub mod funding;
pub mod signer;
pub mod transaction_builder;
