pub mod crypto;
pub mod formatting;
pub mod settings;
