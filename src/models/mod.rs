pub mod did;
pub mod transaction;
