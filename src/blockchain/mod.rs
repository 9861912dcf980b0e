pub mod confirmation;
pub mod ledger_client;
#[cfg(test)]
pub mod mock_ledger;
pub mod nonce;
