// src/services/api_server.rs
//! API Server for DID registry transactions
//!
//! Exposes the DID Manager over HTTP:
//! - owner lookup
//! - ownership transfer, attribute and delegate management
//! - service endpoint publication
//! - receipt polling for previously submitted transactions
//! - decoding attributes as the registry reports them
//!
//! Mutating endpoints run the full pipeline and respond once the transaction
//! is confirmed, reporting any sponsor top-up that preceded it.

use crate::error::DidError;
use crate::models::did::{Attribute, AttributeValue, Delegate, DelegateType, DEFAULT_VALIDITY_SECS};
use crate::services::did_manager::{DidManager, OperationReceipt};
use crate::services::funding::FundingOutcome;
use crate::utils::crypto::public_key_to_address;
use crate::utils::formatting::{decode_registry_attribute, did_method};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use ethers::types::{Address, H256};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Request payload for transferring ownership of a DID
#[derive(Serialize, Deserialize)]
struct ChangeOwnerRequest {
    did: String,
    new_owner: Address,
    private_key: String,
}

/// Request payload for setting an attribute
#[derive(Serialize, Deserialize)]
struct SetAttributeRequest {
    did: String,
    key: String,
    value: AttributeValue,
    expires_in: Option<u64>,
    private_key: String,
}

/// Request payload for adding a delegate
#[derive(Serialize, Deserialize)]
struct AddDelegateRequest {
    did: String,
    /// Delegate address, or its SEC1 public key
    delegate: String,
    delegate_type: DelegateType,
    expires_in: Option<u64>,
    private_key: String,
}

/// Request payload for publishing a service endpoint
#[derive(Serialize, Deserialize)]
struct ServiceEndpointRequest {
    did: String,
    name: String,
    url: String,
    private_key: String,
}

/// Request payload for decoding a registry attribute
#[derive(Serialize, Deserialize)]
struct DecodeAttributeRequest {
    /// 32-byte name as `0x` hex, or a readable key
    name: String,
    /// Stored value as `0x` hex
    value: String,
}

/// Decoded registry attribute
#[derive(Serialize, Deserialize)]
struct DecodeAttributeResponse {
    key: String,
    value: String,
}

/// Response for owner lookup
#[derive(Serialize, Deserialize)]
struct OwnerResponse {
    did: String,
    owner: Address,
    /// The owner as an `ethr` DID
    owner_did: String,
}

/// Response for every mutating operation
#[derive(Serialize)]
struct OperationResponse {
    funding_tx_hash: Option<H256>,
    funding: FundingOutcome,
    tx_hash: H256,
    success: bool,
}

impl From<OperationReceipt> for OperationResponse {
    fn from(receipt: OperationReceipt) -> Self {
        Self {
            funding_tx_hash: receipt.funding.tx_hash(),
            funding: receipt.funding,
            tx_hash: receipt.tx_hash,
            success: receipt.success,
        }
    }
}

#[derive(Deserialize)]
struct ReceiptQuery {
    timeout_ms: Option<u64>,
}

/// Response for receipt polling
#[derive(Serialize, Deserialize)]
struct ReceiptResponse {
    tx_hash: H256,
    success: bool,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Maps a pipeline error to its HTTP status.
fn status_for(err: &DidError) -> StatusCode {
    match err {
        DidError::MissingSender
        | DidError::MissingGasParameters
        | DidError::UnknownMethod { .. }
        | DidError::UnknownSection { .. }
        | DidError::InvalidHex { .. }
        | DidError::InvalidBase64 { .. }
        | DidError::InvalidDid(_)
        | DidError::InvalidPrivateKey(_)
        | DidError::AmountOverflow { .. }
        | DidError::Abi(_) => StatusCode::BAD_REQUEST,
        DidError::NotOwner { .. } | DidError::Signing(_) => StatusCode::FORBIDDEN,
        DidError::SponsorUnderfunded { .. }
        | DidError::SponsorIsSender { .. }
        | DidError::NoSponsor { .. } => StatusCode::PAYMENT_REQUIRED,
        DidError::ConfirmationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DidError::TransactionFailed { .. } => StatusCode::CONFLICT,
        DidError::Ledger(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Accepts a delegate as an address or as a public key to derive one from.
fn delegate_address(delegate: &str) -> Result<Address, DidError> {
    match delegate.parse::<Address>() {
        Ok(address) => Ok(address),
        Err(_) => public_key_to_address(delegate),
    }
}

fn reject(err: DidError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            retryable: err.is_retryable(),
            error: err.to_string(),
        }),
    )
}

/// HTTP front end for a shared [`DidManager`].
#[derive(Clone)]
pub struct ApiServer {
    manager: Arc<DidManager>,
}

impl ApiServer {
    pub fn new(manager: Arc<DidManager>) -> Self {
        ApiServer { manager }
    }

    /// Builds the router with every endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/owner/:did", get(Self::owner_handler))
            .route("/change-owner", post(Self::change_owner_handler))
            .route("/set-attribute", post(Self::set_attribute_handler))
            .route("/add-delegate", post(Self::add_delegate_handler))
            .route("/service-endpoint", post(Self::service_endpoint_handler))
            .route("/receipt/:tx_hash", get(Self::receipt_handler))
            .route("/decode-attribute", post(Self::decode_attribute_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the listener fails.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server running at http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// GET /owner/:did
    async fn owner_handler(
        Path(did): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> ApiResult<OwnerResponse> {
        let owner = state.manager.lookup_owner(&did).await.map_err(reject)?;
        Ok(Json(OwnerResponse {
            did,
            owner,
            owner_did: did_method(owner),
        }))
    }

    /// POST /change-owner
    async fn change_owner_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ChangeOwnerRequest>,
    ) -> ApiResult<OperationResponse> {
        state
            .manager
            .change_owner(&payload.did, payload.new_owner, &payload.private_key)
            .await
            .map(|receipt| Json(receipt.into()))
            .map_err(reject)
    }

    /// POST /set-attribute
    async fn set_attribute_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<SetAttributeRequest>,
    ) -> ApiResult<OperationResponse> {
        let mut attribute = Attribute::new(payload.key, payload.value);
        if let Some(expires_in) = payload.expires_in {
            attribute.expires_in = expires_in;
        }
        state
            .manager
            .set_attribute(&payload.did, &attribute, &payload.private_key)
            .await
            .map(|receipt| Json(receipt.into()))
            .map_err(reject)
    }

    /// POST /add-delegate
    async fn add_delegate_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<AddDelegateRequest>,
    ) -> ApiResult<OperationResponse> {
        let delegate = Delegate {
            address: delegate_address(&payload.delegate).map_err(reject)?,
            delegate_type: payload.delegate_type,
            expires_in: payload.expires_in.unwrap_or(DEFAULT_VALIDITY_SECS),
        };
        state
            .manager
            .add_delegate(&payload.did, &delegate, &payload.private_key)
            .await
            .map(|receipt| Json(receipt.into()))
            .map_err(reject)
    }

    /// POST /service-endpoint
    async fn service_endpoint_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ServiceEndpointRequest>,
    ) -> ApiResult<OperationResponse> {
        state
            .manager
            .set_service_endpoint(&payload.did, &payload.name, &payload.url, &payload.private_key)
            .await
            .map(|receipt| Json(receipt.into()))
            .map_err(reject)
    }

    /// GET /receipt/:tx_hash?timeout_ms=
    async fn receipt_handler(
        Path(tx_hash): Path<H256>,
        Query(query): Query<ReceiptQuery>,
        State(state): State<Arc<ApiServer>>,
    ) -> ApiResult<ReceiptResponse> {
        let success = match query.timeout_ms {
            Some(ms) => state.manager.wait_with_timeout(tx_hash, Duration::from_millis(ms)).await,
            None => state.manager.wait(tx_hash).await,
        }
        .map_err(reject)?;
        Ok(Json(ReceiptResponse { tx_hash, success }))
    }

    /// POST /decode-attribute
    async fn decode_attribute_handler(
        Json(payload): Json<DecodeAttributeRequest>,
    ) -> ApiResult<DecodeAttributeResponse> {
        let (key, value) = decode_registry_attribute(&payload.name, &payload.value).map_err(reject)?;
        Ok(Json(DecodeAttributeResponse { key, value }))
    }
}
