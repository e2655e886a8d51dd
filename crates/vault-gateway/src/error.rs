//! Maps `vaultrs` errors onto [`GatewayError`].

use vault_sync_core::GatewayError;
use vaultrs::error::ClientError;

/// True when `err` represents a 404 from Vault (absence, not failure).
pub fn is_not_found(err: &ClientError) -> bool {
    matches!(err, ClientError::APIError { code, .. } if *code == 404)
}

/// Converts a request-phase `ClientError` into the right `GatewayError`
/// variant, collapsing 404s into `NotFound` so callers can match on it.
pub fn map_request_error(cluster: &str, what: &str, err: ClientError) -> GatewayError {
    if is_not_found(&err) {
        GatewayError::NotFound(what.to_string())
    } else {
        GatewayError::Request {
            cluster: cluster.to_string(),
            source: Box::new(err),
        }
    }
}

pub fn map_auth_error(cluster: &str, err: ClientError) -> GatewayError {
    GatewayError::Authentication {
        cluster: cluster.to_string(),
        source: Box::new(err),
    }
}
