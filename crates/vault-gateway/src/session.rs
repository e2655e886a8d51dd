//! Per-cluster authenticated session: AppRole login plus single-flight
//! re-authentication when a request reports the token has expired, and a
//! proactive TTL check so a request never starts with a near-expiry token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::token;

use crate::error::map_auth_error;
use vault_sync_core::GatewayError;

/// A token with less than this much remaining TTL is refreshed proactively
/// rather than used and left to fail mid-request.
const MIN_REMAINING_TTL: Duration = Duration::from_secs(300);

/// AppRole credentials plus connection parameters for one cluster.
#[derive(Clone)]
pub struct ClusterEndpoint {
    pub name: String,
    pub address: String,
    pub app_role_id: String,
    pub app_role_secret: String,
    pub app_role_mount: String,
    pub tls_skip_verify: bool,
    pub tls_cert_file: Option<String>,
}

/// A lazily-authenticated client for one cluster.
///
/// Login happens on first use and again whenever a request fails with an
/// authentication error; the inner mutex ensures concurrent callers on the
/// same cluster don't stampede the AppRole login endpoint (single-flight).
pub struct ClusterSession {
    endpoint: ClusterEndpoint,
    client: Mutex<Option<(Arc<VaultClient>, Instant)>>,
}

impl ClusterSession {
    pub fn new(endpoint: ClusterEndpoint) -> Self {
        Self {
            endpoint,
            client: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn build_unauthenticated(&self) -> Result<VaultClient, GatewayError> {
        let mut builder = VaultClientSettingsBuilder::default();
        builder.address(&self.endpoint.address);
        builder.verify(!self.endpoint.tls_skip_verify);
        if let Some(ca) = &self.endpoint.tls_cert_file {
            builder.ca_certs(vec![ca.clone()]);
        }
        let settings = builder.build().map_err(|e| GatewayError::Authentication {
            cluster: self.endpoint.name.clone(),
            source: Box::new(e),
        })?;
        VaultClient::new(settings).map_err(|e| GatewayError::Authentication {
            cluster: self.endpoint.name.clone(),
            source: Box::new(e),
        })
    }

    async fn login(&self) -> Result<(Arc<VaultClient>, Instant), GatewayError> {
        let mut client = self.build_unauthenticated()?;

        let auth = approle::login(
            &client,
            &self.endpoint.app_role_mount,
            &self.endpoint.app_role_id,
            &self.endpoint.app_role_secret,
        )
        .await
        .map_err(|e| map_auth_error(&self.endpoint.name, e))?;

        client.set_token(&auth.client_token);

        let expires_at = self.lookup_expiry(&client).await;

        info!(cluster = %self.endpoint.name, "authenticated to vault cluster via approle");
        Ok((Arc::new(client), expires_at))
    }

    /// Looks up the freshly-issued token's remaining TTL so the session
    /// knows when to proactively refresh it, falling back to the AppRole
    /// response's lease duration if the lookup itself fails.
    async fn lookup_expiry(&self, client: &VaultClient) -> Instant {
        match token::lookup_self(client).await {
            Ok(info) => Instant::now() + Duration::from_secs(info.ttl),
            Err(e) => {
                warn!(
                    cluster = %self.endpoint.name,
                    error = %e,
                    "token self-lookup failed, assuming a short ttl"
                );
                Instant::now() + MIN_REMAINING_TTL
            }
        }
    }

    /// Returns the current client, authenticating on first call and
    /// proactively re-authenticating whenever the cached token's remaining
    /// TTL has dropped below [`MIN_REMAINING_TTL`].
    pub async fn client(&self) -> Result<Arc<VaultClient>, GatewayError> {
        let mut guard = self.client.lock().await;
        if let Some((client, expires_at)) = guard.as_ref() {
            if *expires_at > Instant::now() + MIN_REMAINING_TTL {
                return Ok(Arc::clone(client));
            }
            debug!(
                cluster = %self.endpoint.name,
                "cached vault token is within the minimum ttl window, refreshing proactively"
            );
        }
        let (client, expires_at) = self.login().await?;
        *guard = Some((Arc::clone(&client), expires_at));
        Ok(client)
    }

    /// Forces re-authentication; called after a request comes back with a
    /// permission-denied or token-expired error.
    pub async fn reauthenticate(&self) -> Result<Arc<VaultClient>, GatewayError> {
        let mut guard = self.client.lock().await;
        debug!(cluster = %self.endpoint.name, "re-authenticating vault session");
        let (client, expires_at) = self.login().await?;
        *guard = Some((Arc::clone(&client), expires_at));
        Ok(client)
    }
}

/// True when `err` looks like an expired or revoked token rather than a
/// genuine permission or not-found failure, so a caller knows retrying
/// after re-authentication is worthwhile.
pub fn is_auth_expired(err: &ClientError) -> bool {
    matches!(err, ClientError::APIError { code, errors }
        if *code == 403 && errors.iter().any(|e| e.contains("permission denied") || e.contains("invalid token")))
}
