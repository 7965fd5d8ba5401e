//! Device gateway discovery.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, warn};

use crate::agent::AgentHandle;
use crate::error::{Error, Result};

// ============================================================================
// GatewayResolver
// ============================================================================

/// Stateless lookup of the device's network address.
///
/// Callers decide when to resolve again; nothing is cached here.
#[derive(Clone)]
pub struct GatewayResolver {
    agent: AgentHandle,
    require_device_network: bool,
}

impl std::fmt::Debug for GatewayResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayResolver")
            .field("require_device_network", &self.require_device_network)
            .finish_non_exhaustive()
    }
}

impl GatewayResolver {
    /// Creates a resolver.
    ///
    /// With `require_device_network`, every resolution also confirms this
    /// host sits on the device network.
    #[must_use]
    pub fn new(agent: AgentHandle, require_device_network: bool) -> Self {
        Self {
            agent,
            require_device_network,
        }
    }

    /// Resolves the gateway address.
    ///
    /// # Errors
    ///
    /// - [`Error::Resolution`] if no route to the device network exists
    /// - [`Error::NotOnDeviceNetwork`] if the network check is required and fails
    pub async fn resolve(&self) -> Result<String> {
        let gateway = self.agent.resolve_gateway().await.map_err(|e| match e {
            Error::Resolution { .. } | Error::NotOnDeviceNetwork { .. } => e,
            other => Error::resolution(other.to_string()),
        })?;

        if gateway.trim().is_empty() {
            return Err(Error::resolution("agent returned an empty gateway"));
        }

        if self.require_device_network {
            self.check_device_network().await?;
        }

        debug!(gateway = %gateway, "Gateway resolved");
        Ok(gateway)
    }

    /// Confirms this host is attached to the device network.
    ///
    /// # Errors
    ///
    /// Whatever the agent reports, typically [`Error::NotOnDeviceNetwork`].
    pub async fn check_device_network(&self) -> Result<()> {
        self.agent.is_on_device_network().await.inspect_err(|e| {
            warn!(error = %e, "Device network check failed");
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::ScriptedAgent;

    #[tokio::test]
    async fn test_resolves_agent_gateway() {
        let agent = ScriptedAgent::new();
        let resolver = GatewayResolver::new(agent.handle(), false);
        assert_eq!(resolver.resolve().await.expect("resolve"), "192.168.1.1");
    }

    #[tokio::test]
    async fn test_missing_route_is_resolution_error() {
        let agent = ScriptedAgent::new();
        agent.set_gateway(None);
        let resolver = GatewayResolver::new(agent.handle(), false);

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_empty_gateway_is_rejected() {
        let agent = ScriptedAgent::new();
        agent.set_gateway(Some(" "));
        let resolver = GatewayResolver::new(agent.handle(), false);
        assert!(resolver.resolve().await.is_err());
    }

    #[tokio::test]
    async fn test_device_network_required() {
        let agent = ScriptedAgent::new();
        agent.set_on_device_network(false);

        let lenient = GatewayResolver::new(agent.handle(), false);
        assert!(lenient.resolve().await.is_ok());

        let strict = GatewayResolver::new(agent.handle(), true);
        let err = strict.resolve().await.unwrap_err();
        assert!(matches!(err, Error::NotOnDeviceNetwork { .. }));
    }
}
