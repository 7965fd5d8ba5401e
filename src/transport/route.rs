//! Default gateway discovery through the host's network stack.

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;

use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Lookup
// ============================================================================

/// Looks up the default gateway of this host.
///
/// The platform query blocks, so it runs on the blocking pool.
///
/// # Errors
///
/// [`Error::Resolution`] if the host has no usable default gateway.
pub async fn default_gateway() -> Result<IpAddr> {
    let lookup = tokio::task::spawn_blocking(|| {
        default_net::get_default_gateway().map(|gateway| gateway.ip_addr)
    })
    .await
    .map_err(|e| Error::resolution(format!("gateway lookup did not complete: {e}")))?;

    let address = usable_gateway(lookup)?;
    trace!(%address, "Default gateway");
    Ok(address)
}

/// Maps a raw platform answer onto the crate's error vocabulary.
fn usable_gateway(lookup: std::result::Result<IpAddr, String>) -> Result<IpAddr> {
    match lookup {
        Ok(address) if address.is_unspecified() => {
            Err(Error::resolution("default gateway is unspecified"))
        }
        Ok(address) => Ok(address),
        Err(reason) => Err(Error::resolution(format!("no default gateway: {reason}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_gateway_address_passes_through() {
        let address = IpAddr::V4(Ipv4Addr::new(192, 168, 3, 1));
        assert_eq!(usable_gateway(Ok(address)).expect("gateway"), address);
    }

    #[test]
    fn test_platform_failure_is_resolution_error() {
        let err = usable_gateway(Err("Local IP address not found".into())).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        assert!(err.to_string().contains("Local IP address not found"));
    }

    #[test]
    fn test_unspecified_gateway_is_rejected() {
        assert!(usable_gateway(Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED))).is_err());
        assert!(usable_gateway(Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED))).is_err());
    }

    #[tokio::test]
    async fn test_host_lookup_yields_address_or_resolution_error() {
        match default_gateway().await {
            Ok(address) => assert!(!address.is_unspecified()),
            Err(e) => assert!(matches!(e, Error::Resolution { .. })),
        }
    }
}
