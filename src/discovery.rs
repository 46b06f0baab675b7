/*!
 # Device discovery

 Scans for advertising lights and turns the ones whose name matches a
 family prefix into [`Light`] handles.
*/

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::light::Light;
use crate::protocol::Protocol;
use crate::transport::Transport;
use crate::Result;

/// Default scan duration
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// What to scan for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Advertised name prefix to match; blank means the family default
    pub name_prefix: String,
    /// Family of matching lights whose name does not identify one
    pub protocol: Protocol,
    /// How long to scan
    pub scan_duration: Duration,
}

impl DiscoveryOptions {
    /// Options matching the default advertised name of `protocol`
    pub fn for_protocol(protocol: Protocol) -> Self {
        Self {
            name_prefix: protocol.config().name_prefix.to_string(),
            protocol,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    fn effective_prefix(&self) -> &str {
        if self.name_prefix.trim().is_empty() {
            self.protocol.config().name_prefix
        } else {
            &self.name_prefix
        }
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::for_protocol(Protocol::KulerSky)
    }
}

/// Returns nearby lights whose advertised name starts with the configured prefix
#[instrument(skip(transport))]
pub async fn discover<T: Transport>(
    transport: Arc<T>,
    options: &DiscoveryOptions,
) -> Result<Vec<Light<T>>> {
    let prefix = options.effective_prefix();
    info!(
        "Scanning {}s for devices named {}*",
        options.scan_duration.as_secs(),
        prefix
    );

    let advertisements = transport.scan(options.scan_duration).await?;
    debug!("Found {} BLE peripherals", advertisements.len());

    let lights: Vec<Light<T>> = advertisements
        .into_iter()
        .filter_map(|advertisement| {
            let name = advertisement.name?;
            if !name.starts_with(prefix) {
                return None;
            }
            let protocol = Protocol::from_advertised_name(&name).unwrap_or(options.protocol);
            info!(
                "Discovered {}: {} ({})",
                advertisement.address, name, protocol
            );
            Some(
                Light::new(Arc::clone(&transport), advertisement.address, protocol)
                    .with_name(name.trim()),
            )
        })
        .collect();

    info!("Scan complete, {} light(s) found", lights.len());
    Ok(lights)
}
