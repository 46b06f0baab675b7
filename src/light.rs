use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use crate::mailbox::Mailbox;
use crate::protocol::{Protocol, ProtocolConfig};
use crate::transport::Transport;
use crate::{Error, Result};

/// Identifier of a physical light (BD address or platform id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for DeviceAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Tri-state power status reported by a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    On,
    Off,
    /// The status byte matched neither the on nor the off code
    Unknown,
}

impl From<PowerState> for Option<bool> {
    fn from(state: PowerState) -> Self {
        match state {
            PowerState::On => Some(true),
            PowerState::Off => Some(false),
            PowerState::Unknown => None,
        }
    }
}

/// State of a light as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceState {
    /// Power status
    pub is_on: PowerState,
    /// Current RGB color (red, green, blue), 0-255 per channel
    pub color: (u8, u8, u8),
}

impl DeviceState {
    pub fn new(is_on: PowerState, color: (u8, u8, u8)) -> Self {
        Self { is_on, color }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (r, g, b) = self.color;
        write!(f, "is_on={:?} color=#{:02x}{:02x}{:02x}", self.is_on, r, g, b)
    }
}

/// One controllable light.
///
/// Constructed disconnected; every command and query needs [`Light::connect`]
/// first. Operations take `&mut self`, so a light serves one caller at a time.
pub struct Light<T: Transport> {
    transport: Arc<T>,
    address: DeviceAddress,
    name: Option<String>,
    protocol: Protocol,
    config: ProtocolConfig,
    handle: Option<T::Handle>,
    mailbox: Mailbox,
}

impl<T: Transport> Light<T> {
    pub fn new(transport: Arc<T>, address: impl Into<DeviceAddress>, protocol: Protocol) -> Self {
        Self {
            transport,
            address: address.into(),
            name: None,
            protocol,
            config: protocol.config(),
            handle: None,
            mailbox: Mailbox::new(),
        }
    }

    /// Sets the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides how long a notification-based state query waits
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn response_timeout(&self) -> Duration {
        self.config.response_timeout
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Connects to the light.
    ///
    /// Notification-based lights also get their notify characteristic
    /// subscribed before this returns.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn connect(&mut self, auto_reconnect: bool) -> Result<()> {
        if self.handle.is_some() {
            debug!("Already connected");
            return Ok(());
        }

        info!("Connecting to {} ({})", self.address, self.protocol);
        let handle = self.transport.connect(&self.address, auto_reconnect).await?;

        if self.protocol.uses_notifications() {
            let sender = self.mailbox.sender();
            let subscribed = self
                .transport
                .subscribe(
                    &handle,
                    self.config.state_uuid,
                    Box::new(move |payload| {
                        sender.push(payload);
                    }),
                )
                .await;

            if let Err(e) = subscribed {
                warn!("Subscribing to notifications failed: {}", e);
                if let Err(teardown) = self.transport.disconnect(&handle).await {
                    debug!("Teardown after failed subscribe also failed: {}", teardown);
                }
                return Err(e);
            }
        }

        self.handle = Some(handle);
        debug!("Connected to {}", self.address);
        Ok(())
    }

    /// Disconnects from the light. Disconnecting twice is not an error.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.handle.as_ref() {
            Some(handle) => {
                info!("Disconnecting from {}", self.address);
                // Keep the handle on failure so the teardown can be retried.
                self.transport.disconnect(handle).await?;
                self.handle = None;
                self.mailbox.drain();
                debug!("Disconnected from {}", self.address);
            }
            None => trace!("Not connected, nothing to do"),
        }
        Ok(())
    }

    /// Turns the light on.
    ///
    /// KulerSky lights keep the color in the same payload, so the current
    /// color is read back first and written along with the on code.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn turn_on(&mut self) -> Result<()> {
        info!("Turning on {}", self.address);
        let color = self.color_for_power_command().await?;
        let payload = self.protocol.encode_turn_on(color);
        self.write(&payload).await?;
        debug!("Turned on {}", self.address);
        Ok(())
    }

    /// Turns the light off. See [`Light::turn_on`] for KulerSky lights.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn turn_off(&mut self) -> Result<()> {
        info!("Turning off {}", self.address);
        let color = self.color_for_power_command().await?;
        let payload = self.protocol.encode_turn_off(color);
        self.write(&payload).await?;
        debug!("Turned off {}", self.address);
        Ok(())
    }

    /// Sets the color of the light
    ///
    /// # Arguments
    ///
    /// * `red` - Red component (0-255)
    /// * `green` - Green component (0-255)
    /// * `blue` - Blue component (0-255)
    ///
    /// Black turns the light off.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn set_color(&mut self, red: i32, green: i32, blue: i32) -> Result<()> {
        let color = (
            validate_channel("red", red)?,
            validate_channel("green", green)?,
            validate_channel("blue", blue)?,
        );

        info!(
            "Changing color of {} to #{:02x}{:02x}{:02x}",
            self.address, color.0, color.1, color.2
        );

        if color == (0, 0, 0) {
            return self.turn_off().await;
        }

        let payload = self.protocol.encode_set_color(color);
        self.write(&payload).await?;
        debug!("Changed color of {}", self.address);
        Ok(())
    }

    /// Get the current state of the light
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn get_state(&mut self) -> Result<DeviceState> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::NotConnected(self.address.clone()))?;

        let payload = match self.protocol.encode_query() {
            None => {
                self.transport
                    .read(handle, self.config.state_uuid)
                    .await?
            }
            Some(query) => {
                if let Some(stale) = self.mailbox.drain() {
                    debug!("Discarding stale notification {:02x?}", stale);
                }

                trace!("Writing {:02x?} to {}", query, self.config.command_uuid);
                self.transport
                    .write(handle, self.config.command_uuid, &query)
                    .await?;

                let timeout = self.config.response_timeout;
                self.mailbox
                    .recv_timeout(timeout)
                    .await
                    .ok_or(Error::Timeout(timeout))?
            }
        };

        let state = self.protocol.decode_state(&payload)?;
        info!("Got state of {}: {}", self.address, state);
        Ok(state)
    }

    /// Color that has to accompany an on/off payload
    async fn color_for_power_command(&mut self) -> Result<(u8, u8, u8)> {
        match self.protocol {
            Protocol::KulerSky => Ok(self.get_state().await?.color),
            Protocol::Zerproc => {
                self.require_connection()?;
                Ok((0, 0, 0))
            }
        }
    }

    fn require_connection(&self) -> Result<&T::Handle> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::NotConnected(self.address.clone()))
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        let handle = self.require_connection()?;
        trace!("Writing {:02x?} to {}", payload, self.config.command_uuid);
        self.transport
            .write(handle, self.config.command_uuid, payload)
            .await?;
        trace!("Wrote {:02x?} to {}", payload, self.config.command_uuid);
        Ok(())
    }
}

impl<T: Transport> fmt::Debug for Light<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Light")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn validate_channel(channel: &'static str, value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::Validation { channel, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_outside_byte_range_are_rejected() {
        assert_eq!(validate_channel("red", 0).unwrap(), 0);
        assert_eq!(validate_channel("red", 255).unwrap(), 255);
        assert!(matches!(
            validate_channel("red", 256),
            Err(Error::Validation { channel: "red", value: 256 })
        ));
        assert!(matches!(
            validate_channel("green", -1),
            Err(Error::Validation { channel: "green", value: -1 })
        ));
    }

    #[test]
    fn power_state_as_option() {
        assert_eq!(Option::<bool>::from(PowerState::On), Some(true));
        assert_eq!(Option::<bool>::from(PowerState::Off), Some(false));
        assert_eq!(Option::<bool>::from(PowerState::Unknown), None);
    }

    #[test]
    fn state_display_uses_hex_color() {
        let state = DeviceState::new(PowerState::On, (255, 16, 0));
        assert_eq!(state.to_string(), "is_on=On color=#ff1000");
    }
}
