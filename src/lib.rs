/*!
 # Zerproc / KulerSky Bluetooth Light Library

 A Rust library for controlling Zerproc and KulerSky Bluetooth RGB lights.
 Two firmware families are supported:

 * KulerSky lights keep their state in a single characteristic that is read
   directly.
 * Zerproc (LEDBlue) lights answer a state query with a notification on a
   separate characteristic.

 ## Features

 * Device discovery by advertised name
 * Power on/off control
 * RGB color control with per-family channel normalization
 * State queries returning a normalized [`DeviceState`]

 ## Example

 ```no_run
 use std::sync::Arc;
 use zerproc_light::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let transport = Arc::new(BtleplugTransport::new().await?);
     let mut lights = discover(transport, &DiscoveryOptions::default()).await?;

     if let Some(light) = lights.first_mut() {
         light.connect(false).await?;
         light.set_color(255, 0, 0).await?; // Set to red
         println!("{:?}", light.get_state().await?);
         light.disconnect().await?;
     }

     Ok(())
 }
 ```
*/

use std::time::Duration;

use thiserror::Error;

/// Custom error types for the light controller library
#[derive(Error, Debug)]
pub enum Error {
    /// A color channel was outside 0-255
    #[error("Value {value} for channel {channel} is outside the valid range of 0-255")]
    Validation {
        /// Channel name (`red`, `green` or `blue`)
        channel: &'static str,
        /// The rejected value
        value: i32,
    },

    /// Operation attempted on a light that is not connected
    #[error("Light {0} is not connected")]
    NotConnected(DeviceAddress),

    /// Connecting, disconnecting, subscribing or scanning failed
    #[error("BLE connection error: {0}")]
    Connection(String),

    /// Reading or writing a characteristic failed on an established link
    #[error("BLE communication error: {0}")]
    Communication(String),

    /// No notification answered a state query in time
    #[error("No response from light within {0:?}")]
    Timeout(Duration),

    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,
}

impl Error {
    /// Whether this error came from establishing or tearing down a link
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::NoBluetoothAdapters)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod color;
pub mod discovery;
pub mod light;
pub mod mailbox;
pub mod protocol;
pub mod transport;

// Re-export key types
pub use discovery::{discover, DiscoveryOptions};
pub use light::{DeviceAddress, DeviceState, Light, PowerState};
pub use protocol::{Protocol, ProtocolConfig};
pub use transport::ble::BtleplugTransport;
pub use transport::{Advertisement, NotificationCallback, Transport};
