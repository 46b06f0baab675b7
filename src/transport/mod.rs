/*!
 # BLE transport capability

 The narrow interface the light talks to the radio through. [`ble`] provides
 the `btleplug` implementation; tests plug in their own.
*/

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::light::DeviceAddress;
use crate::Result;

pub mod ble;

/// Called with the raw payload of every notification on a subscribed characteristic.
///
/// Runs on the transport's own task and must not block.
pub type NotificationCallback = Box<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// A device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: DeviceAddress,
    pub name: Option<String>,
}

/// Connect, read, write and subscribe operations on BLE devices.
///
/// Connection-level failures are reported as [`crate::Error::Connection`],
/// read and write failures as [`crate::Error::Communication`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// An established link to one device
    type Handle: Send + Sync;

    /// Scans for `duration` and reports every named or unnamed device seen
    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>>;

    async fn connect(&self, address: &DeviceAddress, auto_reconnect: bool) -> Result<Self::Handle>;

    async fn disconnect(&self, handle: &Self::Handle) -> Result<()>;

    async fn write(&self, handle: &Self::Handle, characteristic: Uuid, data: &[u8]) -> Result<()>;

    async fn read(&self, handle: &Self::Handle, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Enables notifications on `characteristic` and routes them to `callback`
    async fn subscribe(
        &self,
        handle: &Self::Handle,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<()>;
}
