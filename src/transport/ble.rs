use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use super::{Advertisement, NotificationCallback, Transport};
use crate::light::DeviceAddress;
use crate::{Error, Result};

/// Maximum time `connect` spends looking for the requested address
const MAX_DISCOVERY_TIME: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapters = manager
        .adapters()
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    match adapters.into_iter().next() {
        Some(adapter) => {
            debug!("Using Bluetooth adapter");
            Ok(adapter)
        }
        None => {
            error!("No Bluetooth adapters found");
            Err(Error::NoBluetoothAdapters)
        }
    }
}

fn connection_error(e: btleplug::Error) -> Error {
    Error::Connection(e.to_string())
}

fn communication_error(e: btleplug::Error) -> Error {
    Error::Communication(e.to_string())
}

/// Address used to identify a peripheral.
///
/// Some platforms (macOS) hide the BD address; the platform id is used there.
fn peripheral_address(peripheral: &Peripheral) -> DeviceAddress {
    let address = peripheral.address();
    if address == BDAddr::default() {
        DeviceAddress::new(peripheral.id().to_string())
    } else {
        DeviceAddress::new(address.to_string())
    }
}

fn matches_address(peripheral: &Peripheral, address: &DeviceAddress) -> bool {
    let wanted = address.as_str().to_lowercase();
    peripheral.address().to_string().to_lowercase() == wanted
        || peripheral.id().to_string().to_lowercase() == wanted
}

/// Notify characteristics subscribed on a handle, replayed after a reconnect
#[derive(Default)]
struct Subscriptions {
    entries: Mutex<Vec<(Uuid, Arc<NotificationCallback>)>>,
}

impl Subscriptions {
    fn record(&self, characteristic: Uuid, callback: Arc<NotificationCallback>) {
        let mut entries = self.entries.lock();
        entries.retain(|(uuid, _)| *uuid != characteristic);
        entries.push((characteristic, callback));
    }

    fn snapshot(&self) -> Vec<(Uuid, Arc<NotificationCallback>)> {
        self.entries.lock().clone()
    }
}

/// A connected `btleplug` peripheral
pub struct BtleplugHandle {
    peripheral: Peripheral,
    auto_reconnect: bool,
    notification_tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Subscriptions,
}

impl BtleplugHandle {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| {
                Error::Communication(format!("Could not find required BLE characteristic: {uuid}"))
            })
    }

    /// Re-establishes a dropped link when auto-reconnect was requested
    async fn ensure_link(&self) -> Result<()> {
        if !self.auto_reconnect {
            return Ok(());
        }
        let connected = self
            .peripheral
            .is_connected()
            .await
            .map_err(connection_error)?;
        if !connected {
            warn!("Link to {} dropped, reconnecting", peripheral_address(&self.peripheral));
            self.peripheral.connect().await.map_err(connection_error)?;
            self.peripheral
                .discover_services()
                .await
                .map_err(connection_error)?;

            // A new link starts without notifications enabled.
            self.stop_notification_tasks();
            let subscriptions = self.subscriptions.snapshot();
            for (characteristic, callback) in subscriptions {
                debug!("Restoring subscription to {}", characteristic);
                self.start_notifications(characteristic, callback).await?;
            }
        }
        Ok(())
    }

    /// Enables notifications on `characteristic` and spawns the task feeding `callback`
    async fn start_notifications(
        &self,
        characteristic: Uuid,
        callback: Arc<NotificationCallback>,
    ) -> Result<()> {
        let target = self
            .characteristic(characteristic)
            .map_err(|e| Error::Connection(e.to_string()))?;

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(connection_error)?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(connection_error)?;

        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == characteristic {
                    trace!("Notification {:02x?}", notification.value);
                    callback.as_ref()(notification.value);
                }
            }
            debug!("Notification stream for {} ended", characteristic);
        });
        self.notification_tasks.lock().push(task);
        Ok(())
    }

    fn stop_notification_tasks(&self) {
        for task in self.notification_tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for BtleplugHandle {
    fn drop(&mut self) {
        self.stop_notification_tasks();
    }
}

/// [`Transport`] backed by the first Bluetooth adapter of the host
pub struct BtleplugTransport {
    central: Adapter,
}

impl BtleplugTransport {
    /// Opens the default Bluetooth adapter
    #[instrument]
    pub async fn new() -> Result<Self> {
        info!("Initializing BLE transport");
        let manager = Manager::new().await.map_err(connection_error)?;
        let central = get_central(&manager).await?;
        Ok(Self { central })
    }

    /// Polls the adapter until a peripheral with `address` shows up
    async fn find_peripheral(&self, address: &DeviceAddress) -> Result<Peripheral> {
        let start_time = std::time::Instant::now();

        while start_time.elapsed() < MAX_DISCOVERY_TIME {
            let peripherals = self
                .central
                .peripherals()
                .await
                .map_err(connection_error)?;
            debug!("Found {} BLE peripherals so far", peripherals.len());

            if let Some(peripheral) = peripherals
                .into_iter()
                .find(|p| matches_address(p, address))
            {
                return Ok(peripheral);
            }

            let remaining = MAX_DISCOVERY_TIME.saturating_sub(start_time.elapsed());
            info!(
                "Still scanning for {}... ({} seconds remaining)",
                address,
                remaining.as_secs()
            );
            time::sleep(POLL_INTERVAL).await;
        }

        error!(
            "Device {} not found within {} seconds",
            address,
            MAX_DISCOVERY_TIME.as_secs()
        );
        Err(Error::Connection(format!("Device {address} not found")))
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Handle = BtleplugHandle;

    #[instrument(skip(self))]
    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        self.central
            .start_scan(ScanFilter::default())
            .await
            .map_err(connection_error)?;
        time::sleep(duration).await;

        let peripherals = self.central.peripherals().await;
        // Stop before propagating a listing failure so the radio is not left scanning.
        self.central.stop_scan().await.map_err(connection_error)?;
        let peripherals = peripherals.map_err(connection_error)?;

        let mut advertisements = Vec::with_capacity(peripherals.len());
        for p in peripherals {
            let name = match p.properties().await {
                Ok(Some(props)) => props.local_name,
                Ok(None) => None,
                Err(e) => {
                    debug!("Skipping properties of {}: {}", p.id(), e);
                    None
                }
            };
            trace!("Seen {} {:?}", peripheral_address(&p), name);
            advertisements.push(Advertisement {
                address: peripheral_address(&p),
                name,
            });
        }

        Ok(advertisements)
    }

    #[instrument(skip(self))]
    async fn connect(&self, address: &DeviceAddress, auto_reconnect: bool) -> Result<BtleplugHandle> {
        self.central
            .start_scan(ScanFilter::default())
            .await
            .map_err(connection_error)?;
        let found = self.find_peripheral(address).await;
        self.central.stop_scan().await.map_err(connection_error)?;
        let peripheral = found?;

        info!("Connecting to device...");
        if !peripheral.is_connected().await.map_err(connection_error)? {
            peripheral.connect().await.map_err(connection_error)?;
        }

        debug!("Discovering services...");
        if let Err(e) = peripheral.discover_services().await {
            error!("Service discovery failed: {}", e);
            if let Err(teardown) = peripheral.disconnect().await {
                debug!("Teardown after failed service discovery also failed: {}", teardown);
            }
            return Err(connection_error(e));
        }

        Ok(BtleplugHandle {
            peripheral,
            auto_reconnect,
            notification_tasks: Mutex::new(Vec::new()),
            subscriptions: Subscriptions::default(),
        })
    }

    #[instrument(skip(self, handle))]
    async fn disconnect(&self, handle: &BtleplugHandle) -> Result<()> {
        if handle
            .peripheral
            .is_connected()
            .await
            .map_err(connection_error)?
        {
            handle
                .peripheral
                .disconnect()
                .await
                .map_err(connection_error)?;
        }
        handle.stop_notification_tasks();
        Ok(())
    }

    #[instrument(skip(self, handle, data), fields(data_length = data.len()))]
    async fn write(&self, handle: &BtleplugHandle, characteristic: Uuid, data: &[u8]) -> Result<()> {
        handle.ensure_link().await?;
        let characteristic = handle.characteristic(characteristic)?;

        // Prefer WriteWithResponse when supported
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        handle
            .peripheral
            .write(&characteristic, data, write_type)
            .await
            .map_err(communication_error)
    }

    #[instrument(skip(self, handle))]
    async fn read(&self, handle: &BtleplugHandle, characteristic: Uuid) -> Result<Vec<u8>> {
        handle.ensure_link().await?;
        let characteristic = handle.characteristic(characteristic)?;
        handle
            .peripheral
            .read(&characteristic)
            .await
            .map_err(communication_error)
    }

    #[instrument(skip(self, handle, callback))]
    async fn subscribe(
        &self,
        handle: &BtleplugHandle,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<()> {
        let callback = Arc::new(callback);
        handle
            .start_notifications(characteristic, Arc::clone(&callback))
            .await?;
        handle.subscriptions.record(characteristic, callback);

        debug!("Subscribed to {}", characteristic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn recorded_subscriptions_survive_for_a_reconnect() {
        let subscriptions = Subscriptions::default();
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        let notify = Uuid::from_u128(0xffe4);

        let counting: NotificationCallback = Box::new(move |_payload| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let replacement: NotificationCallback = Box::new(|_payload| {});

        subscriptions.record(notify, Arc::new(counting));
        // Subscribing the same characteristic again replaces the callback.
        subscriptions.record(notify, Arc::new(replacement));

        let replayed = subscriptions.snapshot();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].0, notify);

        replayed[0].1.as_ref()(vec![0x01]);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        let other = Uuid::from_u128(0xfff4);
        subscriptions.record(other, Arc::clone(&replayed[0].1));
        let uuids: Vec<Uuid> = subscriptions.snapshot().iter().map(|(uuid, _)| *uuid).collect();
        assert_eq!(uuids, vec![notify, other]);
    }
}
