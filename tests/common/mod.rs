#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;
use zerproc_light::protocol::{KULERSKY_CHARACTERISTIC, ZERPROC_QUERY_CMD};
use zerproc_light::{
    Advertisement, DeviceAddress, Error, NotificationCallback, Result, Transport,
};

/// In-memory stand-in for a BLE stack with one light attached
#[derive(Default)]
pub struct FakeTransport {
    pub writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    pub reads: Mutex<usize>,
    pub disconnects: Mutex<usize>,
    pub subscriptions: Mutex<Vec<Uuid>>,
    /// Value returned by reads of the KulerSky characteristic
    pub stored: Mutex<Option<Vec<u8>>>,
    /// Notification sent back whenever a state query is written
    pub query_response: Mutex<Option<Vec<u8>>>,
    pub advertisements: Mutex<Vec<Advertisement>>,
    pub fail_connect: Mutex<bool>,
    pub fail_write: Mutex<bool>,
    pub fail_disconnect: Mutex<bool>,
    /// Delay before the query response is delivered from another task
    pub response_delay: Mutex<Option<Duration>>,
    callback: Arc<Mutex<Option<NotificationCallback>>>,
}

pub struct FakeHandle;

impl FakeTransport {
    pub fn with_stored(payload: &[u8]) -> Self {
        let transport = Self::default();
        *transport.stored.lock() = Some(payload.to_vec());
        transport
    }

    /// Delivers a notification as the device would, unsolicited
    pub fn notify(&self, payload: &[u8]) {
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(payload.to_vec());
        }
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().iter().map(|(_, data)| data.clone()).collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Handle = FakeHandle;

    async fn scan(&self, _duration: Duration) -> Result<Vec<Advertisement>> {
        Ok(self.advertisements.lock().clone())
    }

    async fn connect(&self, address: &DeviceAddress, _auto_reconnect: bool) -> Result<FakeHandle> {
        if *self.fail_connect.lock() {
            return Err(Error::Connection(format!("{address} unreachable")));
        }
        Ok(FakeHandle)
    }

    async fn disconnect(&self, _handle: &FakeHandle) -> Result<()> {
        *self.disconnects.lock() += 1;
        if *self.fail_disconnect.lock() {
            return Err(Error::Connection("teardown failed".to_string()));
        }
        *self.callback.lock() = None;
        Ok(())
    }

    async fn write(&self, _handle: &FakeHandle, characteristic: Uuid, data: &[u8]) -> Result<()> {
        if *self.fail_write.lock() {
            return Err(Error::Communication("write rejected".to_string()));
        }
        self.writes.lock().push((characteristic, data.to_vec()));

        if characteristic == KULERSKY_CHARACTERISTIC {
            *self.stored.lock() = Some(data.to_vec());
        }
        if data == ZERPROC_QUERY_CMD {
            let response = self.query_response.lock().clone();
            let delay = *self.response_delay.lock();
            match (response, delay) {
                (Some(response), Some(delay)) => {
                    let callback = Arc::clone(&self.callback);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(callback) = callback.lock().as_ref() {
                            callback(response);
                        }
                    });
                }
                (Some(response), None) => self.notify(&response),
                (None, _) => {}
            }
        }
        Ok(())
    }

    async fn read(&self, _handle: &FakeHandle, _characteristic: Uuid) -> Result<Vec<u8>> {
        *self.reads.lock() += 1;
        self.stored
            .lock()
            .clone()
            .ok_or_else(|| Error::Communication("nothing to read".to_string()))
    }

    async fn subscribe(
        &self,
        _handle: &FakeHandle,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<()> {
        self.subscriptions.lock().push(characteristic);
        *self.callback.lock() = Some(callback);
        Ok(())
    }
}
