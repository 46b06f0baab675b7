/*!
 # Notification mailbox

 A single-slot hand-off between the transport's notification task and a
 caller waiting for a state response. Backed by a `tokio` channel of
 capacity one: the producer never blocks and drops a notification when the
 slot is taken, the consumer can drain or wait with a timeout.
*/

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time;
use tracing::trace;

/// Producer half, handed to the notification callback
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl MailboxSender {
    /// Puts `payload` in the slot if it is empty.
    ///
    /// Returns `false` when the payload was dropped because an unread one is
    /// already waiting.
    pub fn push(&self, payload: Vec<u8>) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                trace!("Mailbox full, dropping notification {:02x?}", dropped);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Consumer half, owned by the light
#[derive(Debug)]
pub struct Mailbox {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    /// Get a producer handle for this mailbox
    pub fn sender(&self) -> MailboxSender {
        MailboxSender {
            tx: self.tx.clone(),
        }
    }

    /// Empties the slot, returning whatever was in it
    pub fn drain(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for a payload
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        // The mailbox keeps its own sender, so `recv` only ends with a value.
        time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_push_is_dropped_while_full() {
        let mut mailbox = Mailbox::new();
        let sender = mailbox.sender();

        assert!(sender.push(vec![1]));
        assert!(!sender.push(vec![2]));

        assert_eq!(mailbox.drain(), Some(vec![1]));
        assert_eq!(mailbox.drain(), None);
    }

    #[test]
    fn slot_frees_up_after_drain() {
        let mut mailbox = Mailbox::new();
        let sender = mailbox.sender();

        assert!(sender.push(vec![1]));
        mailbox.drain();
        assert!(sender.push(vec![3]));
        assert_eq!(mailbox.drain(), Some(vec![3]));
    }

    #[tokio::test]
    async fn recv_returns_pushed_payload() {
        let mut mailbox = Mailbox::new();
        let sender = mailbox.sender();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            sender.push(vec![0xaa, 0xbb]);
        });

        let payload = mailbox.recv_timeout(Duration::from_secs(2)).await;
        assert_eq!(payload, Some(vec![0xaa, 0xbb]));
    }

    #[tokio::test]
    async fn recv_times_out_when_empty() {
        let mut mailbox = Mailbox::new();
        assert_eq!(mailbox.recv_timeout(Duration::from_millis(20)).await, None);
    }
}
