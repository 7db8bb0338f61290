//! Bounded inbound queues, one per record type.
//!
//! The messaging receiver runs concurrently with the step loop and pushes
//! decoded records through an [`InboxSender`]. The step loop owns the
//! [`Inbox`] and drains every queue once per step. Queues are bounded: when
//! a queue is full the newest record is dropped with a warning rather than
//! stalling the receiver.

use std::collections::BTreeMap;

use phasebridge_types::{ALL_RECORD_TYPES, InboundRecord, RecordType};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::warn;

/// Default capacity of each per-record-type queue.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Producer side of the inbox. Cheap to clone and safe to share across
/// tasks.
#[derive(Debug, Clone)]
pub struct InboxSender {
    senders: BTreeMap<RecordType, mpsc::Sender<InboundRecord>>,
}

impl InboxSender {
    /// Queue `record` without waiting. Returns `false` if the record was
    /// dropped because its queue is full or the inbox is gone.
    pub fn push(&self, record: InboundRecord) -> bool {
        let record_type = record.record_type;
        let Some(sender) = self.senders.get(&record_type) else {
            warn!(%record_type, "no inbound queue for record type, dropping record");
            return false;
        };
        match sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%record_type, "inbound queue full, dropping record");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%record_type, "inbox closed, dropping record");
                false
            }
        }
    }
}

/// Consumer side of the inbox, owned by the step loop.
#[derive(Debug)]
pub struct Inbox {
    receivers: BTreeMap<RecordType, mpsc::Receiver<InboundRecord>>,
}

impl Inbox {
    /// Create an inbox with one queue of `capacity` records per record type.
    /// A capacity of zero is raised to one.
    pub fn channel(capacity: usize) -> (InboxSender, Self) {
        let capacity = capacity.max(1);
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for record_type in ALL_RECORD_TYPES {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(record_type, tx);
            receivers.insert(record_type, rx);
        }
        (InboxSender { senders }, Self { receivers })
    }

    /// Take every queued record of every type, grouped by record type in
    /// declaration order, oldest first within a type.
    pub fn drain(&mut self) -> Vec<InboundRecord> {
        let mut records = Vec::new();
        for receiver in self.receivers.values_mut() {
            drain_into(receiver, &mut records);
        }
        records
    }

    /// Wait for the next record of `record_type`. Returns `None` once every
    /// sender is gone and the queue is empty.
    pub async fn recv(&mut self, record_type: RecordType) -> Option<InboundRecord> {
        match self.receivers.get_mut(&record_type) {
            Some(receiver) => receiver.recv().await,
            None => None,
        }
    }
}

fn drain_into(receiver: &mut mpsc::Receiver<InboundRecord>, out: &mut Vec<InboundRecord>) {
    loop {
        match receiver.try_recv() {
            Ok(record) => out.push(record),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(record_type: RecordType, n: u32) -> InboundRecord {
        InboundRecord {
            record_type,
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn drain_returns_records_grouped_by_type() {
        let (tx, mut inbox) = Inbox::channel(8);
        assert!(tx.push(record(RecordType::SpeedGuide, 1)));
        assert!(tx.push(record(RecordType::SignalScheme, 2)));
        assert!(tx.push(record(RecordType::SpeedGuide, 3)));

        let drained = inbox.drain();
        let order: Vec<(RecordType, u64)> = drained
            .iter()
            .map(|r| (r.record_type, r.payload["n"].as_u64().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                (RecordType::SignalScheme, 2),
                (RecordType::SpeedGuide, 1),
                (RecordType::SpeedGuide, 3),
            ]
        );
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn full_queue_drops_newest() {
        let (tx, mut inbox) = Inbox::channel(2);
        assert!(tx.push(record(RecordType::SpeedGuide, 1)));
        assert!(tx.push(record(RecordType::SpeedGuide, 2)));
        assert!(!tx.push(record(RecordType::SpeedGuide, 3)));
        // Other types have their own queue.
        assert!(tx.push(record(RecordType::Start, 4)));
        let guides = inbox
            .drain()
            .iter()
            .filter(|r| r.record_type == RecordType::SpeedGuide)
            .count();
        assert_eq!(guides, 2);
    }

    #[test]
    fn push_after_inbox_dropped_is_rejected() {
        let (tx, inbox) = Inbox::channel(4);
        drop(inbox);
        assert!(!tx.push(record(RecordType::Start, 1)));
    }

    #[test]
    fn zero_capacity_is_raised() {
        let (tx, mut inbox) = Inbox::channel(0);
        assert!(tx.push(record(RecordType::Start, 1)));
        assert_eq!(inbox.drain().len(), 1);
    }

    #[tokio::test]
    async fn recv_waits_for_a_record() {
        let (tx, mut inbox) = Inbox::channel(4);
        let sender = tx.clone();
        tokio::spawn(async move {
            sender.push(record(RecordType::Start, 9));
        });
        let received = inbox.recv(RecordType::Start).await.unwrap();
        assert_eq!(received.payload["n"], 9);
    }
}
