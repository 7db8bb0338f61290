//! NATS messaging channel of the signal coordinator.
//!
//! Inbound records arrive on one subject per record type and are pushed
//! into the session inbox by a background task. Outbound records are
//! published from the step loop without waiting: each publish is spawned
//! onto the runtime and failures are only logged.
//!
//! # Subject Convention
//!
//! - **Inbound:** `{prefix}.upload.{region}.{RecordType}`
//! - **Outbound:** `{prefix}.local.{region}.{RecordType}`
//!
//! The record type is the last subject segment (`SignalScheme`,
//! `SpeedGuide`, ...). Payloads are JSON.

use futures::StreamExt as _;
use phasebridge_core::config::ConnectionConfig;
use phasebridge_core::inbox::InboxSender;
use phasebridge_core::sink::RecordSink;
use phasebridge_types::{InboundRecord, OutboundRecord, RecordType};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineBinError;

/// Subject names of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    prefix: String,
    region: u32,
}

impl Subjects {
    /// Subjects for the configured prefix and region.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            prefix: config.subject_prefix.clone(),
            region: config.region,
        }
    }

    /// Wildcard matching every inbound subject; the last segment is the
    /// record type.
    pub fn inbound_wildcard(&self) -> String {
        format!("{}.upload.{}.*", self.prefix, self.region)
    }

    /// Subject outbound records of `record_type` are published on.
    pub fn outbound(&self, record_type: RecordType) -> String {
        format!("{}.local.{}.{record_type}", self.prefix, self.region)
    }
}

/// Record type named by the last segment of `subject`.
pub fn record_type_of(subject: &str) -> Option<RecordType> {
    subject.rsplit('.').next().and_then(RecordType::from_name)
}

/// Turn one inbound message into a record. An empty payload (as sent with
/// start orders) becomes `null`.
pub fn decode_inbound(subject: &str, payload: &[u8]) -> Result<InboundRecord, EngineBinError> {
    let record_type = record_type_of(subject).ok_or_else(|| EngineBinError::UnknownSubject {
        subject: subject.to_owned(),
    })?;
    let payload = if payload.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(payload)
            .map_err(|source| EngineBinError::Payload { record_type, source })?
    };
    Ok(InboundRecord {
        record_type,
        payload,
    })
}

/// Connection to the NATS server.
pub struct NatsChannel {
    client: async_nats::Client,
    subjects: Subjects,
}

impl NatsChannel {
    /// Connect to the configured NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineBinError::Nats`] if the connection fails.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, EngineBinError> {
        let url = &config.nats_url;
        let client = async_nats::connect(url.as_str())
            .await
            .map_err(|e| EngineBinError::Nats {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;
        Ok(Self {
            client,
            subjects: Subjects::new(config),
        })
    }

    /// Subscribe to every inbound subject and forward decoded records to
    /// `inbox` until the subscription ends. Undecodable messages are logged
    /// and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineBinError::Nats`] if the subscription fails.
    pub async fn forward_inbound(&self, inbox: InboxSender) -> Result<JoinHandle<()>, EngineBinError> {
        let subject = self.subjects.inbound_wildcard();
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| EngineBinError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })?;
        info!(subject, "Inbound subscription started");

        Ok(tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match decode_inbound(msg.subject.as_str(), &msg.payload) {
                    Ok(record) => {
                        debug!(record_type = %record.record_type, "Inbound record received");
                        inbox.push(record);
                    }
                    Err(e) => warn!(subject = %msg.subject, error = %e, "Dropping inbound message"),
                }
            }
            info!("Inbound subscription closed");
        }))
    }

    /// A sink publishing outbound records on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineBinError::Nats`] when called outside a tokio runtime.
    pub fn sink(&self) -> Result<NatsSink, EngineBinError> {
        let runtime = Handle::try_current().map_err(|e| EngineBinError::Nats {
            message: format!("no tokio runtime available: {e}"),
        })?;
        Ok(NatsSink {
            client: self.client.clone(),
            subjects: self.subjects.clone(),
            runtime,
        })
    }
}

impl std::fmt::Debug for NatsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsChannel")
            .field("subjects", &self.subjects)
            .finish_non_exhaustive()
    }
}

/// Fire-and-forget publisher of outbound records.
pub struct NatsSink {
    client: async_nats::Client,
    subjects: Subjects,
    runtime: Handle,
}

impl std::fmt::Debug for NatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSink")
            .field("subjects", &self.subjects)
            .finish_non_exhaustive()
    }
}

impl RecordSink for NatsSink {
    fn publish(&self, record: OutboundRecord) {
        let subject = self.subjects.outbound(record.record_type);
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subject, error = %e, "Failed to serialize outbound record");
                return;
            }
        };
        let client = self.client.clone();
        self.runtime.spawn(async move {
            match client.publish(subject.clone(), payload.into()).await {
                Ok(()) => debug!(subject, "Outbound record published"),
                Err(e) => warn!(subject, error = %e, "Failed to publish outbound record"),
            }
        });
    }
}
