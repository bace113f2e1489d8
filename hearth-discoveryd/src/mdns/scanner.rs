//! One-shot discovery scans over the shared mDNS transport.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;

use shared::protocol;
use shared::types::DiscoveredDevice;

use crate::config::DiscoveryConfig;
use crate::mdns::correlator::DeviceTable;
use crate::mdns::record::{RecordBatch, RecordKind};
use crate::mdns::transport::MdnsTransport;

/// Live state of one scan: the table being built plus the subscription
/// feeding it. Dropping the session detaches the subscription.
struct ScanSession {
    table: DeviceTable,
    events: broadcast::Receiver<RecordBatch>,
}

/// Runs discovery scans. One scan at a time: overlapping callers queue on
/// the gate and each runs its own full window against fresh state.
pub struct Scanner {
    transport: Arc<dyn MdnsTransport>,
    window: Duration,
    fallback_services: Vec<String>,
    gate: Mutex<()>,
}

impl Scanner {
    pub fn new(transport: Arc<dyn MdnsTransport>, config: &DiscoveryConfig) -> Self {
        Self {
            transport,
            window: Duration::from_millis(config.window_ms),
            fallback_services: config.fallback_services.clone(),
            gate: Mutex::new(()),
        }
    }

    /// Run one complete scan: seed queries, collect responses until the
    /// window closes, shape the table into the device list. Window expiry
    /// is the only way a healthy scan ends; results arriving early never
    /// shorten it.
    pub async fn run_once(&self) -> Result<Vec<DiscoveredDevice>> {
        let _scan = self.gate.lock().await;

        let mut session = self.start().await?;
        self.collect(&mut session).await;
        let table = finish(session);

        let devices = table.into_devices();
        tracing::debug!("Scan window closed with {} devices", devices.len());
        Ok(devices)
    }

    /// Subscribe to responses, then solicit them: one PTR for the service
    /// enumeration meta-query, one per configured fallback type.
    async fn start(&self) -> Result<ScanSession> {
        let events = self.transport.subscribe();

        self.transport
            .query(protocol::SERVICE_ENUMERATION_QUERY, RecordKind::Ptr)
            .await
            .context("Failed to send service enumeration query")?;
        for service in &self.fallback_services {
            self.transport
                .query(service, RecordKind::Ptr)
                .await
                .with_context(|| format!("Failed to query service type {}", service))?;
        }

        Ok(ScanSession {
            table: DeviceTable::new(),
            events,
        })
    }

    async fn collect(&self, session: &mut ScanSession) {
        let deadline = tokio::time::Instant::now() + self.window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, session.events.recv()).await {
                Ok(Ok(batch)) => {
                    for query in session.table.fold_response(&batch) {
                        if let Err(e) = self.transport.query(&query.name, query.kind).await {
                            tracing::debug!("Follow-up query for {} failed: {}", query.name, e);
                        }
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!("Scan fell behind, {} response batches dropped", skipped);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
                Err(_) => break, // window elapsed
            }
        }
    }
}

/// End a session: detach the subscription, log and clear the service types
/// seen, hand the table back for shaping.
fn finish(session: ScanSession) -> DeviceTable {
    let ScanSession { mut table, events } = session;
    drop(events);

    if !table.service_types().is_empty() {
        tracing::debug!(
            "Scan observed {} advertised service types",
            table.service_types().len()
        );
    }
    table.clear_service_types();
    table
}
