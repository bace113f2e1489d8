use serde::{Serialize, Deserialize};

/// A device found during one LAN discovery scan.
/// This is the canonical shape the discovery API returns to the panel UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Best known display name: the TXT `nm` override if the device
    /// published one, otherwise the cleaned mDNS record name
    pub name: String,

    /// Display address: dotted quad from an A record, the TXT-derived
    /// "192.168.1.x" form, or "N/A" when the scan never learned one
    pub ip: String,

    /// Cleaned service type label, e.g. "http._tcp"; "Unknown" when no
    /// PTR record tied the device to a service
    pub service: String,

    /// Service port from an SRV record, if any
    pub port: Option<u16>,
}

/// Successful body of the discovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub devices: Vec<DiscoveredDevice>,
}

/// Failure body of the discovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
