/// PTR meta-query asking responders to enumerate their service types
pub const SERVICE_ENUMERATION_QUERY: &str = "_services._dns-sd._udp.local";

/// TXT record keys published by hearth device firmware
pub const TXT_NAME: &str = "nm";
pub const TXT_IP_OCTET: &str = "ip";

/// Subnet prefix the TXT `ip` last-octet shorthand expands into
pub const TXT_IP_PREFIX: &str = "192.168.1";

/// Service label reported when no PTR record tied a device to a service
pub const SERVICE_UNKNOWN: &str = "Unknown";

/// API paths
pub const DISCOVER_PATH: &str = "/api/discover";
pub const STATUS_PATH: &str = "/api/status";

/// Client-facing message when a scan fails; details stay in the server log
pub const DISCOVERY_FAILED: &str = "Failed to discover devices";
