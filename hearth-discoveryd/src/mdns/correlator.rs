//! Correlates the resource records of one scan into per-device state.
//!
//! Responders spread a device's identity across PTR, A, SRV and TXT records
//! that arrive in any order over multiple packets. The table keys every
//! record by its owner name and mutates the same entry as pieces come in,
//! so the end of the window sees one merged record per name.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use shared::protocol;
use shared::types::DiscoveredDevice;

use crate::mdns::record::{RecordBatch, RecordData, RecordKind, ResourceRecord};

/// Query the scanner should send after a PTR referral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpQuery {
    pub name: String,
    pub kind: RecordKind,
}

/// Everything known so far about one record name.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Name exactly as received; also the table key
    pub raw_name: String,
    /// Cleaned name, unless a TXT `nm` field overrode it
    pub display_name: String,
    /// Display string, not a parsed address: an A record stores the dotted
    /// quad, the TXT `ip` convention stores "192.168.1.<octet>"
    pub ip: Option<String>,
    pub service: String,
    pub port: Option<u16>,
    /// Raw TXT character data, last received
    pub txt: Option<String>,
    /// TXT payload parsed as JSON, when it is a JSON object
    pub json_fields: Option<Map<String, Value>>,
}

impl DeviceRecord {
    fn new(raw_name: &str) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            display_name: display_name(raw_name),
            ip: None,
            service: protocol::SERVICE_UNKNOWN.to_string(),
            port: None,
            txt: None,
            json_fields: None,
        }
    }
}

/// Session-scoped correlation state. A table lives exactly as long as one
/// scan; nothing carries over between scans.
#[derive(Debug, Default)]
pub struct DeviceTable {
    entries: BTreeMap<String, DeviceRecord>,
    service_types: HashSet<String>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every record of one response packet, answers before
    /// additionals. Returns the follow-up queries the fold asked for.
    pub fn fold_response(&mut self, batch: &RecordBatch) -> Vec<FollowUpQuery> {
        let mut follow_ups = Vec::new();
        for record in batch.answers.iter().chain(batch.additionals.iter()) {
            self.fold_record(record, &mut follow_ups);
        }
        follow_ups
    }

    /// Fold a single record into the table. Later records win on conflict;
    /// refolding the same record leaves the table unchanged.
    pub fn fold_record(&mut self, record: &ResourceRecord, follow_ups: &mut Vec<FollowUpQuery>) {
        // Every record name gets an entry, even types we otherwise ignore
        self.ensure(&record.name);

        match &record.data {
            RecordData::Ptr { target } => {
                if record.name == protocol::SERVICE_ENUMERATION_QUERY {
                    self.service_types.insert(target.clone());
                }
                let service = service_type_name(&record.name);
                let entry = self.ensure(target);
                entry.service = service;
                for kind in [RecordKind::A, RecordKind::Srv, RecordKind::Txt] {
                    follow_ups.push(FollowUpQuery {
                        name: target.clone(),
                        kind,
                    });
                }
            }
            RecordData::A { addr } => {
                self.ensure(&record.name).ip = Some(addr.to_string());
            }
            RecordData::Srv { port, .. } => {
                // Deliberate: the SRV target never gets a follow-up A query
                self.ensure(&record.name).port = Some(*port);
            }
            RecordData::Txt { payload } => {
                let text = String::from_utf8_lossy(payload).into_owned();
                let fields = parse_txt_json(&text);
                let entry = self.ensure(&record.name);
                entry.txt = Some(text);
                if let Some(fields) = fields {
                    if let Some(name) = fields.get(protocol::TXT_NAME).and_then(Value::as_str) {
                        if !name.is_empty() {
                            entry.display_name = name.to_string();
                        }
                    }
                    if let Some(octet) = txt_ip_octet(&fields) {
                        entry.ip = Some(format!("{}.{}", protocol::TXT_IP_PREFIX, octet));
                    }
                    entry.json_fields = Some(fields);
                }
            }
            RecordData::Other => {}
        }
    }

    fn ensure(&mut self, name: &str) -> &mut DeviceRecord {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| DeviceRecord::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&DeviceRecord> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Service types named by enumeration PTR records this session.
    pub fn service_types(&self) -> &HashSet<String> {
        &self.service_types
    }

    pub fn clear_service_types(&mut self) {
        self.service_types.clear();
    }

    /// Shape the table into the API device list, ordered by raw name.
    /// Entries that never got an address or a port are scan artifacts
    /// (service type names, instances that answered nothing) and drop out.
    pub fn into_devices(self) -> Vec<DiscoveredDevice> {
        self.entries
            .into_values()
            .filter(|entry| entry.ip.is_some() || entry.port.is_some())
            .map(|entry| {
                let name = entry
                    .json_fields
                    .as_ref()
                    .and_then(|fields| fields.get(protocol::TXT_NAME))
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or(entry.display_name);
                let service = if entry.service.is_empty() {
                    protocol::SERVICE_UNKNOWN.to_string()
                } else {
                    entry.service
                };
                DiscoveredDevice {
                    name,
                    ip: entry.ip.unwrap_or_else(|| "N/A".to_string()),
                    service,
                    port: entry.port,
                }
            })
            .collect()
    }
}

/// TXT payloads from hearth firmware are JSON objects; anything else is
/// opaque vendor data.
fn parse_txt_json(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(text) {
        Ok(Value::Object(fields)) => Some(fields),
        _ => None,
    }
}

/// The `ip` TXT field carries the last octet as a string or an integer.
fn txt_ip_octet(fields: &Map<String, Value>) -> Option<String> {
    match fields.get(protocol::TXT_IP_OCTET)? {
        Value::String(octet) if !octet.is_empty() => Some(octet.clone()),
        Value::Number(octet) => octet
            .as_u64()
            .filter(|value| *value != 0)
            .map(|value| value.to_string()),
        _ => None,
    }
}

/// Strip the DNS-SD scaffolding off a record name for display: trailing
/// `local`/`udp`/`tcp` labels and underscore-prefixed labels go, the leading
/// label always stays. "printer._http._tcp.local" becomes "printer".
fn display_name(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('.');
    let labels: Vec<&str> = trimmed.split('.').collect();
    let mut end = labels.len();
    while end > 1 {
        let label = labels[end - 1];
        if label.starts_with('_') || matches!(label, "local" | "udp" | "tcp") {
            end -= 1;
        } else {
            break;
        }
    }
    labels[..end].join(".")
}

/// Reduce a PTR owner name to the service label shown to users:
/// "_http._tcp.local" becomes "http._tcp".
fn service_type_name(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('.');
    let labels: Vec<&str> = trimmed.split('.').collect();
    let mut end = labels.len();
    while end > 1 && matches!(labels[end - 1].trim_start_matches('_'), "local" | "udp") {
        end -= 1;
    }
    let joined = labels[..end].join(".");
    match joined.strip_prefix('_') {
        Some(stripped) => stripped.to_string(),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn ptr(name: &str, target: &str) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            data: RecordData::Ptr {
                target: target.to_string(),
            },
        }
    }

    fn a(name: &str, octets: [u8; 4]) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            data: RecordData::A {
                addr: Ipv4Addr::from(octets),
            },
        }
    }

    fn srv(name: &str, port: u16) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            data: RecordData::Srv {
                port,
                target: "host.local".to_string(),
                priority: 0,
                weight: 0,
            },
        }
    }

    fn txt(name: &str, payload: &str) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            data: RecordData::Txt {
                payload: payload.as_bytes().to_vec(),
            },
        }
    }

    fn fold_all(table: &mut DeviceTable, records: &[ResourceRecord]) -> Vec<FollowUpQuery> {
        let mut follow_ups = Vec::new();
        for record in records {
            table.fold_record(record, &mut follow_ups);
        }
        follow_ups
    }

    const INSTANCE: &str = "printer._http._tcp.local";

    #[test]
    fn test_ptr_creates_service_and_instance_entries() {
        let mut table = DeviceTable::new();
        let follow_ups = fold_all(&mut table, &[ptr("_http._tcp.local", INSTANCE)]);

        assert_eq!(table.len(), 2);
        assert!(table.get("_http._tcp.local").is_some());

        let instance = table.get(INSTANCE).unwrap();
        assert_eq!(instance.service, "http._tcp");
        assert_eq!(instance.display_name, "printer");
        assert_eq!(instance.ip, None);
        assert_eq!(instance.port, None);

        assert_eq!(
            follow_ups,
            vec![
                FollowUpQuery {
                    name: INSTANCE.to_string(),
                    kind: RecordKind::A
                },
                FollowUpQuery {
                    name: INSTANCE.to_string(),
                    kind: RecordKind::Srv
                },
                FollowUpQuery {
                    name: INSTANCE.to_string(),
                    kind: RecordKind::Txt
                },
            ]
        );

        assert!(
            table.into_devices().is_empty(),
            "a bare referral has no address or port to show"
        );
    }

    #[test]
    fn test_a_and_srv_complete_a_device() {
        let mut table = DeviceTable::new();
        fold_all(
            &mut table,
            &[
                ptr("_http._tcp.local", INSTANCE),
                a(INSTANCE, [10, 0, 0, 5]),
                srv(INSTANCE, 9100),
            ],
        );

        assert_eq!(
            table.into_devices(),
            vec![DiscoveredDevice {
                name: "printer".to_string(),
                ip: "10.0.0.5".to_string(),
                service: "http._tcp".to_string(),
                port: Some(9100),
            }]
        );
    }

    #[test]
    fn test_txt_overrides_name_and_ip() {
        let mut table = DeviceTable::new();
        fold_all(
            &mut table,
            &[
                ptr("_http._tcp.local", INSTANCE),
                a(INSTANCE, [10, 0, 0, 5]),
                srv(INSTANCE, 9100),
                txt(INSTANCE, r#"{"nm":"Office Printer","ip":"77"}"#),
            ],
        );

        assert_eq!(
            table.into_devices(),
            vec![DiscoveredDevice {
                name: "Office Printer".to_string(),
                ip: "192.168.1.77".to_string(),
                service: "http._tcp".to_string(),
                port: Some(9100),
            }]
        );
    }

    #[test]
    fn test_every_record_name_gets_a_base_entry() {
        let mut table = DeviceTable::new();
        fold_all(&mut table, &[a("smartplug.local", [192, 168, 1, 30])]);

        assert_eq!(table.len(), 1);
        let entry = table.get("smartplug.local").unwrap();
        assert_eq!(entry.raw_name, "smartplug.local");
        assert_eq!(entry.display_name, "smartplug");
        assert_eq!(entry.ip, Some("192.168.1.30".to_string()));
        assert_eq!(entry.service, "Unknown");
    }

    #[test]
    fn test_unhandled_record_types_only_create_the_entry() {
        let mut table = DeviceTable::new();
        let follow_ups = fold_all(
            &mut table,
            &[ResourceRecord {
                name: "tv.local".to_string(),
                data: RecordData::Other,
            }],
        );

        assert!(follow_ups.is_empty());
        assert_eq!(table.len(), 1);
        let entry = table.get("tv.local").unwrap();
        assert_eq!(entry.ip, None);
        assert_eq!(entry.port, None);
        assert!(table.into_devices().is_empty());
    }

    #[test]
    fn test_refolding_a_record_is_idempotent() {
        let mut table = DeviceTable::new();
        let record = ptr("_http._tcp.local", INSTANCE);

        fold_all(&mut table, &[record.clone()]);
        let before = table.get(INSTANCE).unwrap().clone();

        fold_all(&mut table, &[record]);
        assert_eq!(table.len(), 2, "refold must not create duplicates");
        assert_eq!(table.get(INSTANCE).unwrap(), &before);
    }

    #[test]
    fn test_fold_order_does_not_matter_for_distinct_fields() {
        let records = [
            a(INSTANCE, [10, 0, 0, 5]),
            srv(INSTANCE, 9100),
            txt(INSTANCE, r#"{"nm":"Office Printer"}"#),
        ];

        let mut forward = DeviceTable::new();
        fold_all(&mut forward, &records);

        let mut reversed = DeviceTable::new();
        let mut backwards = records.to_vec();
        backwards.reverse();
        fold_all(&mut reversed, &backwards);

        assert_eq!(forward.get(INSTANCE), reversed.get(INSTANCE));
    }

    #[test]
    fn test_txt_parse_failures_still_store_raw_text() {
        let mut table = DeviceTable::new();
        fold_all(&mut table, &[txt("gadget.local", "model=x200 rev=3")]);

        let entry = table.get("gadget.local").unwrap();
        assert_eq!(entry.txt, Some("model=x200 rev=3".to_string()));
        assert_eq!(entry.json_fields, None);
        assert_eq!(entry.display_name, "gadget");
        assert_eq!(entry.ip, None);
    }

    #[test]
    fn test_txt_non_object_json_is_ignored() {
        let mut table = DeviceTable::new();
        fold_all(&mut table, &[txt("gadget.local", "[1,2,3]")]);

        let entry = table.get("gadget.local").unwrap();
        assert_eq!(entry.txt, Some("[1,2,3]".to_string()));
        assert_eq!(entry.json_fields, None);
    }

    #[test]
    fn test_txt_binary_payload_never_panics() {
        let mut table = DeviceTable::new();
        fold_all(
            &mut table,
            &[ResourceRecord {
                name: "gadget.local".to_string(),
                data: RecordData::Txt {
                    payload: vec![0xff, 0xfe, 0x00],
                },
            }],
        );

        let entry = table.get("gadget.local").unwrap();
        assert!(entry.txt.is_some());
        assert_eq!(entry.json_fields, None);
    }

    #[test]
    fn test_txt_ip_accepts_strings_and_integers() {
        let cases = [
            (r#"{"ip":"42"}"#, Some("192.168.1.42".to_string())),
            (r#"{"ip":77}"#, Some("192.168.1.77".to_string())),
            (r#"{"ip":""}"#, None),
            (r#"{"ip":0}"#, None),
            (r#"{"ip":null}"#, None),
        ];

        for (payload, expected) in cases {
            let mut table = DeviceTable::new();
            fold_all(&mut table, &[txt("gadget.local", payload)]);
            assert_eq!(
                table.get("gadget.local").unwrap().ip,
                expected,
                "payload: {}",
                payload
            );
        }
    }

    #[test]
    fn test_empty_txt_name_keeps_cleaned_name() {
        let mut table = DeviceTable::new();
        fold_all(&mut table, &[srv(INSTANCE, 9100), txt(INSTANCE, r#"{"nm":""}"#)]);

        let devices = table.into_devices();
        assert_eq!(devices[0].name, "printer");
    }

    #[test]
    fn test_last_txt_wins() {
        let mut table = DeviceTable::new();
        fold_all(
            &mut table,
            &[
                srv(INSTANCE, 9100),
                txt(INSTANCE, r#"{"nm":"Office Printer","ip":"77"}"#),
                txt(INSTANCE, r#"{"ip":"80"}"#),
            ],
        );

        let entry = table.get(INSTANCE).unwrap();
        assert_eq!(entry.txt, Some(r#"{"ip":"80"}"#.to_string()));
        assert_eq!(entry.ip, Some("192.168.1.80".to_string()));
        assert_eq!(
            entry.display_name, "Office Printer",
            "an earlier name override survives a later TXT without one"
        );
        assert!(entry.json_fields.as_ref().unwrap().get("nm").is_none());
    }

    #[test]
    fn test_meta_query_ptr_records_service_type() {
        let mut table = DeviceTable::new();
        fold_all(
            &mut table,
            &[
                ptr(protocol::SERVICE_ENUMERATION_QUERY, "_hue._tcp.local"),
                ptr("_http._tcp.local", INSTANCE),
            ],
        );

        assert_eq!(table.service_types().len(), 1);
        assert!(table.service_types().contains("_hue._tcp.local"));

        table.clear_service_types();
        assert!(table.service_types().is_empty());
    }

    #[test]
    fn test_answers_fold_before_additionals() {
        let mut table = DeviceTable::new();
        let batch = RecordBatch {
            answers: vec![txt(INSTANCE, r#"{"ip":"5"}"#), srv(INSTANCE, 9100)],
            additionals: vec![txt(INSTANCE, r#"{"ip":"9"}"#)],
        };
        table.fold_response(&batch);

        assert_eq!(
            table.get(INSTANCE).unwrap().ip,
            Some("192.168.1.9".to_string()),
            "the additionals record arrives after the answers and wins"
        );
    }

    #[test]
    fn test_shaping_keeps_only_entries_with_ip_or_port() {
        let mut table = DeviceTable::new();
        fold_all(
            &mut table,
            &[
                ptr("_http._tcp.local", INSTANCE),
                srv("cam.local", 8554),
                a("tv.local", [192, 168, 1, 9]),
            ],
        );

        let devices = table.into_devices();
        assert_eq!(
            devices,
            vec![
                DiscoveredDevice {
                    name: "cam".to_string(),
                    ip: "N/A".to_string(),
                    service: "Unknown".to_string(),
                    port: Some(8554),
                },
                DiscoveredDevice {
                    name: "tv".to_string(),
                    ip: "192.168.1.9".to_string(),
                    service: "Unknown".to_string(),
                    port: None,
                },
            ]
        );
    }

    #[test]
    fn test_display_name_cleaning() {
        let cases = [
            ("printer._http._tcp.local", "printer"),
            ("smartplug.local", "smartplug"),
            ("_services._dns-sd._udp.local", "_services"),
            ("plain", "plain"),
            ("a.b.media", "a.b.media"),
            ("host.local.", "host"),
        ];
        for (raw, expected) in cases {
            assert_eq!(display_name(raw), expected, "raw: {}", raw);
        }
    }

    #[test]
    fn test_service_type_name_cleaning() {
        let cases = [
            ("_http._tcp.local", "http._tcp"),
            ("_workstation._tcp.local", "workstation._tcp"),
            ("_mi-connect._udp.local", "mi-connect"),
            ("_services._dns-sd._udp.local", "services._dns-sd"),
            ("bare", "bare"),
        ];
        for (raw, expected) in cases {
            assert_eq!(service_type_name(raw), expected, "raw: {}", raw);
        }
    }
}
