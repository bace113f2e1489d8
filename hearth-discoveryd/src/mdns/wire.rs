//! DNS wire format for the multicast transport. hickory-proto does the
//! packet encoding; everything above the packet stays ours.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};

use crate::mdns::record::{RecordBatch, RecordData, RecordKind, ResourceRecord};

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Encode one question. Multicast DNS queries carry id 0 and never ask for
/// recursion.
pub fn encode_query(name: &str, kind: RecordKind) -> Result<Vec<u8>> {
    let name = Name::from_utf8(name).with_context(|| format!("Invalid query name: {}", name))?;

    let mut message = Message::new();
    message
        .set_id(0)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(Query::query(name, record_type(kind)));

    message.to_vec().context("Failed to encode mDNS query")
}

/// Decode one packet from the multicast group. Only well-formed responses
/// that carry records yield a batch; queries (our own included, they loop
/// back on the group) and undecodable noise yield nothing.
pub fn decode_response(packet: &[u8]) -> Option<RecordBatch> {
    let message = match Message::from_vec(packet) {
        Ok(message) => message,
        Err(e) => {
            tracing::trace!("Undecodable mDNS packet: {}", e);
            return None;
        }
    };

    if message.message_type() != MessageType::Response {
        return None;
    }

    let batch = RecordBatch {
        answers: message.answers().iter().map(convert_record).collect(),
        additionals: message.additionals().iter().map(convert_record).collect(),
    };
    if batch.answers.is_empty() && batch.additionals.is_empty() {
        return None;
    }
    Some(batch)
}

fn record_type(kind: RecordKind) -> RecordType {
    match kind {
        RecordKind::Ptr => RecordType::PTR,
        RecordKind::A => RecordType::A,
        RecordKind::Srv => RecordType::SRV,
        RecordKind::Txt => RecordType::TXT,
    }
}

fn convert_record(record: &Record) -> ResourceRecord {
    let data = match record.data() {
        Some(RData::PTR(ptr)) => RecordData::Ptr {
            target: name_text(&ptr.0),
        },
        Some(RData::A(a)) => RecordData::A { addr: a.0 },
        Some(RData::SRV(srv)) => RecordData::Srv {
            port: srv.port(),
            target: name_text(srv.target()),
            priority: srv.priority(),
            weight: srv.weight(),
        },
        Some(RData::TXT(txt)) => RecordData::Txt {
            payload: txt
                .txt_data()
                .iter()
                .flat_map(|chunk| chunk.iter().copied())
                .collect(),
        },
        _ => RecordData::Other,
    };

    ResourceRecord {
        name: name_text(record.name()),
        data,
    }
}

/// Wire names come back fully qualified; the correlator keys names without
/// the root dot.
fn name_text(name: &Name) -> String {
    let text = name.to_utf8();
    text.trim_end_matches('.').to_string()
}
