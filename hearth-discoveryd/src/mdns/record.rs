use std::net::Ipv4Addr;

/// Record types the scanner queries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Ptr,
    A,
    Srv,
    Txt,
}

/// One decoded resource record from a multicast DNS response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Owner name without the trailing root dot
    pub name: String,
    pub data: RecordData,
}

/// Payloads for the record types the correlator consumes. Every other type
/// (AAAA, NSEC, ...) lands in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    Ptr {
        target: String,
    },
    A {
        addr: Ipv4Addr,
    },
    Srv {
        port: u16,
        target: String,
        priority: u16,
        weight: u16,
    },
    Txt {
        /// Concatenated TXT character strings, raw bytes
        payload: Vec<u8>,
    },
    Other,
}

/// All records carried by one response packet. Answers and additionals are
/// kept apart because the fold processes answers first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub answers: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}
