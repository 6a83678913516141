// src/proxy/pdu.rs
//
// Just enough SMPP to log who is binding. Nothing here validates or
// rewrites the PDU; the bytes go to the backend exactly as received.
//
use bytes::Buf;
use std::fmt;

/// command_length, command_id, command_status, sequence_number
pub const HEADER_LEN: usize = 16;

/// Width of the system_id field read after the header.
pub const SYSTEM_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPeek {
    pub command_length: u32,
    pub command_id: u32,
    pub command_status: u32,
    pub sequence_number: u32,
    pub system_id: Option<String>,
}

impl HeaderPeek {
    /// Decode the leading header of `chunk`. Returns `None` for anything
    /// shorter than a header.
    pub fn parse(chunk: &[u8]) -> Option<Self> {
        if chunk.len() < HEADER_LEN {
            return None;
        }

        let mut buf = chunk;
        let command_length = buf.get_u32();
        let command_id = buf.get_u32();
        let command_status = buf.get_u32();
        let sequence_number = buf.get_u32();

        let field = &buf[..buf.remaining().min(SYSTEM_ID_LEN)];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let system_id = String::from_utf8_lossy(&field[..end]).trim().to_string();

        Some(Self {
            command_length,
            command_id,
            command_status,
            sequence_number,
            system_id: (!system_id.is_empty()).then_some(system_id),
        })
    }

    pub fn command_name(&self) -> &'static str {
        command_name(self.command_id).unwrap_or("unknown")
    }
}

impl fmt::Display for HeaderPeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:08x}) len={} status={} seq={}",
            self.command_name(),
            self.command_id,
            self.command_length,
            self.command_status,
            self.sequence_number
        )
    }
}

pub fn command_name(command_id: u32) -> Option<&'static str> {
    let name = match command_id {
        0x8000_0000 => "generic_nack",
        0x0000_0001 => "bind_receiver",
        0x8000_0001 => "bind_receiver_resp",
        0x0000_0002 => "bind_transmitter",
        0x8000_0002 => "bind_transmitter_resp",
        0x0000_0004 => "submit_sm",
        0x8000_0004 => "submit_sm_resp",
        0x0000_0005 => "deliver_sm",
        0x8000_0005 => "deliver_sm_resp",
        0x0000_0006 => "unbind",
        0x8000_0006 => "unbind_resp",
        0x0000_0009 => "bind_transceiver",
        0x8000_0009 => "bind_transceiver_resp",
        0x0000_000B => "outbind",
        0x0000_0015 => "enquire_link",
        0x8000_0015 => "enquire_link_resp",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_transceiver(system_id: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(system_id.as_bytes());
        body.push(0);
        body.extend_from_slice(b"secret\0");
        body.extend_from_slice(b"\0");
        body.extend_from_slice(&[0x34, 0, 0, 0]);

        let mut pdu = Vec::new();
        pdu.extend_from_slice(&((HEADER_LEN + body.len()) as u32).to_be_bytes());
        pdu.extend_from_slice(&0x0000_0009u32.to_be_bytes());
        pdu.extend_from_slice(&0u32.to_be_bytes());
        pdu.extend_from_slice(&42u32.to_be_bytes());
        pdu.extend_from_slice(&body);
        pdu
    }

    #[test]
    fn parses_bind_header_and_system_id() {
        let pdu = bind_transceiver("esme01");
        let peek = HeaderPeek::parse(&pdu).unwrap();

        assert_eq!(peek.command_length as usize, pdu.len());
        assert_eq!(peek.command_id, 9);
        assert_eq!(peek.command_status, 0);
        assert_eq!(peek.sequence_number, 42);
        assert_eq!(peek.system_id.as_deref(), Some("esme01"));
        assert_eq!(peek.command_name(), "bind_transceiver");
    }

    #[test]
    fn short_chunk_is_not_parsed() {
        assert!(HeaderPeek::parse(&[0, 0, 0, 16, 0, 0]).is_none());
    }

    #[test]
    fn header_only_has_no_system_id() {
        let mut pdu = Vec::new();
        pdu.extend_from_slice(&16u32.to_be_bytes());
        pdu.extend_from_slice(&0x0000_0015u32.to_be_bytes());
        pdu.extend_from_slice(&0u32.to_be_bytes());
        pdu.extend_from_slice(&7u32.to_be_bytes());

        let peek = HeaderPeek::parse(&pdu).unwrap();
        assert_eq!(peek.command_name(), "enquire_link");
        assert!(peek.system_id.is_none());
        assert_eq!(peek.to_string(), "enquire_link (0x00000015) len=16 status=0 seq=7");
    }

    #[test]
    fn long_system_id_is_cut_at_field_width() {
        let pdu = bind_transceiver("abcdefghijklmnopqrstuvwxyz");
        let peek = HeaderPeek::parse(&pdu).unwrap();
        assert_eq!(peek.system_id.as_deref(), Some("abcdefghijklmnop"));
    }

    #[test]
    fn unknown_command_ids_have_no_name() {
        assert_eq!(command_name(0x0001_0200), None);
        assert_eq!(command_name(0x8000_0009), Some("bind_transceiver_resp"));
    }
}
