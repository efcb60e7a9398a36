// SPDX-License-Identifier: Apache-2.0 OR MIT

//! On-wire header format (§6.1).
//!
//! Every message carries a single `type` byte followed by a type-specific
//! body. Multi-byte integers are big-endian; sequence numbers use a
//! variable-length encoding (a 1-byte length prefix naming how many
//! significant bytes follow, 0-8) so that small, common seqnos cost a
//! couple of bytes instead of eight.

use crate::connection::ConnId;

/// Header type discriminant, first byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Data = 0,
    Ack = 1,
    SendFirstSeqno = 2,
    XmitReq = 3,
}

impl MsgType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(MsgType::Data),
            1 => Some(MsgType::Ack),
            2 => Some(MsgType::SendFirstSeqno),
            3 => Some(MsgType::XmitReq),
            _ => None,
        }
    }
}

/// DATA header: seqno, the sender's connection id, the "first message of
/// this connection" flag, and the `OOB` message flag (§3 Data Model:
/// "Message: opaque payload plus flags"). §6.1's wire table only spells
/// out a single `first` flag byte; `oob` is packed into the low two bits
/// of that same byte (bit 0 = first, bit 1 = oob) rather than growing the
/// header by a byte, since it is exactly the kind of per-message flag the
/// byte already exists to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub seqno: u64,
    pub conn_id: ConnId,
    pub first: bool,
    pub oob: bool,
}

/// ACK header: cumulative seqno being acknowledged, plus the conn_id it
/// applies to (stale-incarnation acks are discarded by the receiver of the
/// ACK, see `crate::pipeline::up::handle_ack`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    pub seqno: u64,
    pub conn_id: ConnId,
}

/// SEND_FIRST_SEQNO header: "this is the seqno I just received with no
/// matching connection, please replay from your start".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendFirstSeqnoHeader {
    pub seqno: u64,
}

/// A fully decoded header. `XmitReq` carries no header body; its missing-seqno
/// payload is carried as the message body and handled separately (see
/// [`SeqnoList`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Data(DataHeader),
    Ack(AckHeader),
    SendFirstSeqno(SendFirstSeqnoHeader),
    XmitReq,
}

impl Header {
    /// Bit-exact encode onto `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Header::Data(h) => {
                buf.push(MsgType::Data as u8);
                write_varlong(buf, h.seqno);
                buf.extend_from_slice(&h.conn_id.0.to_be_bytes());
                let flags = u8::from(h.first) | (u8::from(h.oob) << 1);
                buf.push(flags);
            }
            Header::Ack(h) => {
                buf.push(MsgType::Ack as u8);
                write_varlong(buf, h.seqno);
                buf.extend_from_slice(&h.conn_id.0.to_be_bytes());
            }
            Header::SendFirstSeqno(h) => {
                buf.push(MsgType::SendFirstSeqno as u8);
                write_varlong(buf, h.seqno);
            }
            Header::XmitReq => {
                buf.push(MsgType::XmitReq as u8);
            }
        }
    }

    /// Decode a header from the front of `buf`, returning the header and
    /// the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Option<(Header, usize)> {
        let mut r = ByteReader::new(buf);
        let ty = MsgType::from_byte(r.read_u8()?)?;
        let header = match ty {
            MsgType::Data => {
                let seqno = read_varlong(&mut r)?;
                let conn_id = ConnId(u16::from_be_bytes(r.read_array()?));
                let flags = r.read_u8()?;
                Header::Data(DataHeader {
                    seqno,
                    conn_id,
                    first: flags & 0b01 != 0,
                    oob: flags & 0b10 != 0,
                })
            }
            MsgType::Ack => {
                let seqno = read_varlong(&mut r)?;
                let conn_id = ConnId(u16::from_be_bytes(r.read_array()?));
                Header::Ack(AckHeader { seqno, conn_id })
            }
            MsgType::SendFirstSeqno => {
                let seqno = read_varlong(&mut r)?;
                Header::SendFirstSeqno(SendFirstSeqnoHeader { seqno })
            }
            MsgType::XmitReq => Header::XmitReq,
        };
        Some((header, r.pos()))
    }
}

/// Write `value` using the compact variable-length long encoding: a 1-byte
/// length prefix (0-8) naming how many big-endian significant bytes follow.
/// `0` encodes as a bare length-0 byte.
pub fn write_varlong(buf: &mut Vec<u8>, value: u64) {
    if value == 0 {
        buf.push(0);
        return;
    }
    let bytes = value.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(8);
    let significant = &bytes[first_nonzero..];
    buf.push(significant.len() as u8);
    buf.extend_from_slice(significant);
}

/// Read a variable-length long previously written by [`write_varlong`].
pub fn read_varlong(r: &mut ByteReader<'_>) -> Option<u64> {
    let len = r.read_u8()? as usize;
    if len == 0 {
        return Some(0);
    }
    if len > 8 {
        return None;
    }
    let raw = r.read_slice(len)?;
    let mut bytes = [0u8; 8];
    bytes[8 - len..].copy_from_slice(raw);
    Some(u64::from_be_bytes(bytes))
}

/// Minimal bounds-checked cursor over a byte slice, used by the header and
/// `SeqnoList` codecs.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn read_slice(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let s = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(s)
    }

    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let s = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(s);
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varlong_roundtrip_zero() {
        let mut buf = Vec::new();
        write_varlong(&mut buf, 0);
        assert_eq!(buf, vec![0]);
        let mut r = ByteReader::new(&buf);
        assert_eq!(read_varlong(&mut r), Some(0));
    }

    #[test]
    fn varlong_roundtrip_small_and_large() {
        for v in [1u64, 255, 256, 65535, 1 << 40, u64::MAX] {
            let mut buf = Vec::new();
            write_varlong(&mut buf, v);
            let mut r = ByteReader::new(&buf);
            assert_eq!(read_varlong(&mut r), Some(v), "roundtrip failed for {v}");
        }
    }

    #[test]
    fn varlong_is_compact_for_small_values() {
        let mut buf = Vec::new();
        write_varlong(&mut buf, 1);
        // length byte + 1 significant byte
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn data_header_roundtrip() {
        let h = Header::Data(DataHeader {
            seqno: 42,
            conn_id: ConnId(7),
            first: true,
            oob: false,
        });
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let (decoded, consumed) = Header::decode(&buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, h);
    }

    #[test]
    fn data_header_oob_flag_roundtrips_independently_of_first() {
        let h = Header::Data(DataHeader {
            seqno: 3,
            conn_id: ConnId(1),
            first: false,
            oob: true,
        });
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let (decoded, _) = Header::decode(&buf).expect("decode");
        assert_eq!(decoded, h);
    }

    #[test]
    fn ack_header_roundtrip() {
        let h = Header::Ack(AckHeader {
            seqno: u64::MAX,
            conn_id: ConnId(0),
        });
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let (decoded, _) = Header::decode(&buf).expect("decode");
        assert_eq!(decoded, h);
    }

    #[test]
    fn send_first_seqno_roundtrip() {
        let h = Header::SendFirstSeqno(SendFirstSeqnoHeader { seqno: 5 });
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let (decoded, _) = Header::decode(&buf).expect("decode");
        assert_eq!(decoded, h);
    }

    #[test]
    fn xmit_req_roundtrip() {
        let mut buf = Vec::new();
        Header::XmitReq.encode(&mut buf);
        let (decoded, consumed) = Header::decode(&buf).expect("decode");
        assert_eq!(consumed, 1);
        assert_eq!(decoded, Header::XmitReq);
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert!(Header::decode(&[9]).is_none());
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let h = Header::Data(DataHeader {
            seqno: 1000,
            conn_id: ConnId(1),
            first: false,
            oob: false,
        });
        let mut buf = Vec::new();
        h.encode(&mut buf);
        buf.truncate(buf.len() - 1);
        assert!(Header::decode(&buf).is_none());
    }
}
