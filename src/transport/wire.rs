//! Hand-rolled protobuf wire codec for the SSP messages.
//!
//! Only the load-bearing subset of the protobuf wire format is implemented:
//! varint and length-delimited fields, used for `TransportInstruction`,
//! `UserMessage`, and `HostMessage`. Unknown fields are skipped by wire type
//! rather than rejected, matching protobuf's forward-compatibility rule.

/// Wire type 0: varint.
const WIRE_VARINT: u64 = 0;
/// Wire type 2: length-delimited.
const WIRE_LEN: u64 = 2;

fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn decode_varint(buf: &[u8], pos: &mut usize) -> Option<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *buf.get(*pos)?;
        *pos += 1;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

fn encode_tag(field_number: u32, wire_type: u64, out: &mut Vec<u8>) {
    encode_varint((u64::from(field_number) << 3) | wire_type, out);
}

fn encode_field_varint(field_number: u32, value: u64, out: &mut Vec<u8>) {
    encode_tag(field_number, WIRE_VARINT, out);
    encode_varint(value, out);
}

fn encode_field_bytes(field_number: u32, bytes: &[u8], out: &mut Vec<u8>) {
    encode_tag(field_number, WIRE_LEN, out);
    encode_varint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

fn encode_field_message(field_number: u32, encoded: &[u8], out: &mut Vec<u8>) {
    encode_field_bytes(field_number, encoded, out);
}

/// Encode a plain (non-zigzag) `int32` field: negative values sign-extend to
/// the full 64-bit varint, same as protobuf's `int32` wire representation.
fn encode_field_int32(field_number: u32, value: i32, out: &mut Vec<u8>) {
    encode_field_varint(field_number, i64::from(value) as u64, out);
}

/// Decode a plain `int32` varint, keeping only the low 32 bits.
fn decode_field_int32(value: u64) -> i32 {
    value as u32 as i32
}

/// Skip a field's value given its wire type, advancing `pos` past it.
fn skip_field(buf: &[u8], wire_type: u64, pos: &mut usize) -> Option<()> {
    match wire_type {
        WIRE_VARINT => {
            decode_varint(buf, pos)?;
        }
        WIRE_LEN => {
            let len = decode_varint(buf, pos)? as usize;
            *pos = pos.checked_add(len)?;
            if *pos > buf.len() {
                return None;
            }
        }
        1 => *pos = pos.checked_add(8)?,
        5 => *pos = pos.checked_add(4)?,
        _ => return None,
    }
    Some(())
}

/// A raw decoded field: `(field_number, wire_type, varint_value_or_0, bytes)`.
struct RawField {
    field_number: u32,
    wire_type: u64,
    varint: u64,
    bytes: Vec<u8>,
}

fn decode_fields(buf: &[u8]) -> Vec<RawField> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let Some(tag) = decode_varint(buf, &mut pos) else {
            break;
        };
        let field_number = (tag >> 3) as u32;
        let wire_type = tag & 0x7;
        match wire_type {
            WIRE_VARINT => {
                let Some(v) = decode_varint(buf, &mut pos) else {
                    break;
                };
                fields.push(RawField {
                    field_number,
                    wire_type,
                    varint: v,
                    bytes: Vec::new(),
                });
            }
            WIRE_LEN => {
                let Some(len) = decode_varint(buf, &mut pos) else {
                    break;
                };
                let len = len as usize;
                if pos + len > buf.len() {
                    break;
                }
                let bytes = buf[pos..pos + len].to_vec();
                pos += len;
                fields.push(RawField {
                    field_number,
                    wire_type,
                    varint: 0,
                    bytes,
                });
            }
            _ => {
                if skip_field(buf, wire_type, &mut pos).is_none() {
                    break;
                }
            }
        }
    }
    fields
}

/// `TransportInstruction` (the envelope SSP exchanges per datagram payload).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportInstruction {
    pub protocol_version: u64,
    pub old_num: u64,
    pub new_num: u64,
    pub ack_num: u64,
    pub throwaway_num: u64,
    pub diff: Vec<u8>,
    pub chaff: Vec<u8>,
}

impl TransportInstruction {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_field_varint(1, self.protocol_version, &mut out);
        encode_field_varint(2, self.old_num, &mut out);
        encode_field_varint(3, self.new_num, &mut out);
        encode_field_varint(4, self.ack_num, &mut out);
        encode_field_varint(5, self.throwaway_num, &mut out);
        if !self.diff.is_empty() {
            encode_field_bytes(6, &self.diff, &mut out);
        }
        if !self.chaff.is_empty() {
            encode_field_bytes(7, &self.chaff, &mut out);
        }
        out
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        let mut msg = Self::default();
        for field in decode_fields(buf) {
            match field.field_number {
                1 => msg.protocol_version = field.varint,
                2 => msg.old_num = field.varint,
                3 => msg.new_num = field.varint,
                4 => msg.ack_num = field.varint,
                5 => msg.throwaway_num = field.varint,
                6 => msg.diff = field.bytes,
                7 => msg.chaff = field.bytes,
                _ => {}
            }
        }
        msg
    }
}

/// One keystroke payload inside a `UserMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keystroke {
    pub bytes: Vec<u8>,
}

/// One resize payload, shared by `UserMessage` and `HostMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: i32,
    pub height: i32,
}

/// One instruction carried by a `UserMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInstruction {
    Keystroke(Keystroke),
    Resize(Resize),
}

/// Client-to-server message: a sequence of keystroke/resize instructions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserMessage {
    pub instructions: Vec<UserInstruction>,
}

impl UserMessage {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for instruction in &self.instructions {
            let mut instruction_buf = Vec::new();
            match instruction {
                UserInstruction::Keystroke(k) => {
                    let mut keystroke_buf = Vec::new();
                    encode_field_bytes(4, &k.bytes, &mut keystroke_buf);
                    encode_field_message(2, &keystroke_buf, &mut instruction_buf);
                }
                UserInstruction::Resize(r) => {
                    let mut resize_buf = Vec::new();
                    encode_field_int32(5, r.width, &mut resize_buf);
                    encode_field_int32(6, r.height, &mut resize_buf);
                    encode_field_message(3, &resize_buf, &mut instruction_buf);
                }
            }
            encode_field_message(1, &instruction_buf, &mut out);
        }
        out
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        let mut instructions = Vec::new();
        for field in decode_fields(buf) {
            if field.field_number != 1 || field.wire_type != WIRE_LEN {
                continue;
            }
            for inst_field in decode_fields(&field.bytes) {
                match inst_field.field_number {
                    2 => {
                        let keystroke_fields = decode_fields(&inst_field.bytes);
                        if let Some(f) = keystroke_fields.iter().find(|f| f.field_number == 4) {
                            instructions.push(UserInstruction::Keystroke(Keystroke {
                                bytes: f.bytes.clone(),
                            }));
                        }
                    }
                    3 => {
                        let resize_fields = decode_fields(&inst_field.bytes);
                        let mut width = 0;
                        let mut height = 0;
                        for f in &resize_fields {
                            match f.field_number {
                                5 => width = decode_field_int32(f.varint),
                                6 => height = decode_field_int32(f.varint),
                                _ => {}
                            }
                        }
                        instructions.push(UserInstruction::Resize(Resize { width, height }));
                    }
                    _ => {}
                }
            }
        }
        UserMessage { instructions }
    }
}

/// One instruction carried by a `HostMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInstruction {
    HostBytes(Vec<u8>),
    Resize(Resize),
    EchoAck(u64),
}

/// Server-to-client message: host output bytes, resize acks, echo acks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostMessage {
    pub instructions: Vec<HostInstruction>,
}

impl HostMessage {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for instruction in &self.instructions {
            let mut instruction_buf = Vec::new();
            match instruction {
                HostInstruction::HostBytes(bytes) => {
                    let mut bytes_buf = Vec::new();
                    encode_field_bytes(4, bytes, &mut bytes_buf);
                    encode_field_message(2, &bytes_buf, &mut instruction_buf);
                }
                HostInstruction::Resize(r) => {
                    let mut resize_buf = Vec::new();
                    encode_field_int32(5, r.width, &mut resize_buf);
                    encode_field_int32(6, r.height, &mut resize_buf);
                    encode_field_message(3, &resize_buf, &mut instruction_buf);
                }
                HostInstruction::EchoAck(timestamp) => {
                    let mut echo_buf = Vec::new();
                    encode_field_varint(8, *timestamp, &mut echo_buf);
                    encode_field_message(7, &echo_buf, &mut instruction_buf);
                }
            }
            encode_field_message(1, &instruction_buf, &mut out);
        }
        out
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        let mut instructions = Vec::new();
        for field in decode_fields(buf) {
            if field.field_number != 1 || field.wire_type != WIRE_LEN {
                continue;
            }
            for inst_field in decode_fields(&field.bytes) {
                match inst_field.field_number {
                    2 => {
                        let bytes_fields = decode_fields(&inst_field.bytes);
                        if let Some(f) = bytes_fields.iter().find(|f| f.field_number == 4) {
                            instructions.push(HostInstruction::HostBytes(f.bytes.clone()));
                        }
                    }
                    3 => {
                        let resize_fields = decode_fields(&inst_field.bytes);
                        let mut width = 0;
                        let mut height = 0;
                        for f in &resize_fields {
                            match f.field_number {
                                5 => width = decode_field_int32(f.varint),
                                6 => height = decode_field_int32(f.varint),
                                _ => {}
                            }
                        }
                        instructions.push(HostInstruction::Resize(Resize { width, height }));
                    }
                    7 => {
                        let echo_fields = decode_fields(&inst_field.bytes);
                        if let Some(f) = echo_fields.iter().find(|f| f.field_number == 8) {
                            instructions.push(HostInstruction::EchoAck(f.varint));
                        }
                    }
                    _ => {}
                }
            }
        }
        HostMessage { instructions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(v, &mut buf);
            let mut pos = 0;
            assert_eq!(decode_varint(&buf, &mut pos), Some(v));
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn transport_instruction_roundtrip() {
        let msg = TransportInstruction {
            protocol_version: 2,
            old_num: 10,
            new_num: 11,
            ack_num: 9,
            throwaway_num: 5,
            diff: b"some diff bytes".to_vec(),
            chaff: b"padding".to_vec(),
        };
        let encoded = msg.encode();
        assert_eq!(TransportInstruction::decode(&encoded), msg);
    }

    #[test]
    fn transport_instruction_empty_fields_omitted() {
        let msg = TransportInstruction {
            protocol_version: 2,
            old_num: 0,
            new_num: 1,
            ack_num: 0,
            throwaway_num: 0,
            diff: Vec::new(),
            chaff: Vec::new(),
        };
        let encoded = msg.encode();
        assert_eq!(TransportInstruction::decode(&encoded), msg);
    }

    #[test]
    fn user_message_keystroke_and_resize() {
        let msg = UserMessage {
            instructions: vec![
                UserInstruction::Keystroke(Keystroke {
                    bytes: b"hello".to_vec(),
                }),
                UserInstruction::Resize(Resize {
                    width: 80,
                    height: 24,
                }),
            ],
        };
        let encoded = msg.encode();
        assert_eq!(UserMessage::decode(&encoded), msg);
    }

    #[test]
    fn host_message_bytes_resize_echo() {
        let msg = HostMessage {
            instructions: vec![
                HostInstruction::HostBytes(b"output".to_vec()),
                HostInstruction::Resize(Resize {
                    width: 132,
                    height: 43,
                }),
                HostInstruction::EchoAck(65000),
            ],
        };
        let encoded = msg.encode();
        assert_eq!(HostMessage::decode(&encoded), msg);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut buf = Vec::new();
        encode_field_varint(1, 2, &mut buf);
        // An unknown varint field, number 99.
        encode_field_varint(99, 12345, &mut buf);
        encode_field_varint(3, 7, &mut buf);
        let msg = TransportInstruction::decode(&buf);
        assert_eq!(msg.protocol_version, 2);
        assert_eq!(msg.new_num, 7);
    }

    #[test]
    fn truncated_input_stops_cleanly() {
        let mut buf = Vec::new();
        encode_field_bytes(6, b"diff", &mut buf);
        buf.truncate(buf.len() - 1);
        // Should not panic; just decodes what it can.
        let _ = TransportInstruction::decode(&buf);
    }
}
