//! The packet format spoken by USB adapters.
//!
//! The host writes 64 byte blocks laid out as
//!
//! | byte | content |
//! |------|---------|
//! | 0    | command ([`CMD_SEND`] or [`CMD_SEND_ANSWER`]) |
//! | 1    | sequence number |
//! | 2    | control flags ([`CTRL_TWICE`]) |
//! | 3    | write type (frame length) |
//! | 4    | reserved |
//! | 5    | extension byte of 24 bit frames |
//! | 6    | address byte |
//! | 7    | opcode byte |
//!
//! with the remainder zeroed. The adapter answers with blocks that carry the
//! read mode in byte 0, the read type in byte 1, the frame content in bytes 3
//! to 5 and the echoed sequence number in byte 8.

use crate::{
    error::ProtocolError,
    frame::{now, Frame, Status, TxFrame},
};

use super::Exchange;

/// The size of every packet exchanged with the adapter.
pub const PACKET_SIZE: usize = 64;
/// The smallest reply that can be decoded.
pub const MIN_REPLY_SIZE: usize = 9;

/// Command: send a frame.
pub const CMD_SEND: u8 = 0x12;
/// Command: send a frame and wait for a backframe.
pub const CMD_SEND_ANSWER: u8 = 0x15;

/// Control flag: send the frame twice.
pub const CTRL_TWICE: u8 = 0x20;

/// Write type of an 8 bit frame.
pub const WRITE_TYPE_8BIT: u8 = 0x02;
/// Write type of a 16 bit frame.
pub const WRITE_TYPE_16BIT: u8 = 0x03;
/// Write type of a 24 bit frame.
pub const WRITE_TYPE_24BIT: u8 = 0x06;

/// Read mode of adapter information.
pub const READ_MODE_INFO: u8 = 0x01;
/// Read mode of a frame observed on the bus.
pub const READ_MODE_OBSERVE: u8 = 0x11;
/// Read mode of the adapter's response to a host command.
pub const READ_MODE_RESPONSE: u8 = 0x12;

/// Read type reporting that no frame arrived.
pub const READ_TYPE_NO_FRAME: u8 = 0x71;
/// Read type of an 8 bit frame.
pub const READ_TYPE_8BIT: u8 = 0x72;
/// Read type of a 16 bit frame.
pub const READ_TYPE_16BIT: u8 = 0x73;
/// Read type of a 24 bit frame.
pub const READ_TYPE_24BIT: u8 = 0x76;
/// Read type of an information report.
pub const READ_TYPE_INFO: u8 = 0x77;

/// Information sub-code: a frame error was seen.
pub const STATUS_FRAME_ERROR: u8 = 0x03;
/// Information sub-code: the bus is ok.
pub const STATUS_OK: u8 = 0x04;

/// Encode a frame into a host block.
///
/// The frame's length must already have been validated.
pub(crate) fn encode(frame: &TxFrame, sequence: u8, exchange: Exchange) -> [u8; PACKET_SIZE] {
    let data = frame.data();
    let [_, ext, address, opcode] = data.to_be_bytes();
    let (write_type, ext, address) = match frame.length() {
        24 => (WRITE_TYPE_24BIT, ext, address),
        16 => (WRITE_TYPE_16BIT, 0, address),
        _ => (WRITE_TYPE_8BIT, 0, 0),
    };
    let command = match exchange {
        Exchange::Send => CMD_SEND,
        Exchange::Query => CMD_SEND_ANSWER,
    };
    log::trace!(
        "OUT: CMD={command:#04X} SEQ={sequence:#04X} TYC={write_type:#04X} \
         EXT={ext:#04X} ADR={address:#04X} OCB={opcode:#04X}"
    );

    let mut block = [0; PACKET_SIZE];
    block[0] = command;
    block[1] = sequence;
    block[2] = if frame.send_twice() { CTRL_TWICE } else { 0 };
    block[3] = write_type;
    block[5] = ext;
    block[6] = address;
    block[7] = opcode;
    block
}

/// Decode an adapter block.
pub(crate) fn decode(raw: &[u8]) -> Result<Frame, ProtocolError> {
    if raw.len() < MIN_REPLY_SIZE {
        return Err(ProtocolError::new(format!(
            "expected a reply of at least {MIN_REPLY_SIZE} bytes, received {}",
            raw.len()
        )));
    }
    let mode = raw[0];
    let read_type = raw[1];
    let content = u32::from_be_bytes([0, raw[3], raw[4], raw[5]]);
    let sequence = raw[8];
    let timestamp = now();

    let data_status = if mode == READ_MODE_OBSERVE {
        Status::Frame
    } else {
        Status::Loopback
    };
    let frame = match read_type {
        READ_TYPE_8BIT => Frame::data_frame(timestamp, data_status, 8, content & 0xFF),
        READ_TYPE_16BIT => Frame::data_frame(timestamp, data_status, 16, content & 0xFFFF),
        READ_TYPE_24BIT => Frame::data_frame(timestamp, data_status, 24, content),
        READ_TYPE_NO_FRAME => Frame::event(timestamp, Status::Timeout, 0),
        READ_TYPE_INFO => {
            let code = raw[5];
            let status = match code {
                STATUS_OK => Status::Recover,
                STATUS_FRAME_ERROR => Status::Timing,
                _ => Status::General,
            };
            Frame::event(timestamp, status, 0).with_code(code)
        }
        other => Frame::event(timestamp, Status::General, 0).with_code(other),
    };
    Ok(frame.with_sequence(sequence))
}

#[cfg(test)]
mod test {
    use super::*;

    fn reply(mode: u8, read_type: u8, content: [u8; 3], sequence: u8) -> [u8; PACKET_SIZE] {
        let mut block = [0; PACKET_SIZE];
        block[0] = mode;
        block[1] = read_type;
        block[3..6].copy_from_slice(&content);
        block[8] = sequence;
        block
    }

    #[test]
    fn encode_layout() {
        let block = encode(&TxFrame::new(24, 0x12_34_56), 7, Exchange::Send);
        assert_eq!(block.len(), PACKET_SIZE);
        assert_eq!(
            block[..8],
            [CMD_SEND, 7, 0, WRITE_TYPE_24BIT, 0, 0x12, 0x34, 0x56]
        );
        assert!(block[8..].iter().all(|&b| b == 0));

        let block = encode(&TxFrame::new(16, 0x12_34_56), 8, Exchange::Send);
        assert_eq!(block[..8], [CMD_SEND, 8, 0, WRITE_TYPE_16BIT, 0, 0, 0x34, 0x56]);

        let block = encode(
            &TxFrame::new(8, 0xA5).with_send_twice(true),
            9,
            Exchange::Query,
        );
        assert_eq!(
            block[..8],
            [CMD_SEND_ANSWER, 9, CTRL_TWICE, WRITE_TYPE_8BIT, 0, 0, 0, 0xA5]
        );
    }

    #[test]
    fn decode_data_frames() {
        let frame = decode(&reply(READ_MODE_RESPONSE, READ_TYPE_16BIT, [0, 0xFF, 0x00], 2)).unwrap();
        assert_eq!(frame.status(), Status::Loopback);
        assert_eq!((frame.length(), frame.data()), (16, 0xFF00));
        assert_eq!(frame.sequence(), Some(2));

        let frame = decode(&reply(READ_MODE_OBSERVE, READ_TYPE_8BIT, [0, 0, 0x42], 3)).unwrap();
        assert_eq!(frame.status(), Status::Frame);
        assert_eq!((frame.length(), frame.data()), (8, 0x42));

        let frame = decode(&reply(READ_MODE_RESPONSE, READ_TYPE_24BIT, [0x01, 0x02, 0x03], 4)).unwrap();
        assert_eq!((frame.length(), frame.data()), (24, 0x01_02_03));
    }

    #[test]
    fn decode_events() {
        let frame = decode(&reply(READ_MODE_RESPONSE, READ_TYPE_NO_FRAME, [0; 3], 5)).unwrap();
        assert_eq!(frame.status(), Status::Timeout);
        assert_eq!(frame.sequence(), Some(5));

        let frame = decode(&reply(READ_MODE_INFO, READ_TYPE_INFO, [0, 0, STATUS_OK], 0)).unwrap();
        assert_eq!(frame.status(), Status::Recover);
        assert_eq!(frame.code(), Some(STATUS_OK));

        let frame =
            decode(&reply(READ_MODE_INFO, READ_TYPE_INFO, [0, 0, STATUS_FRAME_ERROR], 0)).unwrap();
        assert_eq!(frame.status(), Status::Timing);

        let frame = decode(&reply(READ_MODE_INFO, READ_TYPE_INFO, [0, 0, 0x02], 0)).unwrap();
        assert_eq!(frame.status(), Status::General);

        // 25 bit and DSI frames are not supported.
        let frame = decode(&reply(READ_MODE_OBSERVE, 0x74, [0; 3], 0)).unwrap();
        assert_eq!(frame.status(), Status::General);
        assert_eq!(frame.code(), Some(0x74));
    }

    #[test]
    fn short_reply_is_rejected() {
        let err = decode(&[READ_MODE_RESPONSE, READ_TYPE_8BIT, 0, 0]).unwrap_err();
        assert!(err.message().contains("received 4"), "{err}");
        assert!(decode(&[]).is_err());
    }
}
