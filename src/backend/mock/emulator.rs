//! Scripted adapters answering the writes of a [`Mock`](super::Mock).

use crate::codec::{binary, status_code};
use crate::command::{Command, MAX_LENGTH, TERMINATOR};

/// Shortest legal half bit period, in µs.
const HALF_BIT_MIN_US: u32 = 350;
/// Longest legal half bit period, in µs.
const HALF_BIT_MAX_US: u32 = 500;
/// Shortest legal full bit period, in µs.
const FULL_BIT_MIN_US: u32 = 700;
/// Longest legal full bit period, in µs.
const FULL_BIT_MAX_US: u32 = 1000;
/// Bus power-downs longer than this are system failures, in µs.
const SYSTEM_FAILURE_US: u32 = 550_000;
/// Firmware version reported by `?`.
const VERSION: &str = "Version 2.0.0";

/// Emulates a serial adapter on a bus without other participants.
#[derive(Debug, Default)]
pub(super) struct TextAdapter {
	/// The adapter clock, in ms.
	ticks: u32,
	/// The raw sequence being set up, in µs.
	sequence: Vec<u32>,
}

impl TextAdapter {
	pub(super) fn respond(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
		let mut replies = Vec::new();
		for line in bytes.split(|&b| b == TERMINATOR).filter(|line| !line.is_empty()) {
			let command = std::str::from_utf8(line)
				.ok()
				.and_then(|line| line.parse::<Command>().ok());
			match command {
				Some(command) => self.execute(command, &mut replies),
				None => replies.push(self.status(status_code::BAD_COMMAND, 0)),
			}
		}
		replies
	}

	fn execute(&mut self, command: Command, replies: &mut Vec<Vec<u8>>) {
		match command {
			Command::Send { length, data, .. } => replies.push(self.loopback(length, data)),
			Command::SendTwice { length, data, .. } => {
				replies.push(self.loopback(length, data));
				replies.push(self.loopback(length, data));
			}
			Command::Repeat {
				repeat,
				length,
				data,
				..
			} => {
				for _ in 0..=repeat {
					replies.push(self.loopback(length, data));
				}
			}
			Command::Backframe(data) => replies.push(self.loopback(8, u32::from(data))),
			Command::SequenceStart(period) => self.sequence = vec![period],
			Command::SequenceNext(period) => {
				if self.sequence.is_empty() {
					replies.push(self.status(status_code::CAN_NOT_PROCESS, 0));
				} else {
					self.sequence.push(period);
				}
			}
			Command::SequenceExecute => {
				let sequence = std::mem::take(&mut self.sequence);
				self.play(&sequence, replies);
			}
			Command::Version => replies.push(VERSION.as_bytes().to_vec()),
		}
	}

	/// Put a raw sequence on the bus and report what the receiver saw.
	fn play(&mut self, periods: &[u32], replies: &mut Vec<Vec<u8>>) {
		let Some(&first) = periods.first() else {
			replies.push(self.status(status_code::CAN_NOT_PROCESS, 0));
			return;
		};
		if first > SYSTEM_FAILURE_US {
			replies.push(self.status(status_code::SYSTEM_FAILURE, 0));
			self.ticks += first / 1000;
			replies.push(self.status(status_code::SYSTEM_RECOVER, first << 8));
			return;
		}
		match decode_manchester(periods) {
			Ok((length, data)) => replies.push(self.loopback(length, data)),
			Err(Violation { code, elapsed_us, bit }) => {
				replies.push(self.status(code, (elapsed_us << 8) | u32::from(bit)));
			}
		}
	}

	/// Report a frame the adapter put on the bus, then let time pass.
	fn loopback(&mut self, length: u8, data: u32) -> Vec<u8> {
		let line = self.line(b'>', length, data);
		// Start bit, data bits and stop condition at 0.833 ms per bit.
		self.ticks += (u32::from(length) + 4) * 833 / 1000 + 1;
		line
	}

	fn status(&self, code: u8, data: u32) -> Vec<u8> {
		self.line(b'*', code, data)
	}

	fn line(&self, class: u8, code: u8, data: u32) -> Vec<u8> {
		format!("{{{:08x}{}{code:02x} {data:08x}}}\r\n", self.ticks, char::from(class)).into_bytes()
	}
}

/// A timing violation found while decoding a raw sequence.
#[derive(Debug, PartialEq, Eq)]
struct Violation {
	code: u8,
	elapsed_us: u32,
	bit: u8,
}

/// Decode alternating bus levels, starting with the active level, into the
/// bits of a frame.
fn decode_manchester(periods: &[u32]) -> Result<(u8, u32), Violation> {
	// Each entry is one half bit; `true` is the active (low) bus level.
	let mut halves = Vec::with_capacity(periods.len() * 2);
	for (index, &period) in periods.iter().enumerate() {
		let active = index % 2 == 0;
		let count = if (HALF_BIT_MIN_US..=HALF_BIT_MAX_US).contains(&period) {
			1
		} else if index > 0 && (FULL_BIT_MIN_US..=FULL_BIT_MAX_US).contains(&period) {
			2
		} else {
			let (code, bit) = if index == 0 {
				(status_code::RECEIVE_START_TIMING, 0)
			} else {
				(
					status_code::RECEIVE_DATA_TIMING,
					u8::try_from(halves.len() / 2).unwrap_or(u8::MAX),
				)
			};
			return Err(Violation {
				code,
				elapsed_us: period,
				bit,
			});
		};
		halves.extend(std::iter::repeat_n(active, count));
	}
	// The bus returns to idle after the last period.
	if halves.len() % 2 == 1 {
		halves.push(false);
	}

	let mut bits = halves.chunks_exact(2).enumerate().map(|(index, pair)| match pair {
		[true, false] => Ok(1),
		[false, true] => Ok(0),
		_ => Err(Violation {
			code: status_code::RECEIVE_DATA_TIMING,
			elapsed_us: 0,
			bit: index as u8,
		}),
	});
	// Start bit.
	bits.next().transpose()?;
	let mut length = 0u8;
	let mut data = 0u32;
	for bit in bits {
		// The receiver gives up on frames longer than it can report.
		if length == MAX_LENGTH {
			return Err(Violation {
				code: status_code::RECEIVE_DATA_TIMING,
				elapsed_us: 0,
				bit: MAX_LENGTH + 1,
			});
		}
		data = (data << 1) | bit?;
		length += 1;
	}
	Ok((length, data))
}

/// Emulates a USB adapter on a bus without other participants.
pub(super) fn respond_binary(block: &[u8]) -> Vec<Vec<u8>> {
	if block.len() < 8 {
		return Vec::new();
	}
	let (command, sequence, control, write_type) = (block[0], block[1], block[2], block[3]);
	let read_type = match write_type {
		binary::WRITE_TYPE_8BIT => binary::READ_TYPE_8BIT,
		binary::WRITE_TYPE_16BIT => binary::READ_TYPE_16BIT,
		binary::WRITE_TYPE_24BIT => binary::READ_TYPE_24BIT,
		_ => return Vec::new(),
	};
	let reply = |read_type: u8, content: [u8; 3]| {
		let mut reply = vec![0; binary::PACKET_SIZE];
		reply[0] = binary::READ_MODE_RESPONSE;
		reply[1] = read_type;
		reply[3..6].copy_from_slice(&content);
		reply[8] = sequence;
		reply
	};

	let echo = reply(read_type, [block[5], block[6], block[7]]);
	let mut replies = vec![echo.clone()];
	if control & binary::CTRL_TWICE != 0 {
		replies.push(echo);
	}
	if command == binary::CMD_SEND_ANSWER {
		replies.push(reply(binary::READ_TYPE_NO_FRAME, [0; 3]));
	}
	replies
}
