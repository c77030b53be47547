//! The bounded queue between a session's receive worker and its caller.
//!
//! Frames are never discarded: a full queue blocks the producer until the
//! consumer catches up. The queue also carries the session's running flag and
//! sequence counters, so that all of them are guarded by the same lock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::frame::Frame;

/// The number of frames a queue holds by default.
pub const DEFAULT_CAPACITY: usize = 40;

/// The sequence number preceding the first one assigned.
const INITIAL_SEQUENCE: u8 = 1;

/// A bounded, thread-safe FIFO of received [`Frame`]s.
///
/// ```
/// use dali_adapter::{frame::{Frame, Status}, queue::FrameQueue};
/// use std::time::Duration;
///
/// let queue = FrameQueue::new(2);
/// queue.start();
/// queue.push(Frame::data_frame(0.0, Status::Loopback, 8, 0xFF)).unwrap();
/// assert_eq!(queue.pop(Duration::ZERO).data(), 0xFF);
/// assert_eq!(queue.pop(Duration::from_millis(1)).status(), Status::Timeout);
/// ```
#[derive(Debug)]
pub struct FrameQueue {
	capacity: usize,
	inner: Mutex<Inner>,
	not_empty: Condvar,
	not_full: Condvar,
}

#[derive(Debug)]
struct Inner {
	frames: VecDeque<Frame>,
	running: bool,
	last_sent: u8,
	last_received: Option<u8>,
}

impl FrameQueue {
	/// Create a stopped queue holding up to `capacity` frames.
	///
	/// A capacity of zero is treated as one.
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		FrameQueue {
			capacity,
			inner: Mutex::new(Inner {
				frames: VecDeque::with_capacity(capacity),
				running: false,
				last_sent: INITIAL_SEQUENCE,
				last_received: None,
			}),
			not_empty: Condvar::new(),
			not_full: Condvar::new(),
		}
	}

	/// The most frames the queue holds.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Mark the producer as running.
	pub fn start(&self) {
		self.inner.lock().running = true;
	}

	/// Mark the producer as stopped and wake everyone waiting on the queue.
	pub fn stop(&self) {
		self.inner.lock().running = false;
		self.not_empty.notify_all();
		self.not_full.notify_all();
	}

	/// Whether the producer is running.
	pub fn is_running(&self) -> bool {
		self.inner.lock().running
	}

	/// Append a frame, waiting for space while the queue is full.
	///
	/// ## Errors
	///
	/// If the queue is full and stopped, or is stopped while waiting, the
	/// frame is handed back.
	pub fn push(&self, frame: Frame) -> Result<(), Frame> {
		let mut inner = self.inner.lock();
		while inner.frames.len() >= self.capacity {
			if !inner.running {
				return Err(frame);
			}
			self.not_full.wait(&mut inner);
		}
		inner.frames.push_back(frame);
		drop(inner);
		self.not_empty.notify_one();
		Ok(())
	}

	/// Remove the oldest frame, waiting up to `timeout` for one to arrive.
	///
	/// If none arrives in time a [`Timeout`](crate::frame::Status::Timeout)
	/// frame is returned.
	pub fn pop(&self, timeout: Duration) -> Frame {
		self.wait_for_frame(Instant::now().checked_add(timeout), false)
			.unwrap_or_else(Frame::timeout)
	}

	/// Remove the oldest frame, waiting until `timeout` expires or the
	/// producer stops. A `timeout` of `None` waits without limit.
	///
	/// Returns `None` if no frame arrived.
	pub fn pop_while_running(&self, timeout: Option<Duration>) -> Option<Frame> {
		let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
		self.wait_for_frame(deadline, true)
	}

	/// Remove the oldest frame without waiting.
	pub fn try_pop(&self) -> Option<Frame> {
		let mut inner = self.inner.lock();
		self.take_front(&mut inner)
	}

	/// The number of queued frames.
	pub fn len(&self) -> usize {
		self.inner.lock().frames.len()
	}

	/// Whether no frames are queued.
	pub fn is_empty(&self) -> bool {
		self.inner.lock().frames.is_empty()
	}

	/// Discard all queued frames.
	pub fn clear(&self) {
		self.inner.lock().frames.clear();
		self.not_full.notify_all();
	}

	/// Advance and return the sequence number for the next transmission.
	///
	/// The first number returned is `2`; numbers wrap after `255`.
	pub fn next_sequence(&self) -> u8 {
		let mut inner = self.inner.lock();
		inner.last_sent = inner.last_sent.wrapping_add(1);
		inner.last_sent
	}

	/// The sequence number of the most recent transmission.
	pub fn last_sent_sequence(&self) -> u8 {
		self.inner.lock().last_sent
	}

	/// The sequence number of the most recently removed frame, if it had one.
	pub fn last_received_sequence(&self) -> Option<u8> {
		self.inner.lock().last_received
	}

	fn wait_for_frame(&self, deadline: Option<Instant>, while_running: bool) -> Option<Frame> {
		let mut inner = self.inner.lock();
		loop {
			if let Some(frame) = self.take_front(&mut inner) {
				return Some(frame);
			}
			if while_running && !inner.running {
				return None;
			}
			match deadline {
				Some(deadline) => {
					if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
						return self.take_front(&mut inner);
					}
				}
				None => self.not_empty.wait(&mut inner),
			}
		}
	}

	fn take_front(&self, inner: &mut Inner) -> Option<Frame> {
		let frame = inner.frames.pop_front()?;
		inner.last_received = frame.sequence();
		self.not_full.notify_one();
		Some(frame)
	}
}

impl Default for FrameQueue {
	fn default() -> Self {
		FrameQueue::new(DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::frame::Status;
	use std::{sync::Arc, thread};

	fn frame(data: u32) -> Frame {
		Frame::data_frame(0.0, Status::Loopback, 16, data)
	}

	#[test]
	fn pop_times_out() {
		let queue = FrameQueue::new(5);
		let start = Instant::now();
		let popped = queue.pop(Duration::from_millis(50));
		assert_eq!(popped.status(), Status::Timeout);
		assert!(start.elapsed() >= Duration::from_millis(50));
	}

	#[test]
	fn fifo_order() {
		let queue = FrameQueue::new(5);
		for data in 0..3 {
			queue.push(frame(data)).unwrap();
		}
		assert_eq!(queue.len(), 3);
		for data in 0..3 {
			assert_eq!(queue.pop(Duration::ZERO).data(), data);
		}
		assert!(queue.is_empty());
	}

	#[test]
	fn full_queue_blocks_without_loss() {
		let queue = Arc::new(FrameQueue::new(5));
		queue.start();
		let producer = {
			let queue = Arc::clone(&queue);
			thread::spawn(move || {
				for data in 0..7 {
					queue.push(frame(data)).unwrap();
				}
			})
		};

		// The producer fills the queue and then waits for space.
		let start = Instant::now();
		while queue.len() < 5 && start.elapsed() < Duration::from_secs(5) {
			thread::sleep(Duration::from_millis(5));
		}
		thread::sleep(Duration::from_millis(50));
		assert_eq!(queue.len(), 5);
		assert!(!producer.is_finished());

		let received: Vec<u32> = (0..7)
			.map(|_| queue.pop(Duration::from_secs(5)).data())
			.collect();
		assert_eq!(received, (0..7).collect::<Vec<_>>());
		producer.join().unwrap();
		assert!(queue.is_empty());
	}

	#[test]
	fn stopping_releases_blocked_producer() {
		let queue = Arc::new(FrameQueue::new(1));
		queue.start();
		queue.push(frame(0)).unwrap();
		let producer = {
			let queue = Arc::clone(&queue);
			thread::spawn(move || queue.push(frame(1)))
		};
		thread::sleep(Duration::from_millis(20));
		queue.stop();
		assert_eq!(producer.join().unwrap().unwrap_err().data(), 1);
		// Frames queued before stopping can still be consumed.
		assert_eq!(queue.try_pop().map(|f| f.data()), Some(0));
	}

	#[test]
	fn pop_while_running_returns_when_stopped() {
		let queue = Arc::new(FrameQueue::new(1));
		queue.start();
		let stopper = {
			let queue = Arc::clone(&queue);
			thread::spawn(move || {
				thread::sleep(Duration::from_millis(20));
				queue.stop();
			})
		};
		assert_eq!(queue.pop_while_running(None), None);
		stopper.join().unwrap();
		assert_eq!(queue.pop_while_running(Some(Duration::ZERO)), None);
	}

	#[test]
	fn sequence_numbers() {
		let queue = FrameQueue::default();
		assert_eq!(queue.capacity(), DEFAULT_CAPACITY);
		assert_eq!(queue.next_sequence(), 2);
		assert_eq!(queue.next_sequence(), 3);
		for _ in 0..252 {
			queue.next_sequence();
		}
		assert_eq!(queue.last_sent_sequence(), 255);
		assert_eq!(queue.next_sequence(), 0);

		queue.push(frame(1).with_sequence(9)).unwrap();
		assert_eq!(queue.last_received_sequence(), None);
		queue.pop(Duration::ZERO);
		assert_eq!(queue.last_received_sequence(), Some(9));
	}

	#[test]
	fn clear_discards_frames() {
		let queue = FrameQueue::new(3);
		queue.push(frame(1)).unwrap();
		queue.push(frame(2)).unwrap();
		queue.clear();
		assert!(queue.is_empty());
		assert_eq!(queue.try_pop(), None);
	}
}
