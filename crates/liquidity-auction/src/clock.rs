//! Block height and time sources for the in-memory host chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Current position of the host chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
	pub block: u64,
	/// Unix seconds.
	pub time: u64,
}

pub trait Clock: Send + Sync {
	fn now(&self) -> BlockContext;
}

/// Clock advanced explicitly by tests.
#[derive(Debug, Default)]
pub struct ManualClock {
	block: AtomicU64,
	time: AtomicU64,
}

impl ManualClock {
	pub fn new(block: u64, time: u64) -> Self {
		Self {
			block: AtomicU64::new(block),
			time: AtomicU64::new(time),
		}
	}

	pub fn advance_blocks(&self, blocks: u64) {
		self.block.fetch_add(blocks, Ordering::SeqCst);
	}

	pub fn set_time(&self, time: u64) {
		self.time.store(time, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> BlockContext {
		BlockContext {
			block: self.block.load(Ordering::SeqCst),
			time: self.time.load(Ordering::SeqCst),
		}
	}
}

/// Produces one block every `block_time`, measured on the tokio clock.
///
/// Follows `tokio::time::pause`, so tests with paused time see blocks advance
/// as their sleeps auto-advance.
#[derive(Debug)]
pub struct WallClock {
	started: Instant,
	unix_at_start: u64,
	block_time: Duration,
}

impl WallClock {
	pub fn new(block_time: Duration) -> Self {
		let unix_at_start = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or(0);
		Self {
			started: Instant::now(),
			unix_at_start,
			block_time: block_time.max(Duration::from_millis(1)),
		}
	}
}

impl Clock for WallClock {
	fn now(&self) -> BlockContext {
		let elapsed = self.started.elapsed();
		BlockContext {
			block: (elapsed.as_millis() / self.block_time.as_millis()) as u64,
			time: self.unix_at_start + elapsed.as_secs(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock() {
		let clock = ManualClock::new(10, 1_000);
		clock.advance_blocks(3);
		clock.set_time(1_005);
		assert_eq!(
			clock.now(),
			BlockContext {
				block: 13,
				time: 1_005,
			}
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wall_clock_follows_tokio_time() {
		let clock = WallClock::new(Duration::from_millis(500));
		let start = clock.now();
		assert_eq!(start.block, 0);

		tokio::time::sleep(Duration::from_millis(2_600)).await;
		let later = clock.now();
		assert_eq!(later.block, 5);
		assert_eq!(later.time, start.time + 2);
	}
}
