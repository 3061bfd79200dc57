//! Bounded recent-block window and rolling block-time statistics.

use nchain_types::BlockHeader;
use std::collections::VecDeque;

/// Fixed-capacity FIFO of recent headers with their ingest timestamps.
///
/// The oldest entry is evicted first; consecutive duplicates (same hash as
/// the newest entry) are ignored. Block-time statistics are derived only
/// once the window holds the minimum sample count.
pub struct BlockWindow {
	capacity: usize,
	min_samples: usize,
	headers: VecDeque<BlockHeader>,
	/// Millisecond timestamps paired with `headers`.
	timestamps: VecDeque<u64>,
}

impl BlockWindow {
	pub fn new(capacity: usize, min_samples: usize) -> Self {
		Self {
			capacity,
			min_samples,
			headers: VecDeque::with_capacity(capacity),
			timestamps: VecDeque::with_capacity(capacity),
		}
	}

	/// Folds a header into the window.
	pub fn push(&mut self, header: BlockHeader, at_ms: u64) {
		if self
			.headers
			.back()
			.is_some_and(|last| last.hash == header.hash)
		{
			return;
		}
		self.headers.push_back(header);
		self.timestamps.push_back(at_ms);
		while self.headers.len() > self.capacity {
			self.headers.pop_front();
			self.timestamps.pop_front();
		}
	}

	pub fn len(&self) -> usize {
		self.headers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.headers.is_empty()
	}

	pub fn newest(&self) -> Option<&BlockHeader> {
		self.headers.back()
	}

	/// Pairwise inter-block intervals in seconds and their mean, once the
	/// minimum sample count is reached.
	pub fn block_times(&self) -> Option<(Vec<f64>, f64)> {
		if self.headers.len() < self.min_samples {
			return None;
		}

		let mut intervals = Vec::with_capacity(self.timestamps.len() - 1);
		let mut total = 0.0;
		for i in 0..self.timestamps.len() - 1 {
			let delta = self.timestamps[i + 1].saturating_sub(self.timestamps[i]) as f64 / 1000.0;
			intervals.push(delta);
			total += delta;
		}

		if intervals.is_empty() {
			return None;
		}
		let mean = total / intervals.len() as f64;
		Some((intervals, mean))
	}
}
