/*!
Buffered reader over a byte source, with a cooperative reentrant lock.

Grounded directly on SPEC §4.1 ("Buffered reader") and §5/§9
("Shared resource" / "Thread-affinity lock"): the teacher crate has no
analogue of its own, since it always delegates Ogg framing (and therefore
buffering) to the external `ogg` crate. This module owns that job instead.
*/

use std::cell::Cell;
use std::io::{self, Read, Seek, SeekFrom};

/// Identity of whoever currently holds the cooperative lock.
///
/// The spec calls this "the executor"; in a single-threaded, callback-free
/// Rust crate the simplest faithful realization is an opaque token minted
/// once per logical call-site that needs to hold the lock across more than
/// one read/seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderId(u64);

fn next_holder_id() -> HolderId {
	use std::sync::atomic::{AtomicU64, Ordering};
	static NEXT :AtomicU64 = AtomicU64::new(1);
	HolderId(NEXT.fetch_add(1, Ordering::Relaxed))
}

impl HolderId {
	/// Mints a fresh, process-unique holder identity.
	pub fn new() -> Self {
		next_holder_id()
	}
}

/// Error returned when the cooperative lock contract is violated.
#[derive(Debug)]
pub struct SynchronizationLockError;

impl std::fmt::Display for SynchronizationLockError {
	fn fmt(&self, f :&mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "lock held by a different holder")
	}
}

impl std::error::Error for SynchronizationLockError {}

struct LockState {
	holder :Cell<Option<HolderId>>,
	depth :Cell<u32>,
}

impl LockState {
	fn new() -> Self {
		LockState { holder : Cell::new(None), depth : Cell::new(0) }
	}

	fn take(&self, who :HolderId) -> Result<(), SynchronizationLockError> {
		match self.holder.get() {
			None => {
				self.holder.set(Some(who));
				self.depth.set(1);
				Ok(())
			},
			Some(h) if h == who => {
				self.depth.set(self.depth.get() + 1);
				Ok(())
			},
			Some(_) => Err(SynchronizationLockError),
		}
	}

	fn release(&self, who :HolderId) -> Result<(), SynchronizationLockError> {
		match self.holder.get() {
			Some(h) if h == who => {
				let d = self.depth.get() - 1;
				self.depth.set(d);
				if d == 0 {
					self.holder.set(None);
				}
				Ok(())
			},
			_ => Err(SynchronizationLockError),
		}
	}
}

/// Errors a [`BufferedReader`] can surface while reading from its source.
#[derive(Debug)]
pub enum BufReaderError {
	Io(io::Error),
	/// Surfaced when read/seek is reached past dispose().
	Disposed,
	Lock(SynchronizationLockError),
}

impl From<io::Error> for BufReaderError {
	fn from(e :io::Error) -> Self { BufReaderError::Io(e) }
}

impl From<SynchronizationLockError> for BufReaderError {
	fn from(e :SynchronizationLockError) -> Self { BufReaderError::Lock(e) }
}

impl std::fmt::Display for BufReaderError {
	fn fmt(&self, f :&mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			BufReaderError::Io(e) => write!(f, "io error: {}", e),
			BufReaderError::Disposed => write!(f, "buffered reader used after dispose"),
			BufReaderError::Lock(e) => write!(f, "{}", e),
		}
	}
}

impl std::error::Error for BufReaderError {}

/// Default cap on how large the sliding window is allowed to grow, per §4.1
/// ("grows on demand up to a configured maximum"). See [`super::super::DecoderOptions`].
pub const DEFAULT_MAX_BUFFER_SIZE :usize = 256 * 1024;

/// Sliding-window buffered reader over an arbitrary `Read (+ Seek)` source.
///
/// Bytes are addressed by absolute stream position. `discard_through`
/// releases everything at or before a given position, matching §4.1's
/// "never look before pos again" contract.
pub struct BufferedReader<T> {
	inner :T,
	seekable :bool,
	buf :Vec<u8>,
	/// Absolute stream offset of `buf[0]`.
	buf_base :u64,
	/// Absolute offset of the next byte `inner` will yield.
	source_pos :u64,
	max_buffer_size :usize,
	lock :LockState,
	disposed :bool,
}

impl<T :Read> BufferedReader<T> {
	pub fn new(inner :T) -> Self {
		Self::with_max_buffer_size(inner, DEFAULT_MAX_BUFFER_SIZE)
	}

	pub fn with_max_buffer_size(inner :T, max_buffer_size :usize) -> Self {
		BufferedReader {
			inner,
			seekable : false,
			buf : Vec::new(),
			buf_base : 0,
			source_pos : 0,
			max_buffer_size,
			lock : LockState::new(),
			disposed : false,
		}
	}

	pub fn take_lock(&self, who :HolderId) -> Result<(), SynchronizationLockError> {
		self.lock.take(who)
	}

	pub fn release_lock(&self, who :HolderId) -> Result<(), SynchronizationLockError> {
		self.lock.release(who)
	}

	pub fn dispose(&mut self) {
		self.disposed = true;
		self.buf.clear();
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed
	}

	/// Ensures bytes `[pos, pos+len)` are present in `buf`, fetching more
	/// from the source as needed. Bytes before `buf_base` are assumed
	/// already discarded and cannot be re-fetched from a non-seekable
	/// source; seekable sources rewind as needed.
	fn fill_through(&mut self, pos :u64, len :usize) -> Result<(), BufReaderError> {
		if self.disposed {
			return Err(BufReaderError::Disposed);
		}
		let want_end = pos + len as u64;
		let have_end = self.buf_base + self.buf.len() as u64;
		if want_end <= have_end && pos >= self.buf_base {
			return Ok(());
		}
		if pos < self.buf_base {
			// Only possible to serve if re-seekable; otherwise this is a
			// caller bug (reading before the discard frontier).
			return Err(BufReaderError::Io(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				"read before discarded prefix",
			)));
		}
		let mut need = (want_end - have_end) as usize;
		// Grow in reasonably large chunks to avoid read() storms, bounded by
		// max_buffer_size relative to buf_base.
		let mut chunk = vec![0u8; need.max(4096)];
		while need > 0 {
			let n = self.inner.read(&mut chunk)?;
			if n == 0 {
				return Err(BufReaderError::Io(io::Error::new(
					io::ErrorKind::UnexpectedEof,
					"unexpected end of stream",
				)));
			}
			self.buf.extend_from_slice(&chunk[..n]);
			self.source_pos += n as u64;
			need = need.saturating_sub(n);
		}
		// Enforce the configured maximum by discarding the oldest bytes we
		// no longer strictly need, if the caller never calls discard_through.
		if self.buf.len() > self.max_buffer_size {
			let drop_n = self.buf.len() - self.max_buffer_size;
			// Never drop bytes the caller might still read via `pos`.
			let safe_drop = drop_n.min((pos - self.buf_base) as usize);
			if safe_drop > 0 {
				self.buf.drain(0..safe_drop);
				self.buf_base += safe_drop as u64;
			}
		}
		Ok(())
	}

	pub fn read_byte(&mut self, pos :u64) -> Result<u8, BufReaderError> {
		self.fill_through(pos, 1)?;
		let idx = (pos - self.buf_base) as usize;
		Ok(self.buf[idx])
	}

	pub fn read(&mut self, pos :u64, dst :&mut [u8]) -> Result<(), BufReaderError> {
		self.fill_through(pos, dst.len())?;
		let idx = (pos - self.buf_base) as usize;
		dst.copy_from_slice(&self.buf[idx..idx + dst.len()]);
		Ok(())
	}

	/// Releases everything at or before `pos`; the reader promises never to
	/// look before `pos` again.
	pub fn discard_through(&mut self, pos :u64) {
		if pos <= self.buf_base {
			return;
		}
		let drop_n = ((pos - self.buf_base) as usize).min(self.buf.len());
		self.buf.drain(0..drop_n);
		self.buf_base += drop_n as u64;
	}
}

impl<T :Read + Seek> BufferedReader<T> {
	pub fn new_seekable(mut inner :T) -> io::Result<Self> {
		let pos = inner.seek(SeekFrom::Current(0))?;
		let mut r = Self::new(inner);
		r.seekable = true;
		r.source_pos = pos;
		Ok(r)
	}

	/// Seeks the underlying source directly, dropping all buffered state.
	/// Used by the packet reader's binary-search seek.
	pub fn seek(&mut self, pos :u64) -> Result<(), BufReaderError> {
		if self.disposed {
			return Err(BufReaderError::Disposed);
		}
		self.inner.seek(SeekFrom::Start(pos))?;
		self.source_pos = pos;
		self.buf.clear();
		self.buf_base = pos;
		Ok(())
	}

	pub fn length(&mut self) -> Result<u64, BufReaderError> {
		let cur = self.inner.seek(SeekFrom::Current(0))?;
		let end = self.inner.seek(SeekFrom::End(0))?;
		self.inner.seek(SeekFrom::Start(cur))?;
		Ok(end)
	}

	pub fn can_seek(&self) -> bool {
		self.seekable
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn test_read_byte_sequential() {
		let data :Vec<u8> = (0..64).collect();
		let mut r = BufferedReader::new(Cursor::new(data.clone()));
		for i in 0..64u64 {
			assert_eq!(r.read_byte(i).unwrap(), data[i as usize]);
		}
	}

	#[test]
	fn test_discard_then_reread_fails() {
		let data :Vec<u8> = (0..16).collect();
		let mut r = BufferedReader::new(Cursor::new(data));
		r.read_byte(10).unwrap();
		r.discard_through(8);
		assert!(r.read_byte(2).is_err());
		assert!(r.read_byte(9).is_ok());
	}

	#[test]
	fn test_lock_reentrant() {
		let r = BufferedReader::new(Cursor::new(vec![0u8; 4]));
		let h = HolderId::new();
		r.take_lock(h).unwrap();
		r.take_lock(h).unwrap();
		r.release_lock(h).unwrap();
		r.release_lock(h).unwrap();
		// Now unlocked; a different holder can take it.
		let h2 = HolderId::new();
		r.take_lock(h2).unwrap();
		r.release_lock(h2).unwrap();
	}

	#[test]
	fn test_lock_wrong_holder_errors() {
		let r = BufferedReader::new(Cursor::new(vec![0u8; 4]));
		let h1 = HolderId::new();
		let h2 = HolderId::new();
		r.take_lock(h1).unwrap();
		assert!(r.take_lock(h2).is_err());
		assert!(r.release_lock(h2).is_err());
	}

	#[test]
	fn test_dispose_blocks_further_reads() {
		let mut r = BufferedReader::new(Cursor::new(vec![1u8, 2, 3]));
		r.dispose();
		assert!(r.read_byte(0).is_err());
	}
}
