/*!
Ogg page parsing: sync, CRC validation, resynchronization.

Grounded on `other_examples/661f9959_hasenbanck-ogg-bitstream__src-reader.rs.rs`
(`sync_with_next_page`, `read_page_data`, `verify_crc32`) and
`other_examples/d581d56d_pdeljanov-Symphonia__symphonia-format-ogg-src-page.rs.rs`
for the page header field layout. Restructured against this crate's own
[`super::bufreader::BufferedReader`] and against SPEC §4.3's exact flag
semantics, since neither reference file shares this crate's buffering layer.
*/

use super::bufreader::{BufferedReader, BufReaderError, HolderId};
use super::crc;
use std::io::{Read, Seek};

/// Page sync bytes, "OggS".
const CAPTURE_PATTERN :[u8; 4] = *b"OggS";

/// Maximum possible page size: 4-byte header fixed fields (22 bytes with
/// segment count) + up to 255 segments of up to 255 bytes each.
const MAX_PAGE_SIZE :usize = 27 + 255 + 255 * 255;

/// How far `find_next_page` searches for the next sync pattern before
/// giving up, per §4.3's "searches forward up to 65536 bytes".
pub const DEFAULT_RESYNC_SEARCH_LIMIT :usize = 65536;

#[derive(Debug, Clone, Copy, Default)]
pub struct PageFlags {
	pub continues_packet :bool,
	pub begin_of_stream :bool,
	pub end_of_stream :bool,
}

impl PageFlags {
	fn from_byte(b :u8) -> Self {
		PageFlags {
			continues_packet : b & 0x01 != 0,
			begin_of_stream : b & 0x02 != 0,
			end_of_stream : b & 0x04 != 0,
		}
	}
}

/// A single parsed Ogg page.
#[derive(Debug, Clone)]
pub struct Page {
	pub stream_serial :i32,
	pub flags :PageFlags,
	pub granule_position :i64,
	pub sequence_number :i32,
	/// Raw segment table (lacing values), one per fragment-or-continuation
	/// segment, length ≤ 255.
	pub segment_table :Vec<u8>,
	/// Absolute byte offset of this page's body (first byte after the
	/// header and segment table).
	pub data_offset :u64,
	/// The page body itself, length `segment_table.iter().sum()`.
	pub data :Vec<u8>,
	/// Set when bytes were skipped to find this page (corruption recovery).
	pub is_resync :bool,
}

impl Page {
	/// Splits the page body into packet fragments per the lacing table: a
	/// run of 255-byte segments followed by a terminator (<255, including
	/// 0) forms one complete fragment; a page ending mid-run yields one
	/// final incomplete (continued) fragment.
	///
	/// Returns `(fragment_bytes, is_continued)` pairs in order.
	pub fn fragments(&self) -> Vec<(&[u8], bool)> {
		let mut out = Vec::new();
		let mut offset = 0usize;
		let mut run_start = 0usize;
		let mut i = 0usize;
		while i < self.segment_table.len() {
			let seg_len = self.segment_table[i] as usize;
			offset += seg_len;
			if seg_len < 255 {
				out.push((&self.data[run_start..offset], false));
				run_start = offset;
			}
			i += 1;
		}
		if run_start < offset {
			out.push((&self.data[run_start..offset], true));
		}
		out
	}
}

#[derive(Debug)]
pub enum PageReadError {
	Io(BufReaderError),
	/// No sync pattern found within the search limit; hard end-of-scan.
	SyncNotFound,
	CrcMismatch,
	InvalidVersion,
}

impl From<BufReaderError> for PageReadError {
	fn from(e :BufReaderError) -> Self { PageReadError::Io(e) }
}

impl std::fmt::Display for PageReadError {
	fn fmt(&self, f :&mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			PageReadError::Io(e) => write!(f, "{}", e),
			PageReadError::SyncNotFound => write!(f, "no Ogg page sync pattern found"),
			PageReadError::CrcMismatch => write!(f, "page CRC mismatch"),
			PageReadError::InvalidVersion => write!(f, "unsupported Ogg page version"),
		}
	}
}

impl std::error::Error for PageReadError {}

/// Reads successive Ogg pages from a buffered byte source, handling CRC
/// validation and resynchronization after corruption. New-serial detection
/// (§4.3's `new_stream` notification) is the packet-reader layer's job
/// (`PacketReader::drain_new_streams`), since it is the layer that tracks
/// which serials have already been observed.
pub struct PageReader<T> {
	reader :BufferedReader<T>,
	next_page_offset :u64,
	resync_search_limit :usize,
	/// Total bytes skipped while resyncing, across the lifetime of this
	/// reader; exposed to the decoder as "waste bits" (×8).
	pub waste_bytes :u64,
}

impl<T :Read> PageReader<T> {
	pub fn new(inner :T) -> Self {
		Self::new_with_limit(inner, DEFAULT_RESYNC_SEARCH_LIMIT)
	}

	pub fn new_with_limit(inner :T, resync_search_limit :usize) -> Self {
		PageReader {
			reader : BufferedReader::new(inner),
			next_page_offset : 0,
			resync_search_limit,
			waste_bytes : 0,
		}
	}

	pub fn dispose(&mut self) {
		self.reader.dispose();
	}

	pub fn discard_through(&mut self, pos :u64) {
		self.reader.discard_through(pos);
	}

	/// Scans forward from `next_page_offset` for the next valid page,
	/// skipping and counting bytes as needed on corruption, per §4.3.
	pub fn find_next_page(&mut self, holder :HolderId) -> Result<Page, PageReadError> {
		self.reader.take_lock(holder).map_err(BufReaderError::from)?;
		let result = self.find_next_page_locked();
		self.reader.release_lock(holder).map_err(BufReaderError::from)?;
		result
	}

	fn find_next_page_locked(&mut self) -> Result<Page, PageReadError> {
		let mut pos = self.next_page_offset;
		let mut skipped = 0usize;
		loop {
			if skipped > self.resync_search_limit {
				return Err(PageReadError::SyncNotFound);
			}
			// Fast path: check for the 4-byte capture pattern directly.
			let mut magic = [0u8; 4];
			if self.reader.read(pos, &mut magic).is_err() {
				return Err(PageReadError::SyncNotFound);
			}
			if magic != CAPTURE_PATTERN {
				pos += 1;
				skipped += 1;
				continue;
			}
			match self.try_parse_page_at(pos) {
				Ok(mut page) => {
					page.is_resync = skipped > 0;
					if skipped > 0 {
						log::warn!(
							"Ogg resync: skipped {} bytes before recovering a valid page at offset {}",
							skipped, pos,
						);
						self.waste_bytes += skipped as u64;
					}
					self.next_page_offset = page.data_offset + page.data.len() as u64;
					self.reader.discard_through(self.next_page_offset);
					return Ok(page);
				},
				Err(_) => {
					// Not a real page at this offset (CRC mismatch, bad
					// version, or truncated); keep scanning byte by byte.
					pos += 1;
					skipped += 1;
					continue;
				},
			}
		}
	}

	/// Total bytes skipped while resyncing.
	pub fn waste_bytes(&self) -> u64 {
		self.waste_bytes
	}

	fn try_parse_page_at(&mut self, pos :u64) -> Result<Page, PageReadError> {
		let mut header = [0u8; 27];
		self.reader.read(pos, &mut header)?;
		if &header[0..4] != &CAPTURE_PATTERN {
			return Err(PageReadError::InvalidVersion);
		}
		let version = header[4];
		if version != 0 {
			return Err(PageReadError::InvalidVersion);
		}
		let flags = PageFlags::from_byte(header[5]);
		let granule_position = i64::from_le_bytes(header[6..14].try_into().unwrap());
		let stream_serial = i32::from_le_bytes(header[14..18].try_into().unwrap());
		let sequence_number = i32::from_le_bytes(header[18..22].try_into().unwrap());
		let stored_crc = u32::from_le_bytes(header[22..26].try_into().unwrap());
		let segment_count = header[26] as usize;

		let mut segment_table = vec![0u8; segment_count];
		self.reader.read(pos + 27, &mut segment_table)?;
		let body_len :usize = segment_table.iter().map(|&b| b as usize).sum();
		if 27 + segment_count + body_len > MAX_PAGE_SIZE {
			return Err(PageReadError::InvalidVersion);
		}
		let mut data = vec![0u8; body_len];
		self.reader.read(pos + 27 + segment_count as u64, &mut data)?;

		// CRC is computed over header+segment_table+data with the 4 CRC
		// bytes zeroed.
		let mut crc_buf = Vec::with_capacity(27 + segment_count);
		crc_buf.extend_from_slice(&header[0..22]);
		crc_buf.extend_from_slice(&[0u8; 4]);
		crc_buf.push(header[26]);
		crc_buf.extend_from_slice(&segment_table);
		let mut computed = crc::compute(&crc_buf);
		computed = crc::update(computed, &data);
		if computed != stored_crc {
			return Err(PageReadError::CrcMismatch);
		}

		Ok(Page {
			stream_serial,
			flags,
			granule_position,
			sequence_number,
			segment_table,
			data_offset : pos + 27 + segment_count as u64,
			data,
			is_resync : false,
		})
	}
}

impl<T :Read + Seek> PageReader<T> {
	/// Jumps the underlying source to an arbitrary byte offset and resets
	/// scanning to resume from there; used by the packet reader's seek.
	pub fn seek_to_byte_offset(&mut self, holder :HolderId, offset :u64) -> Result<(), PageReadError> {
		self.reader.take_lock(holder).map_err(BufReaderError::from)?;
		let result = self.reader.seek(offset);
		self.reader.release_lock(holder).map_err(BufReaderError::from)?;
		result?;
		self.next_page_offset = offset;
		Ok(())
	}

	/// Total length in bytes of the underlying source.
	pub fn reader_length(&mut self) -> Result<u64, PageReadError> {
		Ok(self.reader.length()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn build_page(serial :i32, seq :i32, granule :i64, body :&[u8], flags :u8) -> Vec<u8> {
		let mut segs = Vec::new();
		let mut remaining = body.len();
		if remaining == 0 {
			segs.push(0);
		}
		while remaining >= 255 {
			segs.push(255);
			remaining -= 255;
		}
		if remaining > 0 || segs.is_empty() {
			segs.push(remaining as u8);
		}
		let mut header = Vec::new();
		header.extend_from_slice(b"OggS");
		header.push(0); // version
		header.push(flags);
		header.extend_from_slice(&granule.to_le_bytes());
		header.extend_from_slice(&serial.to_le_bytes());
		header.extend_from_slice(&seq.to_le_bytes());
		header.extend_from_slice(&[0u8; 4]); // crc placeholder
		header.push(segs.len() as u8);
		header.extend_from_slice(&segs);
		header.extend_from_slice(body);

		let mut crc_input = header.clone();
		crc_input[22..26].copy_from_slice(&[0, 0, 0, 0]);
		let crc = crc::compute(&crc_input);
		header[22..26].copy_from_slice(&crc.to_le_bytes());
		header
	}

	#[test]
	fn test_parse_single_simple_page() {
		let body = b"hello vorbis world";
		let page_bytes = build_page(42, 0, 0, body, 0x02);
		let mut reader = PageReader::new(Cursor::new(page_bytes));
		let holder = HolderId::new();
		let page = reader.find_next_page(holder).unwrap();
		assert_eq!(page.stream_serial, 42);
		assert_eq!(page.data, body);
		assert!(!page.is_resync);
		assert!(page.flags.begin_of_stream);
	}

	#[test]
	fn test_resync_after_garbage() {
		let mut stream = vec![0xFFu8; 17];
		stream.extend_from_slice(&build_page(7, 0, 0, b"payload-after-garbage", 0x02));
		let mut reader = PageReader::new(Cursor::new(stream));
		let holder = HolderId::new();
		let page = reader.find_next_page(holder).unwrap();
		assert!(page.is_resync);
		assert_eq!(reader.waste_bytes, 17);
	}

	#[test]
	fn test_crc_corruption_causes_resync_to_next_page() {
		let mut good1 = build_page(1, 0, 0, b"first page body", 0x02);
		// corrupt one byte in the body of the first page
		let last = good1.len() - 1;
		good1[last] ^= 0xFF;
		let good2 = build_page(1, 1, 10, b"second page body", 0);
		let mut stream = good1;
		stream.extend_from_slice(&good2);
		let mut reader = PageReader::new(Cursor::new(stream));
		let holder = HolderId::new();
		let page = reader.find_next_page(holder).unwrap();
		assert_eq!(page.sequence_number, 1);
		assert_eq!(page.data, b"second page body");
	}

	#[test]
	fn test_fragments_single_terminated_segment() {
		let body = b"short packet";
		let page_bytes = build_page(1, 0, 0, body, 0x02);
		let mut reader = PageReader::new(Cursor::new(page_bytes));
		let holder = HolderId::new();
		let page = reader.find_next_page(holder).unwrap();
		let frags = page.fragments();
		assert_eq!(frags.len(), 1);
		assert_eq!(frags[0].0, body);
		assert!(!frags[0].1);
	}

	#[test]
	fn test_fragments_continued_run() {
		let body = vec![7u8; 255];
		let page_bytes = build_page(1, 0, 0, &body, 0x02);
		let mut reader = PageReader::new(Cursor::new(page_bytes));
		let holder = HolderId::new();
		let page = reader.find_next_page(holder).unwrap();
		let frags = page.fragments();
		assert_eq!(frags.len(), 1);
		assert!(frags[0].1, "a full 255-byte-only segment run must be continued");
	}
}
