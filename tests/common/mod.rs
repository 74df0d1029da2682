//! Shared fixtures for the end-to-end tests: a tiny LSB-first bit packer,
//! hand-built Vorbis header/packet byte sequences and an Ogg page wrapper.
//!
//! Every byte sequence here is built against the public API only
//! (`vorbis_core::ogg::crc`), mirroring the `build_page` style helpers used
//! by the crate's own unit tests, but kept in one place so all six
//! end-to-end scenarios can share them.

use vorbis_core::ogg::crc;

/// LSB-first bit packer, matching `BitpackCursor`'s read order: the first
/// bit written ends up as bit 0 of the first byte.
pub struct BitWriter {
	bytes :Vec<u8>,
	cur :u8,
	cur_bits :u8,
}

impl BitWriter {
	pub fn new() -> Self {
		BitWriter { bytes : Vec::new(), cur : 0, cur_bits : 0 }
	}
	pub fn write_bits(&mut self, value :u64, n :u8) {
		for i in 0 .. n {
			let bit = (value >> i) & 1;
			self.cur |= (bit as u8) << self.cur_bits;
			self.cur_bits += 1;
			if self.cur_bits == 8 {
				self.bytes.push(self.cur);
				self.cur = 0;
				self.cur_bits = 0;
			}
		}
	}
	pub fn finish(mut self) -> Vec<u8> {
		if self.cur_bits > 0 {
			self.bytes.push(self.cur);
		}
		self.bytes
	}
}

/// Vorbis float32 packing used by codebook min/delta value fields
/// (see `header::read_codebook`). Only exact powers handled here: callers
/// pass already-packed 32 bit patterns, this is just named constants.
pub const VFLOAT_ZERO :u32 = 0;
pub const VFLOAT_ONE :u32 = 0x6000_0000;

/// Builds a 30 byte ident header packet body (the 7 byte "\x01vorbis"
/// prefix plus the fixed-size ident fields, all byte aligned).
pub fn ident_header(channels :u8, sample_rate :u32, blocksize_0 :u8, blocksize_1 :u8) -> Vec<u8> {
	let mut v = Vec::new();
	v.push(1u8);
	v.extend_from_slice(b"vorbis");
	v.extend_from_slice(&1u32.to_le_bytes()); // vorbis_version
	v.push(channels);
	v.extend_from_slice(&sample_rate.to_le_bytes());
	v.extend_from_slice(&0i32.to_le_bytes()); // bitrate_maximum
	v.extend_from_slice(&0i32.to_le_bytes()); // bitrate_nominal
	v.extend_from_slice(&0i32.to_le_bytes()); // bitrate_minimum
	v.push((blocksize_0 & 0xf) | ((blocksize_1 & 0xf) << 4));
	v.push(1u8); // framing bit set (lsb)
	v
}

/// Builds a minimal empty comment header packet body.
pub fn comment_header() -> Vec<u8> {
	let mut v = Vec::new();
	v.push(3u8);
	v.extend_from_slice(b"vorbis");
	v.extend_from_slice(&0u32.to_le_bytes()); // vendor_length
	v.extend_from_slice(&0u32.to_le_bytes()); // comment_count
	v.push(1u8); // framing bit
	v
}

/// A minimal setup header whose floor is type 0 with `amplitude_bits = 0`
/// (the instant-silence shortcut, see `audio::floor_zero_decode`) and whose
/// residue is type 2 with every channel's `do_not_decode_flag` set (the
/// instant-zero-fill shortcut, see `audio::residue_packet_decode`). Audio
/// packets built against this setup consume only the 3 header bits
/// (packet type, window flags) and decode deterministically to all-zero
/// output.
pub fn setup_header_silent() -> Vec<u8> {
	let mut w = BitWriter::new();
	w.write_bits(1, 8);
	for b in b"vorbis" {
		w.write_bits(*b as u64, 8);
	}

	// codebook_count - 1 = 0: a single trivial 2 entry / 1 dimension
	// complete Huffman tree (lengths [1, 1], no VQ lookup). Unused by the
	// silent shortcuts, but `read_header_setup` requires at least one
	// codebook to exist before it will accept the setup header.
	w.write_bits(0, 8);
	w.write_bits(0x564342, 24); // codebook sync pattern
	w.write_bits(1, 16); // codebook_dimensions
	w.write_bits(2, 24); // codebook_entries
	w.write_bits(0, 1); // ordered = false
	w.write_bits(0, 1); // sparse = false
	w.write_bits(0, 5); // entry 0 length - 1 = 0 -> length 1
	w.write_bits(0, 5); // entry 1 length - 1 = 0 -> length 1
	w.write_bits(0, 4); // lookup_type = 0 (none)

	// time_count - 1 = 0, one placeholder that must be 0
	w.write_bits(0, 6);
	w.write_bits(0, 16);

	// floor_count - 1 = 0: floor type 0, amplitude_bits = 0
	w.write_bits(0, 6);
	w.write_bits(0, 16); // floor type 0
	w.write_bits(1, 8); // floor0_order
	w.write_bits(1, 16); // floor0_rate
	w.write_bits(1, 16); // floor0_bark_map_size
	w.write_bits(0, 6); // floor0_amplitude_bits = 0 -> Unused shortcut
	w.write_bits(0, 8); // floor0_amplitude_offset
	w.write_bits(0, 4); // floor0_number_of_books - 1 = 0
	w.write_bits(0, 8); // book_list[0] = codebook 0

	// residue_count - 1 = 0: residue type 2, classifications = 1,
	// every channel do_not_decode -> instant zero fill
	w.write_bits(0, 6);
	w.write_bits(2, 16); // residue_type
	w.write_bits(0, 24); // residue_begin
	w.write_bits(4, 24); // residue_end
	w.write_bits(0, 24); // residue_partition_size - 1 = 0 -> size 1
	w.write_bits(0, 6); // residue_classifications - 1 = 0 -> 1
	w.write_bits(0, 8); // residue_classbook = codebook 0
	// cascade for the single classification: low_bits = 0, no high bits
	w.write_bits(0, 3);
	w.write_bits(0, 1);
	// residue_books[0]: vals_used = 0 -> zero bits read

	// mapping_count - 1 = 0: mapping type 0, no submaps, no coupling
	w.write_bits(0, 6);
	w.write_bits(0, 16); // mapping_type
	w.write_bits(0, 1); // submaps flag = false
	w.write_bits(0, 1); // coupling flag = false
	w.write_bits(0, 2); // reserved
	w.write_bits(0, 8); // submap[0] reserved
	w.write_bits(0, 8); // submap[0] floor = 0
	w.write_bits(0, 8); // submap[0] residue = 0

	// mode_count - 1 = 0: one long-block mode
	w.write_bits(0, 6);
	w.write_bits(1, 1); // mode_blockflag = true
	w.write_bits(0, 16); // mode_windowtype
	w.write_bits(0, 16); // mode_transformtype
	w.write_bits(0, 8); // mode_mapping = 0

	w.write_bits(1, 1); // framing bit
	w.finish()
}

/// A silent audio packet for the stream built by `setup_header_silent`:
/// packet type 0, mode number elided (only one mode), previous/next window
/// flags both set for a long block.
pub fn silent_audio_packet() -> Vec<u8> {
	let mut w = BitWriter::new();
	w.write_bits(0, 1); // packet type: audio
	w.write_bits(1, 1); // previous window flag
	w.write_bits(1, 1); // next window flag
	w.finish()
}

/// Wraps `body` in a single Ogg page, computing and patching in the CRC.
/// `flags` bits: 0x01 continues_packet, 0x02 begin_of_stream,
/// 0x04 end_of_stream.
pub fn build_page(
	stream_serial :i32,
	sequence_number :i32,
	granule_position :i64,
	flags :u8,
	body :&[u8],
) -> Vec<u8> {
	let mut segments = Vec::new();
	let mut remaining = body.len();
	if remaining == 0 {
		segments.push(0u8);
	}
	while remaining > 0 {
		if remaining >= 255 {
			segments.push(255);
			remaining -= 255;
		} else {
			segments.push(remaining as u8);
			remaining = 0;
		}
	}
	if body.len() > 0 && body.len() % 255 == 0 {
		segments.push(0);
	}

	let mut page = Vec::new();
	page.extend_from_slice(b"OggS");
	page.push(0); // version
	page.push(flags);
	page.extend_from_slice(&granule_position.to_le_bytes());
	page.extend_from_slice(&stream_serial.to_le_bytes());
	page.extend_from_slice(&sequence_number.to_le_bytes());
	page.extend_from_slice(&0u32.to_le_bytes()); // crc placeholder
	page.push(segments.len() as u8);
	page.extend_from_slice(&segments);
	page.extend_from_slice(body);

	let crc_val = crc::compute(&page);
	page[22 .. 26].copy_from_slice(&crc_val.to_le_bytes());
	page
}

/// Builds the 3 header pages (ident, comment, setup) for a minimal silent
/// stream on the given serial, each its own page.
pub fn header_pages(
	serial :i32,
	channels :u8,
	sample_rate :u32,
	blocksize_0 :u8,
	blocksize_1 :u8,
	start_seq :i32,
) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(&build_page(serial, start_seq, -1, 0x02,
			&ident_header(channels, sample_rate, blocksize_0, blocksize_1)));
	out.extend_from_slice(&build_page(serial, start_seq + 1, -1, 0,
			&comment_header()));
	out.extend_from_slice(&build_page(serial, start_seq + 2, -1, 0,
			&setup_header_silent()));
	out
}

/// Builds `count` silent audio packets, one per page, with granule
/// positions set to the cumulative decoded sample count (0 for the first,
/// priming, packet and 1024 per packet afterwards for a 2048 long block).
/// Sets `end_of_stream` on the last page.
pub fn silent_audio_pages(serial :i32, start_seq :i32, count :i32) -> Vec<u8> {
	let mut out = Vec::new();
	let mut granule :i64 = 0;
	for i in 0 .. count {
		if i > 0 {
			granule += 1024;
		}
		let flags = if i == count - 1 { 0x04 } else { 0 };
		out.extend_from_slice(&build_page(serial, start_seq + i, granule, flags,
				&silent_audio_packet()));
	}
	out
}

/// A setup header exercising a real (non-shortcut) floor/residue decode
/// path: one floor type 1 with zero partitions (so it only needs the 2
/// unconditional `floor1_y` values, no subclass codebooks) and one residue
/// type 2 whose single classification actually decodes through a codebook
/// with a VQ lookup table. Used to probe truncated-packet / mid-field
/// end-of-packet handling (see `audio::residue_packet_decode_inner`'s
/// `eno!` early-return).
pub fn setup_header_residue_probe() -> Vec<u8> {
	let mut w = BitWriter::new();
	w.write_bits(1, 8);
	for b in b"vorbis" {
		w.write_bits(*b as u64, 8);
	}

	// codebook_count - 1 = 1: two codebooks.
	w.write_bits(1, 8);

	// codebook 0: plain 2 entry / 1 dimension Huffman tree, no VQ lookup.
	// Used as the residue classbook (class words only, no value lookup).
	w.write_bits(0x564342, 24);
	w.write_bits(1, 16); // dimensions
	w.write_bits(2, 24); // entries
	w.write_bits(0, 1); // ordered = false
	w.write_bits(0, 1); // sparse = false
	w.write_bits(0, 5); // entry 0 length - 1
	w.write_bits(0, 5); // entry 1 length - 1
	w.write_bits(0, 4); // lookup_type = 0

	// codebook 1: same tree shape, but with a VQ lookup (type 1) mapping
	// entry 0 -> 0.0 and entry 1 -> 1.0, used as the residue's pass-0 book.
	w.write_bits(0x564342, 24);
	w.write_bits(1, 16);
	w.write_bits(2, 24);
	w.write_bits(0, 1);
	w.write_bits(0, 1);
	w.write_bits(0, 5);
	w.write_bits(0, 5);
	w.write_bits(1, 4); // lookup_type = 1
	w.write_bits(VFLOAT_ZERO as u64, 32); // codebook_minimum_value = 0.0
	w.write_bits(VFLOAT_ONE as u64, 32); // codebook_delta_value = 1.0
	w.write_bits(0, 4); // codebook_value_bits - 1 = 0 -> 1 bit
	w.write_bits(0, 1); // codebook_sequence_p = false
	// lookup1_values(entries=2, dims=1) = 2, one multiplicand per entry
	w.write_bits(0, 1); // multiplicand for entry 0 -> 0.0
	w.write_bits(1, 1); // multiplicand for entry 1 -> 1.0

	// time_count - 1 = 0
	w.write_bits(0, 6);
	w.write_bits(0, 16);

	// floor_count - 1 = 0: floor type 1, zero partitions
	w.write_bits(0, 6);
	w.write_bits(1, 16); // floor type 1
	w.write_bits(0, 5); // floor1_partitions = 0
	w.write_bits(0, 2); // floor1_multiplier - 1 = 0 -> multiplier 1 -> range 256
	w.write_bits(8, 4); // rangebits = 8

	// residue_count - 1 = 0: residue type 2, classifications = 1
	w.write_bits(0, 6);
	w.write_bits(2, 16); // residue_type
	w.write_bits(0, 24); // residue_begin
	w.write_bits(4, 24); // residue_end
	w.write_bits(0, 24); // residue_partition_size - 1 = 0 -> size 1
	w.write_bits(0, 6); // residue_classifications - 1 = 0 -> 1
	w.write_bits(0, 8); // residue_classbook = codebook 0
	w.write_bits(1, 3); // cascade low_bits = 1 -> pass 0 has a book
	w.write_bits(0, 1); // cascade bitflag = false
	w.write_bits(1, 8); // residue_books[0].val_i[0] = codebook 1

	// mapping_count - 1 = 0
	w.write_bits(0, 6);
	w.write_bits(0, 16); // mapping_type
	w.write_bits(0, 1); // submaps flag = false
	w.write_bits(0, 1); // coupling flag = false
	w.write_bits(0, 2); // reserved
	w.write_bits(0, 8); // submap[0] reserved
	w.write_bits(0, 8); // submap[0] floor = 0
	w.write_bits(0, 8); // submap[0] residue = 0

	// mode_count - 1 = 0: one long-block mode
	w.write_bits(0, 6);
	w.write_bits(1, 1); // mode_blockflag = true
	w.write_bits(0, 16);
	w.write_bits(0, 16);
	w.write_bits(0, 8); // mode_mapping = 0

	w.write_bits(1, 1); // framing bit
	w.finish()
}

/// A full (untruncated) audio packet against `setup_header_residue_probe`:
/// floor1_y values both 0, residue decoded across all 4 partitions with
/// entries `[1.0, 0.0, 1.0, 0.0]`. 28 bits, padded out to 4 bytes.
pub fn residue_probe_audio_packet() -> Vec<u8> {
	let mut w = BitWriter::new();
	w.write_bits(0, 1); // packet type: audio
	w.write_bits(1, 1); // previous window flag
	w.write_bits(1, 1); // next window flag
	w.write_bits(1, 1); // floor nonzero flag: used
	w.write_bits(0, 8); // floor1_y[0]
	w.write_bits(0, 8); // floor1_y[1]
	// 4 residue partitions, each a classword bit (don't-care, classifications=1)
	// followed by the VQ entry bit selecting 1.0 or 0.0.
	for entry in &[1u64, 0, 1, 0] {
		w.write_bits(0, 1); // classword
		w.write_bits(*entry, 1); // entry
	}
	w.finish()
}

/// Truncates `residue_probe_audio_packet`'s bytes to 3 bytes (24 bits),
/// cutting off mid-residue after exactly 2 of the 4 partitions: the
/// remaining two partitions' bins are left zero-filled by
/// `residue_packet_decode_inner`'s end-of-packet handling rather than
/// erroring out.
pub fn residue_probe_audio_packet_truncated() -> Vec<u8> {
	let full = residue_probe_audio_packet();
	full[.. 3].to_vec()
}
