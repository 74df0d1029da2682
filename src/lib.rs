// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

#![forbid(unsafe_code)]
#![cfg_attr(test, deny(warnings))]

/*!
A pull-based Vorbis I / Ogg decoder core, written in Rust.

If you "just" want to decode `ogg/vorbis` files, take a look at the
[`decoder`] module, whose `StreamDecoder` owns the Ogg demuxing, header
parsing and per-packet audio decode end to end.

For lower level, per-packet usage, have a look at the `audio` and
`header` modules. The `ogg` module is the in-tree Ogg framing layer
(page parsing, CRC validation, packet reassembly) that `decoder` sits on
top of.
*/

extern crate byteorder;
extern crate tinyvec;
#[macro_use]
extern crate log;

/*
// This little thing is very useful.
macro_rules! try {
	($expr:expr) => (match $expr {
		$crate::std::result::Result::Ok(val) => val,
		$crate::std::result::Result::Err(err) => {
			panic!("Panic on Err turned on for debug reasons. Encountered Err: {:?}", err)
		}
	})
}
// */

// The following macros are super useful for debugging

macro_rules! record_residue_pre_inverse {
	($residue_vectors:expr) => {
// 		for v in $residue_vectors.iter() {
// 			for &re in v {
// 				println!("{}", re);
// 			}
// 		}
	}
}

macro_rules! record_residue_post_inverse {
	($residue_vectors:expr) => {
// 		for v in $residue_vectors.iter() {
// 			for &re in v {
// 				println!("{}", re);
// 			}
// 		}
	}
}

macro_rules! record_pre_mdct {
	($audio_spectri:expr) => {
// 		for v in $audio_spectri.iter() {
// 			for &s in v {
// 				println!("{:.5}", s);
// 			}
// 		}
	}
}

macro_rules! record_post_mdct {
	($audio_spectri:expr) => {
// 		for v in $audio_spectri.iter() {
// 			for &s in v {
// 				println!("{:.4}", s);
// 			}
// 		}
	}
}

pub mod header;
mod header_cached;
mod huffman_tree;
mod imdct;
pub mod audio;
mod bitpacking;
pub mod ogg;
mod ringbuffer;
pub mod decoder;
pub mod samples;

/// Tunables for a [`decoder::StreamDecoder`], with conservative defaults
/// matching the teacher's hardcoded constants.
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
	/// Clip interleaved `f32` output to `[-1.0, 1.0]` and count how many
	/// samples hit the boundary (see `decoder::Stats::clip_count`).
	pub clip_enabled :bool,
	/// How many bytes `ogg::page::PageReader::find_next_page` searches
	/// forward for a sync pattern before giving up with `UnexpectedEof`.
	pub resync_search_limit :usize,
	/// How many packets before a seek target to additionally decode and
	/// discard, priming window overlap state ahead of the requested
	/// position.
	pub seek_preroll_packets :usize,
}

impl Default for DecoderOptions {
	fn default() -> Self {
		DecoderOptions {
			clip_enabled : true,
			resync_search_limit : ogg::page::DEFAULT_RESYNC_SEARCH_LIMIT,
			seek_preroll_packets : 2,
		}
	}
}

/// Errors that can occur during decoding.
#[derive(Debug)]
pub enum DecoderError {
	InvalidData,
	CrcMismatch,
	UnexpectedEof,
	EndOfPacket,
	OutOfRange,
	Disposed,
	SynchronizationLock,
}

impl std::error::Error for DecoderError {}

impl std::fmt::Display for DecoderError {
	fn fmt(&self, fmt :&mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
		let msg = match *self {
			DecoderError::InvalidData => "invalid or malformed Vorbis/Ogg bitstream data",
			DecoderError::CrcMismatch => "Ogg page CRC mismatch",
			DecoderError::UnexpectedEof => "unexpected end of bitstream",
			DecoderError::EndOfPacket => "ran out of bits decoding a packet",
			DecoderError::OutOfRange => "requested position is out of range",
			DecoderError::Disposed => "decoder used after dispose",
			DecoderError::SynchronizationLock => "cooperative lock violation on the shared byte source",
		};
		write!(fmt, "{}", msg)
	}
}

impl From<ogg::OggReadError> for DecoderError {
	fn from(err :ogg::OggReadError) -> DecoderError {
		match err {
			ogg::OggReadError::InvalidData => DecoderError::InvalidData,
			ogg::OggReadError::CrcMismatch => DecoderError::CrcMismatch,
			ogg::OggReadError::UnexpectedEof => DecoderError::UnexpectedEof,
			ogg::OggReadError::OutOfRange => DecoderError::OutOfRange,
			ogg::OggReadError::SynchronizationLock => DecoderError::SynchronizationLock,
			ogg::OggReadError::Disposed => DecoderError::Disposed,
		}
	}
}

impl From<ogg::packet::PacketReadError> for DecoderError {
	fn from(err :ogg::packet::PacketReadError) -> DecoderError {
		DecoderError::from(ogg::OggReadError::from(err))
	}
}

impl From<header::HeaderReadError> for DecoderError {
	fn from(err :header::HeaderReadError) -> DecoderError {
		match err {
			header::HeaderReadError::EndOfPacket => DecoderError::EndOfPacket,
			_ => DecoderError::InvalidData,
		}
	}
}

impl From<audio::AudioReadError> for DecoderError {
	fn from(err :audio::AudioReadError) -> DecoderError {
		match err {
			audio::AudioReadError::EndOfPacket => DecoderError::EndOfPacket,
			_ => DecoderError::InvalidData,
		}
	}
}

fn ilog(val :u64) -> u8 {
	64 - val.leading_zeros() as u8
}

#[test]
fn test_ilog() {
	// Uses the test vectors from the Vorbis I spec
	assert_eq!(ilog(0), 0);
	assert_eq!(ilog(1), 1);
	assert_eq!(ilog(2), 2);
	assert_eq!(ilog(3), 2);
	assert_eq!(ilog(4), 3);
	assert_eq!(ilog(7), 3);
}

fn bit_reverse(n :u32) -> u32 {
	// From the stb_vorbis implementation
	let mut nn = n;
	nn = ((nn & 0xAAAAAAAA) >> 1) | ((nn & 0x55555555) << 1);
	nn = ((nn & 0xCCCCCCCC) >> 2) | ((nn & 0x33333333) << 2);
	nn = ((nn & 0xF0F0F0F0) >> 4) | ((nn & 0x0F0F0F0F) << 4);
	nn = ((nn & 0xFF00FF00) >> 8) | ((nn & 0x00FF00FF) << 8);
	return (nn >> 16) | (nn << 16);
}


#[allow(dead_code)]
fn print_u8_slice(arr :&[u8]) {
	if arr.len() <= 4 {
		for a in arr {
			print!("0x{:02x} ", a);
		}
		println!("");
		return;
	}
	println!("[");
	let mut i :usize = 0;
	while i * 4 < arr.len() - 4 {
		println!("\t0x{:02x}, 0x{:02x}, 0x{:02x}, 0x{:02x},",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2], arr[i * 4 + 3]);
		i += 1;
	}
	match arr.len() as i64 - i as i64 * 4 {
		1 => println!("\t0x{:02x}];", arr[i * 4]),
		2 => println!("\t0x{:02x}, 0x{:02x}];", arr[i * 4], arr[i * 4 + 1]),
		3 => println!("\t0x{:02x}, 0x{:02x}, 0x{:02x}];",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2]),
		4 => println!("\t0x{:02x}, 0x{:02x}, 0x{:02x}, 0x{:02x}];",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2], arr[i * 4 + 3]),
		de => panic!("impossible value {}", de),
	}
}

#[allow(dead_code)]
fn print_u32_slice(arr :&[u32]) {
	if arr.len() <= 4 {
		for a in arr {
			print!("0x{:02x} ", a);
		}
		println!("");
		return;
	}
	println!("[");
	let mut i :usize = 0;
	while i * 4 < arr.len() - 4 {
		println!("\t0x{:08x}, 0x{:08x}, 0x{:08x}, 0x{:08x},",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2], arr[i * 4 + 3]);
		i += 1;
	}
	match arr.len() as i64 - i as i64 * 4 {
		1 => println!("\t0x{:08x}];", arr[i * 4]),
		2 => println!("\t0x{:08x}, 0x{:08x}];", arr[i * 4], arr[i * 4 + 1]),
		3 => println!("\t0x{:08x}, 0x{:08x}, 0x{:08x}];",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2]),
		4 => println!("\t0x{:08x}, 0x{:08x}, 0x{:08x}, 0x{:08x}];",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2], arr[i * 4 + 3]),
		de => panic!("impossible value {}", de),
	}
}


#[allow(dead_code)]
fn print_f64_slice(arr :&[f64]) {
	if arr.len() <= 4 {
		for a in arr {
			print!("0x{} ", a);
		}
		println!("");
		return;
	}
	println!("[");
	let mut i :usize = 0;
	while i * 4 < arr.len() - 4 {
		println!("\t{}, {}, {}, {},",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2], arr[i * 4 + 3]);
		i += 1;
	}
	match arr.len() as i64 - i as i64 * 4 {
		1 => println!("\t{}];", arr[i * 4]),
		2 => println!("\t{}, {}];", arr[i * 4], arr[i * 4 + 1]),
		3 => println!("\t{}, {}, {}];",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2]),
		4 => println!("\t{}, {}, {}, {}];",
				arr[i * 4], arr[i * 4 + 1], arr[i * 4 + 2], arr[i * 4 + 3]),
		de => panic!("impossible value {}", de),
	}
}
