/*!
Ogg CRC-32.

Polynomial `0x04C11DB7`, no input or output reflection, initial value `0`,
no final XOR. This is the "CRC" field used by the Ogg page header (RFC 3533
section 6), computed with the CRC field itself zeroed.
*/

const POLY :u32 = 0x04c1_1db7;

fn build_table() -> [u32; 256] {
	let mut table = [0u32; 256];
	let mut i = 0;
	while i < 256 {
		let mut r = (i as u32) << 24;
		let mut j = 0;
		while j < 8 {
			r = if r & 0x8000_0000 != 0 {
				(r << 1) ^ POLY
			} else {
				r << 1
			};
			j += 1;
		}
		table[i] = r;
		i += 1;
	}
	table
}

/// Lazily built 256 entry CRC table, computed once per process.
///
/// A `const fn` table would avoid the `Once`, but the shift/xor loop above
/// isn't (yet) usable in a const context together with array indexing in
/// the edition this crate targets, so we build it lazily instead.
fn table() -> &'static [u32; 256] {
	use std::sync::OnceLock;
	static TABLE :OnceLock<[u32; 256]> = OnceLock::new();
	TABLE.get_or_init(build_table)
}

/// Computes the Ogg CRC-32 of `data`, starting from `crc`.
///
/// Callers wanting the checksum of an entire page pass `0` as the initial
/// value and feed the header (with the 4 CRC bytes zeroed) followed by the
/// body.
pub fn update(crc :u32, data :&[u8]) -> u32 {
	let table = table();
	let mut crc = crc;
	for &b in data {
		let idx = (((crc >> 24) ^ (b as u32)) & 0xff) as usize;
		crc = (crc << 8) ^ table[idx];
	}
	crc
}

/// Computes the Ogg CRC-32 of a single buffer.
pub fn compute(data :&[u8]) -> u32 {
	update(0, data)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_crc_empty() {
		assert_eq!(compute(&[]), 0);
	}

	#[test]
	fn test_crc_deterministic() {
		let data = b"OggS test payload for crc determinism";
		assert_eq!(compute(data), compute(data));
	}

	#[test]
	fn test_crc_incremental_equals_oneshot() {
		let data = b"split across two update() calls please";
		let (a, b) = data.split_at(13);
		let incremental = update(update(0, a), b);
		assert_eq!(incremental, compute(data));
	}

	#[test]
	fn test_crc_sensitive_to_single_bit_flip() {
		let mut data = b"flip a single bit in here somewhere".to_vec();
		let base = compute(&data);
		data[5] ^= 0x01;
		assert_ne!(base, compute(&data));
	}
}
