/*!
Ogg bitstream framing layer (RFC 3533).

This module is CORE to this crate (unlike the teacher crate, which treats
Ogg framing as an external dependency): it owns CRC validation, page
parsing and resynchronization, and per-logical-stream packet reassembly.
See `SPEC_FULL.md` §1 and §4.1-§4.4.
*/

pub mod crc;
pub mod bufreader;
pub mod page;
pub mod packet;

pub use self::bufreader::{BufReaderError, HolderId, SynchronizationLockError};
pub use self::page::{Page, PageReadError, PageReader};
pub use self::packet::{Packet, PacketReadError, PacketReader};

/// High-level error taxonomy row for Ogg-layer problems, corresponding to
/// SPEC §7's `InvalidData`/`CrcMismatch`/`UnexpectedEof`/`OutOfRange`/
/// `SynchronizationLock`/`Disposed` rows.
#[derive(Debug)]
pub enum OggReadError {
	InvalidData,
	CrcMismatch,
	UnexpectedEof,
	OutOfRange,
	SynchronizationLock,
	Disposed,
}

impl std::fmt::Display for OggReadError {
	fn fmt(&self, f :&mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			OggReadError::InvalidData => write!(f, "invalid Ogg bitstream data"),
			OggReadError::CrcMismatch => write!(f, "Ogg page CRC mismatch"),
			OggReadError::UnexpectedEof => write!(f, "unexpected end of Ogg bitstream"),
			OggReadError::OutOfRange => write!(f, "requested position is out of range"),
			OggReadError::SynchronizationLock => write!(f, "cooperative lock violation"),
			OggReadError::Disposed => write!(f, "Ogg reader used after dispose"),
		}
	}
}

impl std::error::Error for OggReadError {}

impl From<PacketReadError> for OggReadError {
	fn from(e :PacketReadError) -> Self {
		match e {
			PacketReadError::Page(PageReadError::CrcMismatch) => OggReadError::CrcMismatch,
			PacketReadError::Page(PageReadError::SyncNotFound) => OggReadError::UnexpectedEof,
			PacketReadError::Page(PageReadError::InvalidVersion) => OggReadError::InvalidData,
			PacketReadError::Page(PageReadError::Io(BufReaderError::Disposed)) => OggReadError::Disposed,
			PacketReadError::Page(PageReadError::Io(_)) => OggReadError::UnexpectedEof,
			PacketReadError::Lock(_) => OggReadError::SynchronizationLock,
			PacketReadError::NotSeekable | PacketReadError::OutOfRange => OggReadError::OutOfRange,
		}
	}
}
