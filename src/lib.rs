//! *alnrec* is a read-level record model for the two companion sequence
//! alignment encodings, written completely in Rust: the packed binary BAM
//! record ([bam::Record](bam/struct.Record.html)) and the tab-separated
//! text SAM record ([sam::Record](sam/struct.Record.html)).
//!
//! The crate covers the record layer only. An external reader is expected
//! to hand a BAM record one contiguous serialized block (everything from
//! the block size through the trailing auxiliary tags), or a SAM record
//! one line without its newline; container I/O, decompression and
//! file-level headers stay with that reader.
//!
//! Both record types own their raw bytes and decode individual fields on
//! demand. A BAM record re-derives payload offsets from its fixed header
//! fields on each call; a SAM record keeps a sidecar of byte ranges, one
//! per field, produced by a tab indexer. Either way the same logical
//! surface comes out: template name, flag, reference id and position
//! (1-based, 0 for unmapped), mapping quality (255 for missing), CIGAR,
//! mate id and position, template length, 4-bit packed sequence, per-base
//! qualities and an ordered, typed auxiliary tag dictionary.
//!
//! ## Usage
//!
//! Records can be parsed in one shot:
//!
//! ```
//! use alnrec::sam::Record;
//!
//! let line = "r001\t99\tref\t7\t30\t17M\t=\t37\t39\tTTAGATAAAGGATACTG\t*\tNM:i:1";
//! let record: Record = line.parse().unwrap();
//! assert_eq!(record.flag().unwrap(), 99);
//! assert_eq!(record.position().unwrap(), 7);
//! assert_eq!(record.align_length().unwrap(), 17);
//! ```
//!
//! or refilled in place inside a read loop, which reuses the inner
//! buffers:
//!
//! ```
//! use alnrec::sam::Record;
//!
//! let mut record = Record::new();
//! for line in &["r1\t4\t*\t0\t255\t*\t*\t0\t0\t*\t*", "r2\t4\t*\t0\t255\t*\t*\t0\t0\t*\t*"] {
//!     record.fill_from_str(line).unwrap();
//!     assert!(!record.is_mapped().unwrap());
//! }
//! ```
//!
//! Reference names are resolved through a non-owning link to the reader's
//! [Header](header/struct.Header.html):
//!
//! ```
//! use std::sync::Arc;
//! use alnrec::Header;
//!
//! let mut header = Header::new();
//! header.push_reference("chr1", 248_956_422);
//! let header = Arc::new(header);
//! // record.assign_header(&header) makes record.ref_name() resolve
//! // through this dictionary without taking ownership of it.
//! ```

/// A module with typed auxiliary tag fields and their decoders.
pub mod aux;
/// A module with binary alignment records.
pub mod bam;
/// A module that supports CIGAR and operations on it.
pub mod cigar;
/// A module with the crate error type.
pub mod error;
/// A module with record FLAG bits.
pub mod flags;
/// A module with the reference dictionary.
pub mod header;
/// A module with text alignment records.
pub mod sam;
/// A module with 4-bit packed sequences.
pub mod sequence;

pub use aux::{AuxValue, IntegerType, TagName};
pub use cigar::{Anchor, AnchorOp, Cigar, Operation};
pub use error::{Error, Result};
pub use header::Header;
pub use sequence::Sequence;
