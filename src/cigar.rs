//! CIGAR model: operation codes, a packed run-length container and the
//! alignment-anchor walk.

use std::fmt::{self, Display, Formatter};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// A single CIGAR operation. The discriminants match the 4-bit wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AlnMatch = 0,
    Insertion = 1,
    Deletion = 2,
    Skip = 3,
    Soft = 4,
    Hard = 5,
    Padding = 6,
    SeqMatch = 7,
    SeqMismatch = 8,
    Back = 9,
}

impl Operation {
    /// Returns the operation for a 4-bit wire code, `None` for codes above 9.
    pub fn from_code(code: u32) -> Option<Operation> {
        use Operation::*;
        match code {
            0 => Some(AlnMatch),
            1 => Some(Insertion),
            2 => Some(Deletion),
            3 => Some(Skip),
            4 => Some(Soft),
            5 => Some(Hard),
            6 => Some(Padding),
            7 => Some(SeqMatch),
            8 => Some(SeqMismatch),
            9 => Some(Back),
            _ => None,
        }
    }

    /// Returns the operation for a text symbol, such as `M`.
    pub fn from_char(symbol: u8) -> Option<Operation> {
        use Operation::*;
        match symbol {
            b'M' => Some(AlnMatch),
            b'I' => Some(Insertion),
            b'D' => Some(Deletion),
            b'N' => Some(Skip),
            b'S' => Some(Soft),
            b'H' => Some(Hard),
            b'P' => Some(Padding),
            b'=' => Some(SeqMatch),
            b'X' => Some(SeqMismatch),
            b'B' => Some(Back),
            _ => None,
        }
    }

    pub fn to_char(self) -> u8 {
        b"MIDNSHP=XB"[self as usize]
    }

    /// Returns `true` if the operation advances reference positions
    /// (`M`, `D`, `N`, `=`, `X`).
    pub fn consumes_reference(self) -> bool {
        use Operation::*;
        match self {
            AlnMatch | Deletion | Skip | SeqMatch | SeqMismatch => true,
            _ => false,
        }
    }

    /// Returns `true` if the operation advances query positions
    /// (`M`, `I`, `S`, `=`, `X`).
    pub fn consumes_query(self) -> bool {
        use Operation::*;
        match self {
            AlnMatch | Insertion | Soft | SeqMatch | SeqMismatch => true,
            _ => false,
        }
    }
}

/// Run-length encoded alignment description, stored as packed `u32` values:
/// the operation code in the low 4 bits, the run length in the high 28.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cigar(Vec<u32>);

impl Cigar {
    pub fn new() -> Self {
        Cigar(Vec::new())
    }

    /// Builds a Cigar from raw little-endian `u32` bytes. The slice length
    /// must be a multiple of four.
    pub fn from_raw_bytes(raw: &[u8]) -> Result<Cigar> {
        let mut values = Vec::with_capacity(raw.len() / 4);
        for chunk in raw.chunks(4) {
            let value = LittleEndian::read_u32(chunk);
            if Operation::from_code(value & 0xf).is_none() {
                return Err(Error::Corrupted(format!(
                    "Unexpected CIGAR operation code: {}",
                    value & 0xf
                )));
            }
            values.push(value);
        }
        Ok(Cigar(values))
    }

    /// Parses a text representation, such as `10M1D4S`. Both `*` and the
    /// empty string produce an empty Cigar.
    pub fn from_text(text: &[u8]) -> Result<Cigar> {
        if text == b"*" {
            return Ok(Cigar::new());
        }
        let mut values = Vec::new();
        let mut len: u32 = 0;
        let mut has_digits = false;
        for &symbol in text {
            if symbol.is_ascii_digit() {
                len = len
                    .checked_mul(10)
                    .and_then(|l| l.checked_add((symbol - b'0') as u32))
                    .ok_or_else(|| Error::Corrupted("CIGAR length overflows".to_string()))?;
                has_digits = true;
            } else {
                let op = Operation::from_char(symbol).ok_or_else(|| {
                    Error::Corrupted(format!("Unexpected CIGAR operation: {}", symbol as char))
                })?;
                if !has_digits {
                    return Err(Error::Corrupted(
                        "CIGAR operation without a length".to_string(),
                    ));
                }
                values.push(len << 4 | op as u32);
                len = 0;
                has_digits = false;
            }
        }
        if has_digits {
            return Err(Error::Corrupted("CIGAR ends with digits".to_string()));
        }
        Ok(Cigar(values))
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a pair `(length, operation)` at the `index`.
    pub fn at(&self, index: usize) -> (u32, Operation) {
        let value = self.0[index];
        let op = Operation::from_code(value & 0xf)
            .unwrap_or_else(|| panic!("Unexpected CIGAR operation code: {}", value & 0xf));
        (value >> 4, op)
    }

    /// Iterates over `(length, operation)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Operation)> + '_ {
        (0..self.0.len()).map(move |i| self.at(i))
    }

    /// Returns raw packed values.
    pub fn raw(&self) -> &[u32] {
        &self.0
    }

    /// Splits into parallel operation and length vectors.
    pub fn to_rle(&self) -> (Vec<Operation>, Vec<u32>) {
        let mut ops = Vec::with_capacity(self.len());
        let mut lens = Vec::with_capacity(self.len());
        for (len, op) in self.iter() {
            ops.push(op);
            lens.push(len);
        }
        (ops, lens)
    }

    /// Sum of lengths of reference-consuming operations, O(n).
    pub fn ref_len(&self) -> i64 {
        self.iter()
            .filter(|(_, op)| op.consumes_reference())
            .map(|(len, _)| len as i64)
            .sum()
    }

    /// Sum of lengths of query-consuming operations, O(n).
    pub fn query_len(&self) -> i64 {
        self.iter()
            .filter(|(_, op)| op.consumes_query())
            .map(|(len, _)| len as i64)
            .sum()
    }

    /// Walks the operations, producing an anchor per operation after the
    /// leading start anchor at `(0, ref_start, 0)`. Query-consuming
    /// operations advance `seq_pos`, reference-consuming operations advance
    /// `ref_pos`, every operation advances `aln_pos`. Operations consuming
    /// neither (`H`, `P`, `B`) fail with `UnsupportedCigarOp`.
    pub fn anchors(&self, ref_start: i64) -> Result<Vec<Anchor>> {
        let mut anchors = Vec::with_capacity(self.len() + 1);
        let mut seq_pos = 0;
        let mut ref_pos = ref_start;
        let mut aln_pos = 0;
        anchors.push(Anchor {
            seq_pos,
            ref_pos,
            aln_pos,
            op: AnchorOp::Start,
        });
        for (len, op) in self.iter() {
            let in_query = op.consumes_query();
            let in_ref = op.consumes_reference();
            let op = match (in_query, in_ref) {
                (true, true) => AnchorOp::Match,
                (true, false) => AnchorOp::Insert,
                (false, true) => AnchorOp::Delete,
                (false, false) => return Err(Error::UnsupportedCigarOp(op.to_char() as char)),
            };
            if in_query {
                seq_pos += len as i64;
            }
            if in_ref {
                ref_pos += len as i64;
            }
            aln_pos += len as i64;
            anchors.push(Anchor {
                seq_pos,
                ref_pos,
                aln_pos,
                op,
            });
        }
        Ok(anchors)
    }

    /// Clears the contents but does not touch capacity.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl Display for Cigar {
    /// Writes in human readable format, such as `10M1D4S`. An empty Cigar
    /// produces an empty string.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (len, op) in self.iter() {
            write!(f, "{}{}", len, op.to_char() as char)?;
        }
        Ok(())
    }
}

/// A single step of the alignment walk: positions in the query, the
/// reference and the alignment itself after applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub seq_pos: i64,
    pub ref_pos: i64,
    pub aln_pos: i64,
    pub op: AnchorOp,
}

/// Kind of the step an anchor closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOp {
    Start,
    Match,
    Insert,
    Delete,
}
