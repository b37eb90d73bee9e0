//! Tab-separated text alignment records.

use std::fmt::{self, Display, Formatter};
use std::io::Write;
use std::ops::Range;
use std::str::{self, FromStr};

use crate::aux::{self, AuxValue, TagName};
use crate::cigar::{Anchor, Cigar, Operation};
use crate::error::{Error, Result};
use crate::flags;
use crate::sequence::Sequence;

/// Number of mandatory tab-separated fields in a record line.
const MANDATORY_FIELDS: usize = 11;

/// Text alignment record.
///
/// The record owns the raw line bytes and a sidecar of byte ranges: one
/// per mandatory field, plus the ordered list of auxiliary fields. The
/// indexer only locates tab boundaries; field content is decoded lazily
/// by the accessors, with the per-field missing policy (`*` for most
/// fields, `0` for positions and template length, `255` for mapping
/// quality):
///
/// ```
/// use alnrec::sam::Record;
///
/// let record: Record = "r001\t99\tref\t7\t30\t8M2I4M1D3M\t=\t37\t39\t\
///                       TTAGATAAAGGATACTG\t*\tNM:i:1".parse().unwrap();
/// assert_eq!(record.flag().unwrap(), 99);
/// assert_eq!(record.position().unwrap(), 7);
/// assert_eq!(record.cigar().unwrap().to_string(), "8M2I4M1D3M");
/// ```
#[derive(Debug, Clone)]
pub struct Record {
    buf: Vec<u8>,
    filled: Range<usize>,
    qname: Range<usize>,
    flag: Range<usize>,
    rname: Range<usize>,
    pos: Range<usize>,
    mapq: Range<usize>,
    cigar: Range<usize>,
    rnext: Range<usize>,
    pnext: Range<usize>,
    tlen: Range<usize>,
    seq: Range<usize>,
    qual: Range<usize>,
    fields: Vec<Range<usize>>,
}

fn parse_num<T: FromStr>(bytes: &[u8], what: &'static str) -> Result<T> {
    let s = str::from_utf8(bytes)
        .map_err(|_| Error::Corrupted(format!("{} is not UTF-8", what)))?;
    s.parse()
        .map_err(|_| Error::Corrupted(format!("Cannot convert {} '{}' to a number", what, s)))
}

impl Record {
    /// Creates an empty record, to be filled later.
    pub fn new() -> Record {
        Record {
            buf: Vec::new(),
            filled: 0..0,
            qname: 0..0,
            flag: 0..0,
            rname: 0..0,
            pos: 0..0,
            mapq: 0..0,
            cigar: 0..0,
            rnext: 0..0,
            pnext: 0..0,
            tlen: 0..0,
            seq: 0..0,
            qual: 0..0,
            fields: Vec::new(),
        }
    }

    /// Parses one record line, without its newline.
    pub fn from_bytes(line: &[u8]) -> Result<Record> {
        let mut record = Record::new();
        record.fill_from_bytes(line)?;
        Ok(record)
    }

    /// Fills the record from one line, re-indexing the field boundaries.
    /// Fails with `MalformedLine` if the line has fewer than 11 mandatory
    /// fields; on failure the record keeps its previous contents.
    pub fn fill_from_bytes(&mut self, line: &[u8]) -> Result<()> {
        let mut bounds = Vec::with_capacity(MANDATORY_FIELDS);
        let mut start = 0;
        for (i, &symbol) in line.iter().enumerate() {
            if symbol == b'\t' {
                bounds.push(start..i);
                start = i + 1;
            }
        }
        bounds.push(start..line.len());
        if bounds.len() < MANDATORY_FIELDS {
            return Err(Error::MalformedLine);
        }

        self.buf.clear();
        self.buf.extend_from_slice(line);
        self.filled = 0..line.len();
        let mut bounds = bounds.into_iter();
        self.qname = bounds.next().unwrap();
        self.flag = bounds.next().unwrap();
        self.rname = bounds.next().unwrap();
        self.pos = bounds.next().unwrap();
        self.mapq = bounds.next().unwrap();
        self.cigar = bounds.next().unwrap();
        self.rnext = bounds.next().unwrap();
        self.pnext = bounds.next().unwrap();
        self.tlen = bounds.next().unwrap();
        self.seq = bounds.next().unwrap();
        self.qual = bounds.next().unwrap();
        self.fields.clear();
        self.fields.extend(bounds);
        Ok(())
    }

    /// Fills the record from one line of text.
    pub fn fill_from_str(&mut self, line: &str) -> Result<()> {
        self.fill_from_bytes(line.as_bytes())
    }

    /// Returns `true` if the record has been filled from a line.
    pub fn is_filled(&self) -> bool {
        self.filled.end > 0
    }

    fn require_filled(&self) -> Result<()> {
        if self.is_filled() {
            Ok(())
        } else {
            Err(Error::NotFilled)
        }
    }

    /// Clears the record but keeps buffer capacity.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.filled = 0..0;
        self.qname = 0..0;
        self.flag = 0..0;
        self.rname = 0..0;
        self.pos = 0..0;
        self.mapq = 0..0;
        self.cigar = 0..0;
        self.rnext = 0..0;
        self.pnext = 0..0;
        self.tlen = 0..0;
        self.seq = 0..0;
        self.qual = 0..0;
        self.fields.clear();
    }

    fn field(&self, range: &Range<usize>) -> &[u8] {
        &self.buf[range.clone()]
    }

    fn field_string(&self, range: &Range<usize>, what: &'static str) -> Result<String> {
        str::from_utf8(self.field(range))
            .map(str::to_string)
            .map_err(|_| Error::Corrupted(format!("{} is not UTF-8", what)))
    }

    pub fn flag(&self) -> Result<u16> {
        self.require_filled()?;
        parse_num(self.field(&self.flag), "FLAG")
    }

    pub fn is_mapped(&self) -> Result<bool> {
        // EQUAL 0
        Ok(self.flag()? & flags::READ_UNMAPPED == 0)
    }

    pub fn is_positive_strand(&self) -> Result<bool> {
        Ok(self.flag()? & flags::READ_REVERSE_STRAND == 0)
    }

    /// Neither secondary nor supplementary.
    pub fn is_primary(&self) -> Result<bool> {
        Ok(self.flag()? & (flags::SECONDARY | flags::SUPPLEMENTARY) == 0)
    }

    /// Returns the record name. Fails with `Missing` for a `*` name.
    pub fn template_name(&self) -> Result<String> {
        if !self.has_template_name()? {
            return Err(Error::Missing("template name"));
        }
        self.field_string(&self.qname, "QNAME")
    }

    pub fn has_template_name(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.qname) != b"*")
    }

    /// Returns the reference name. Fails with `Missing` for a `*` name.
    pub fn ref_name(&self) -> Result<String> {
        if !self.has_ref_name()? {
            return Err(Error::Missing("reference name"));
        }
        self.field_string(&self.rname, "RNAME")
    }

    pub fn has_ref_name(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.rname) != b"*")
    }

    /// Returns the mate reference name verbatim; `=` stands for the
    /// record's own reference. Fails with `Missing` for a `*` name.
    pub fn next_ref_name(&self) -> Result<String> {
        if !self.has_next_ref_name()? {
            return Err(Error::Missing("mate reference name"));
        }
        self.field_string(&self.rnext, "RNEXT")
    }

    pub fn has_next_ref_name(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.rnext) != b"*")
    }

    /// Returns the 1-based leftmost position; 0 stands for an unmapped
    /// record.
    pub fn position(&self) -> Result<i64> {
        self.require_filled()?;
        parse_num(self.field(&self.pos), "POS")
    }

    /// Present when the field does not start with `0`. Only the leading
    /// byte is inspected; content validation stays with
    /// [position](#method.position).
    pub fn has_position(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.pos).first().map_or(false, |&b| b != b'0'))
    }

    /// Returns the 1-based rightmost position over the CIGAR.
    pub fn right_position(&self) -> Result<i64> {
        Ok(self.position()? + self.align_length()? - 1)
    }

    /// Returns the 1-based leftmost position of the mate; 0 stands for an
    /// unmapped mate.
    pub fn next_position(&self) -> Result<i64> {
        self.require_filled()?;
        parse_num(self.field(&self.pnext), "PNEXT")
    }

    pub fn has_next_position(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.pnext).first().map_or(false, |&b| b != b'0'))
    }

    /// Returns the mapping quality. Fails with `Missing` when the stored
    /// value is 255.
    pub fn mapping_quality(&self) -> Result<u8> {
        self.require_filled()?;
        let mapq: u8 = parse_num(self.field(&self.mapq), "MAPQ")?;
        if mapq == 255 {
            return Err(Error::Missing("mapping quality"));
        }
        Ok(mapq)
    }

    pub fn has_mapping_quality(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.mapq) != b"255")
    }

    pub fn template_length(&self) -> Result<i32> {
        self.require_filled()?;
        parse_num(self.field(&self.tlen), "TLEN")
    }

    pub fn has_template_length(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.tlen) != b"0")
    }

    /// Parses the CIGAR field. A `*` field produces an empty Cigar, not an
    /// error. Render with `to_string()`.
    pub fn cigar(&self) -> Result<Cigar> {
        self.require_filled()?;
        Cigar::from_text(self.field(&self.cigar))
    }

    pub fn has_cigar(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.cigar) != b"*")
    }

    /// Sum of reference-consuming operation lengths, walking the CIGAR
    /// field byte by byte. A `*` field sums to 0.
    pub fn align_length(&self) -> Result<i64> {
        self.require_filled()?;
        let raw = self.field(&self.cigar);
        if raw == b"*" {
            return Ok(0);
        }
        let mut total: i64 = 0;
        let mut len: i64 = 0;
        for &symbol in raw {
            if symbol.is_ascii_digit() {
                len = len * 10 + (symbol - b'0') as i64;
            } else {
                let op = Operation::from_char(symbol).ok_or_else(|| {
                    Error::Corrupted(format!("Unexpected CIGAR operation: {}", symbol as char))
                })?;
                if op.consumes_reference() {
                    total += len;
                }
                len = 0;
            }
        }
        if len != 0 {
            return Err(Error::Corrupted("CIGAR ends with digits".to_string()));
        }
        Ok(total)
    }

    /// Walks the CIGAR into alignment anchors starting at the 0-based
    /// leftmost position. Returns no anchors for an unmapped record.
    pub fn alignment(&self) -> Result<Vec<Anchor>> {
        if !self.is_mapped()? {
            return Ok(Vec::new());
        }
        self.cigar()?.anchors(self.position()? - 1)
    }

    /// Number of sequence bases; 0 for a `*` field.
    pub fn seq_length(&self) -> Result<i64> {
        self.require_filled()?;
        if self.field(&self.seq) == b"*" {
            return Ok(0);
        }
        Ok(self.seq.len() as i64)
    }

    pub fn has_sequence(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.seq) != b"*")
    }

    /// Packs the sequence field into a 4-bit container. Returns `None`
    /// for a `*` field.
    pub fn sequence(&self) -> Result<Option<Sequence>> {
        self.require_filled()?;
        let raw = self.field(&self.seq);
        if raw == b"*" {
            return Ok(None);
        }
        let mut seq = Sequence::new();
        seq.fill_from_text(raw.iter().copied())?;
        Ok(Some(seq))
    }

    /// Returns the sequence field as a string. Returns `None` for a `*`
    /// field.
    pub fn sequence_str(&self) -> Result<Option<String>> {
        self.require_filled()?;
        if self.field(&self.seq) == b"*" {
            return Ok(None);
        }
        self.field_string(&self.seq, "SEQ").map(Some)
    }

    /// Decodes the qualities into a fresh buffer with 33 subtracted from
    /// every byte (Phred+33). Returns `None` for a `*` field.
    pub fn quality(&self) -> Result<Option<Vec<u8>>> {
        self.require_filled()?;
        let raw = self.field(&self.qual);
        if raw == b"*" {
            return Ok(None);
        }
        raw.iter()
            .map(|&q| {
                q.checked_sub(33)
                    .ok_or_else(|| Error::Corrupted(format!("Unexpected quality symbol: {}", q as char)))
            })
            .collect::<Result<Vec<u8>>>()
            .map(Some)
    }

    /// Returns the quality field as stored, without the +33 offset
    /// removed. Returns `None` for a `*` field.
    pub fn quality_str(&self) -> Result<Option<String>> {
        self.require_filled()?;
        if self.field(&self.qual) == b"*" {
            return Ok(None);
        }
        self.field_string(&self.qual, "QUAL").map(Some)
    }

    pub fn has_quality(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.field(&self.qual) != b"*")
    }

    fn parse_field(&self, range: &Range<usize>) -> Result<(TagName, AuxValue)> {
        let raw = self.field(range);
        // 012345...
        // nn:t:value
        if raw.len() < 5 || raw[2] != b':' || raw[4] != b':' {
            return Err(Error::Corrupted(format!(
                "Cannot parse tag '{}'",
                String::from_utf8_lossy(raw)
            )));
        }
        let name = [raw[0], raw[1]];
        let value = str::from_utf8(&raw[5..])
            .map_err(|_| Error::Corrupted("Tag value is not UTF-8".to_string()))?;
        Ok((name, aux::decode_text(raw[3], value)?))
    }

    /// Decodes every auxiliary field in insertion order.
    pub fn aux_data(&self) -> Result<Vec<(TagName, AuxValue)>> {
        self.require_filled()?;
        self.fields
            .iter()
            .map(|range| self.parse_field(range))
            .collect()
    }

    /// Returns a decoded value of the tag with `name`. Takes `O(n_tags)`.
    pub fn get(&self, name: &TagName) -> Result<AuxValue> {
        self.require_filled()?;
        for range in &self.fields {
            let raw = self.field(range);
            if raw.len() >= 2 && &raw[..2] == name {
                return self.parse_field(range).map(|(_, value)| value);
            }
        }
        Err(Error::UnknownTag(*name))
    }

    pub fn has(&self, name: &TagName) -> Result<bool> {
        self.require_filled()?;
        Ok(self.fields.iter().any(|range| {
            let raw = self.field(range);
            raw.len() >= 2 && &raw[..2] == name
        }))
    }

    /// Tag names in insertion order.
    pub fn keys(&self) -> Result<Vec<TagName>> {
        Ok(self.aux_data()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Decoded values in insertion order.
    pub fn values(&self) -> Result<Vec<AuxValue>> {
        Ok(self.aux_data()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Writes the stored line bytes verbatim, without a trailing newline.
    pub fn write_sam<W: Write>(&self, f: &mut W) -> Result<()> {
        self.require_filled()?;
        f.write_all(&self.buf[self.filled.clone()])?;
        Ok(())
    }
}

impl FromStr for Record {
    type Err = Error;

    fn from_str(line: &str) -> Result<Record> {
        Record::from_bytes(line.as_bytes())
    }
}

impl Display for Record {
    /// Writes the filled line window.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            String::from_utf8_lossy(&self.buf[self.filled.clone()])
        )
    }
}

/// Structural equality: the field ranges and the filled byte window. The
/// unused buffer tail does not take part.
impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.filled == other.filled
            && self.qname == other.qname
            && self.flag == other.flag
            && self.rname == other.rname
            && self.pos == other.pos
            && self.mapq == other.mapq
            && self.cigar == other.cigar
            && self.rnext == other.rnext
            && self.pnext == other.pnext
            && self.tlen == other.tlen
            && self.seq == other.seq
            && self.qual == other.qual
            && self.fields == other.fields
            && self.buf[self.filled.clone()] == other.buf[other.filled.clone()]
    }
}
