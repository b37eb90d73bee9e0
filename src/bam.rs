//! Packed binary alignment records.

use std::io::Write;
use std::sync::{Arc, Weak};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::aux::{self, AuxValue, TagName};
use crate::cigar::{Anchor, Cigar};
use crate::error::{Error, Result};
use crate::flags;
use crate::header::Header;
use crate::sequence::Sequence;

/// Fixed header bytes of a serialized record, including the leading
/// 4-byte block size.
const FIXED_BYTES: usize = 36;

/// Binary alignment record.
///
/// The record owns its raw bytes: the fixed header fields plus a payload
/// buffer holding the read name, the packed CIGAR, the 4-bit packed
/// sequence, the qualities and the auxiliary tags. Accessors re-derive
/// payload offsets on each call, so one record can be refilled over and
/// over in a read loop without reallocating:
///
/// ```
/// use alnrec::bam::Record;
///
/// let block = [
///     35, 0, 0, 0,             // block size
///     255, 255, 255, 255,      // reference id (-1, unmapped)
///     255, 255, 255, 255,      // position (-1)
///     3,                       // read name length, with the terminator
///     0,                       // mapping quality
///     0, 0,                    // bin
///     0, 0,                    // number of CIGAR operations
///     4, 0,                    // flag (unmapped)
///     0, 0, 0, 0,              // sequence length
///     255, 255, 255, 255,      // next reference id
///     255, 255, 255, 255,      // next position
///     0, 0, 0, 0,              // template length
///     b'r', b'1', 0,           // read name
/// ];
/// let mut record = Record::new();
/// record.fill_from_bytes(&block).unwrap();
/// assert_eq!(record.template_name().unwrap(), "r1");
/// assert!(!record.is_mapped().unwrap());
/// ```
///
/// An empty record (created by [new](#method.new), or reset by
/// [clear](#method.clear)) fails every decoding accessor with `NotFilled`.
#[derive(Debug, Clone)]
pub struct Record {
    block_size: i32,
    ref_id: i32,
    start: i32,
    name_len: u8,
    mapq: u8,
    bin: u16,
    n_cigar: u16,
    flag: u16,
    seq_len: i32,
    next_ref_id: i32,
    next_start: i32,
    template_len: i32,
    data: Vec<u8>,
    header: Option<Weak<Header>>,
}

impl Record {
    /// Creates an empty record, to be filled later.
    pub fn new() -> Record {
        Record {
            block_size: 0,
            ref_id: -1,
            start: -1,
            name_len: 0,
            mapq: 0,
            bin: 0,
            n_cigar: 0,
            flag: 0,
            seq_len: 0,
            next_ref_id: -1,
            next_start: -1,
            template_len: 0,
            data: Vec::new(),
            header: None,
        }
    }

    /// Parses one serialized record block.
    pub fn from_bytes(buf: &[u8]) -> Result<Record> {
        let mut record = Record::new();
        record.fill_from_bytes(buf)?;
        Ok(record)
    }

    /// Fills the record from one serialized block: the fixed header fields
    /// followed by `block_size - 32` payload bytes. Fails with `ShortBuffer`
    /// if `buf` is smaller than the block claims to be; on any failure the
    /// record keeps its previous contents.
    pub fn fill_from_bytes(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() < FIXED_BYTES {
            return Err(Error::ShortBuffer);
        }
        let block_size = LittleEndian::read_i32(&buf[0..4]);
        if block_size < 32 {
            return Err(Error::Corrupted(format!("Block size too small: {}", block_size)));
        }
        let payload = block_size as usize - 32;
        if buf.len() < FIXED_BYTES + payload {
            return Err(Error::ShortBuffer);
        }

        let ref_id = LittleEndian::read_i32(&buf[4..8]);
        let start = LittleEndian::read_i32(&buf[8..12]);
        let next_ref_id = LittleEndian::read_i32(&buf[24..28]);
        let next_start = LittleEndian::read_i32(&buf[28..32]);
        if ref_id < -1 || next_ref_id < -1 {
            return Err(Error::Corrupted("Reference id < -1".to_string()));
        }
        if start < -1 || next_start < -1 {
            return Err(Error::Corrupted("Position < -1".to_string()));
        }
        let name_len = buf[12];
        if name_len == 0 {
            return Err(Error::Corrupted("Name length == 0".to_string()));
        }
        let n_cigar = LittleEndian::read_u16(&buf[16..18]);
        let seq_len = LittleEndian::read_i32(&buf[20..24]);
        if seq_len < 0 {
            return Err(Error::Corrupted("Negative sequence length".to_string()));
        }
        let used = name_len as usize
            + 4 * n_cigar as usize
            + (seq_len as usize + 1) / 2
            + seq_len as usize;
        if used > payload {
            return Err(Error::Corrupted(
                "Field lengths exceed the payload".to_string(),
            ));
        }

        self.block_size = block_size;
        self.ref_id = ref_id;
        self.start = start;
        self.name_len = name_len;
        self.mapq = buf[13];
        self.bin = LittleEndian::read_u16(&buf[14..16]);
        self.n_cigar = n_cigar;
        self.flag = LittleEndian::read_u16(&buf[18..20]);
        self.seq_len = seq_len;
        self.next_ref_id = next_ref_id;
        self.next_start = next_start;
        self.template_len = LittleEndian::read_i32(&buf[32..36]);
        self.data.clear();
        self.data
            .extend_from_slice(&buf[FIXED_BYTES..FIXED_BYTES + payload]);
        Ok(())
    }

    /// Returns `true` if the record has been filled from a byte block.
    pub fn is_filled(&self) -> bool {
        self.block_size != 0
    }

    fn require_filled(&self) -> Result<()> {
        if self.is_filled() {
            Ok(())
        } else {
            Err(Error::NotFilled)
        }
    }

    /// Clears the record but keeps payload capacity and the header link.
    pub fn clear(&mut self) {
        self.block_size = 0;
        self.ref_id = -1;
        self.start = -1;
        self.name_len = 0;
        self.mapq = 0;
        self.bin = 0;
        self.n_cigar = 0;
        self.flag = 0;
        self.seq_len = 0;
        self.next_ref_id = -1;
        self.next_start = -1;
        self.template_len = 0;
        self.data.clear();
    }

    /// Attaches the header used for reference name resolution. The link is
    /// non-owning: once the last `Arc` elsewhere is dropped, resolution
    /// fails with `NoReader` again.
    pub fn assign_header(&mut self, header: &Arc<Header>) {
        self.header = Some(Arc::downgrade(header));
    }

    fn resolve_header(&self) -> Result<Arc<Header>> {
        match &self.header {
            Some(weak) => weak.upgrade().ok_or(Error::NoReader),
            None => Err(Error::NoReader),
        }
    }

    pub fn flag(&self) -> Result<u16> {
        self.require_filled()?;
        Ok(self.flag)
    }

    pub fn is_paired(&self) -> Result<bool> {
        Ok(self.flag()? & flags::READ_PAIRED != 0)
    }

    pub fn all_segments_aligned(&self) -> Result<bool> {
        Ok(self.flag()? & flags::ALL_SEGMENTS_ALIGNED != 0)
    }

    pub fn is_mapped(&self) -> Result<bool> {
        // EQUAL 0
        Ok(self.flag()? & flags::READ_UNMAPPED == 0)
    }

    pub fn mate_is_mapped(&self) -> Result<bool> {
        // EQUAL 0
        Ok(self.flag()? & flags::MATE_UNMAPPED == 0)
    }

    pub fn is_reverse_strand(&self) -> Result<bool> {
        Ok(self.flag()? & flags::READ_REVERSE_STRAND != 0)
    }

    pub fn is_positive_strand(&self) -> Result<bool> {
        Ok(self.flag()? & flags::READ_REVERSE_STRAND == 0)
    }

    pub fn mate_is_reverse_strand(&self) -> Result<bool> {
        Ok(self.flag()? & flags::MATE_REVERSE_STRAND != 0)
    }

    pub fn first_in_pair(&self) -> Result<bool> {
        Ok(self.flag()? & flags::FIRST_IN_PAIR != 0)
    }

    pub fn last_in_pair(&self) -> Result<bool> {
        Ok(self.flag()? & flags::LAST_IN_PAIR != 0)
    }

    pub fn is_secondary(&self) -> Result<bool> {
        Ok(self.flag()? & flags::SECONDARY != 0)
    }

    pub fn fails_quality_controls(&self) -> Result<bool> {
        Ok(self.flag()? & flags::READ_FAILS_QC != 0)
    }

    pub fn is_duplicate(&self) -> Result<bool> {
        Ok(self.flag()? & flags::PCR_OR_OPTICAL_DUPLICATE != 0)
    }

    pub fn is_supplementary(&self) -> Result<bool> {
        Ok(self.flag()? & flags::SUPPLEMENTARY != 0)
    }

    /// Neither secondary nor supplementary.
    pub fn is_primary(&self) -> Result<bool> {
        Ok(self.flag()? & (flags::SECONDARY | flags::SUPPLEMENTARY) == 0)
    }

    /// Returns the 1-based reference id; 0 stands for an unmapped record.
    pub fn ref_id(&self) -> Result<i64> {
        self.require_filled()?;
        Ok(self.ref_id as i64 + 1)
    }

    pub fn has_ref_id(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.ref_id != -1)
    }

    /// Resolves the reference name through the attached header. Fails with
    /// `Unmapped` for an unmapped record and with `NoReader` if no header
    /// is attached.
    pub fn ref_name(&self) -> Result<String> {
        if !self.has_ref_id()? {
            return Err(Error::Unmapped);
        }
        let header = self.resolve_header()?;
        header
            .reference_name(self.ref_id as usize)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Corrupted(format!("Reference id {} is not in the header", self.ref_id))
            })
    }

    /// Resolves the reference length through the attached header. Same
    /// preconditions as [ref_name](#method.ref_name).
    pub fn ref_len(&self) -> Result<i64> {
        if !self.has_ref_id()? {
            return Err(Error::Unmapped);
        }
        let header = self.resolve_header()?;
        header.reference_len(self.ref_id as usize).ok_or_else(|| {
            Error::Corrupted(format!("Reference id {} is not in the header", self.ref_id))
        })
    }

    /// Returns the 1-based leftmost position; 0 stands for an unmapped
    /// record.
    pub fn position(&self) -> Result<i64> {
        self.require_filled()?;
        Ok(self.start as i64 + 1)
    }

    pub fn has_position(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.start != -1)
    }

    /// Returns the 1-based rightmost position over the stored CIGAR.
    pub fn right_position(&self) -> Result<i64> {
        Ok(self.position()? + self.align_length()? - 1)
    }

    /// Returns the 1-based reference id of the mate; 0 stands for an
    /// unmapped mate.
    pub fn next_ref_id(&self) -> Result<i64> {
        self.require_filled()?;
        Ok(self.next_ref_id as i64 + 1)
    }

    /// Resolves the mate reference name through the attached header.
    pub fn next_ref_name(&self) -> Result<String> {
        self.require_filled()?;
        if self.next_ref_id == -1 {
            return Err(Error::Unmapped);
        }
        let header = self.resolve_header()?;
        header
            .reference_name(self.next_ref_id as usize)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Corrupted(format!(
                    "Reference id {} is not in the header",
                    self.next_ref_id
                ))
            })
    }

    /// Returns the 1-based leftmost position of the mate; 0 stands for an
    /// unmapped mate.
    pub fn next_position(&self) -> Result<i64> {
        self.require_filled()?;
        Ok(self.next_start as i64 + 1)
    }

    pub fn has_next_position(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.next_start != -1)
    }

    pub fn mapping_quality(&self) -> Result<u8> {
        self.require_filled()?;
        Ok(self.mapq)
    }

    pub fn has_mapping_quality(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.mapq != 0xff)
    }

    pub fn template_length(&self) -> Result<i32> {
        self.require_filled()?;
        Ok(self.template_len)
    }

    /// Returns the read name with the NUL terminator removed.
    pub fn template_name(&self) -> Result<String> {
        self.require_filled()?;
        let len = (self.name_len as usize).saturating_sub(1);
        String::from_utf8(self.data[..len].to_vec())
            .map_err(|_| Error::Corrupted("Read name is not UTF-8".to_string()))
    }

    pub fn has_template_name(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.name_len > 1)
    }

    fn seq_offset(&self) -> usize {
        self.name_len as usize + 4 * self.n_cigar as usize
    }

    fn qual_offset(&self) -> usize {
        self.seq_offset() + (self.seq_len as usize + 1) / 2
    }

    fn aux_offset(&self) -> usize {
        self.qual_offset() + self.seq_len as usize
    }

    /// Locates the CIGAR inside the payload: byte offset and operation
    /// count. With `check_cg` set, a two-operation CIGAR whose first
    /// operation is a whole-sequence soft clip is resolved through the
    /// `CG:B,I` tag holding the true operation array.
    fn cigar_loc(&self, check_cg: bool) -> Result<(usize, usize)> {
        let stored = (self.name_len as usize, self.n_cigar as usize);
        if !check_cg || self.n_cigar != 2 {
            return Ok(stored);
        }
        let first = LittleEndian::read_u32(&self.data[stored.0..stored.0 + 4]);
        if first != (self.seq_len as u32) << 4 | 4 {
            return Ok(stored);
        }
        let aux_offset = self.aux_offset();
        let raw = &self.data[aux_offset..];
        let field = match aux::find(raw, b"CG")? {
            Some(offset) => offset,
            None => return Ok(stored),
        };
        if raw[field + 2] != b'B' || raw[field + 3] != b'I' {
            return Ok(stored);
        }
        let n_ops = LittleEndian::read_i32(&raw[field + 4..field + 8]) as usize;
        Ok((aux_offset + field + 8, n_ops))
    }

    /// Number of CIGAR operations, resolving the `CG` escape when
    /// `check_cg` is set.
    pub fn n_cigar_ops(&self, check_cg: bool) -> Result<usize> {
        self.require_filled()?;
        Ok(self.cigar_loc(check_cg)?.1)
    }

    /// Decodes the CIGAR operation array, resolving the `CG` escape when
    /// `check_cg` is set. Render with `to_string()`, or split with
    /// [to_rle](../cigar/struct.Cigar.html#method.to_rle).
    pub fn cigar(&self, check_cg: bool) -> Result<Cigar> {
        self.require_filled()?;
        let (offset, n_ops) = self.cigar_loc(check_cg)?;
        Cigar::from_raw_bytes(&self.data[offset..offset + 4 * n_ops])
    }

    /// Sum of reference-consuming operation lengths over the *stored*
    /// CIGAR. The `CG` escape is not resolved here: for an escaped record
    /// the stored pseudo-operations are summed as they are.
    pub fn align_length(&self) -> Result<i64> {
        Ok(self.cigar(false)?.ref_len())
    }

    /// Walks the CIGAR (with the `CG` escape resolved) into alignment
    /// anchors starting at the 0-based leftmost position. Returns no
    /// anchors for an unmapped record.
    pub fn alignment(&self) -> Result<Vec<Anchor>> {
        if !self.is_mapped()? {
            return Ok(Vec::new());
        }
        self.cigar(true)?.anchors(self.position()? - 1)
    }

    /// Number of sequence bases.
    pub fn seq_length(&self) -> Result<i64> {
        self.require_filled()?;
        Ok(self.seq_len as i64)
    }

    pub fn has_sequence(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.seq_len > 0)
    }

    /// Decodes the packed sequence. Returns `None` when the record has no
    /// sequence.
    pub fn sequence(&self) -> Result<Option<Sequence>> {
        self.require_filled()?;
        if self.seq_len == 0 {
            return Ok(None);
        }
        let offset = self.seq_offset();
        let packed_len = (self.seq_len as usize + 1) / 2;
        let mut seq = Sequence::new();
        seq.fill_from_wire(&self.data[offset..offset + packed_len], self.seq_len as usize);
        Ok(Some(seq))
    }

    /// Returns raw qualities, one byte per base, without +33 added. When
    /// qualities are absent, the bytes are a 0xff fill of sequence length.
    pub fn quality(&self) -> Result<Vec<u8>> {
        self.require_filled()?;
        let offset = self.qual_offset();
        Ok(self.data[offset..offset + self.seq_len as usize].to_vec())
    }

    /// Returns `true` if qualities are present: the first byte of a 0xff
    /// fill is enough to check, O(1).
    pub fn has_quality(&self) -> Result<bool> {
        self.require_filled()?;
        Ok(self.seq_len > 0 && self.data[self.qual_offset()] != 0xff)
    }

    /// Returns a view over the auxiliary tag region, queryable by tag.
    pub fn tags(&self) -> Result<Tags> {
        self.require_filled()?;
        Ok(Tags {
            raw: &self.data[self.aux_offset()..],
        })
    }

    /// Returns a decoded value of the tag with `name`. Takes `O(n_tags)`.
    pub fn get(&self, name: &TagName) -> Result<AuxValue> {
        self.tags()?.get(name)
    }

    pub fn has(&self, name: &TagName) -> Result<bool> {
        self.tags()?.has(name)
    }

    /// Tag names in physical order.
    pub fn keys(&self) -> Result<Vec<TagName>> {
        self.tags()?.keys()
    }

    /// Decoded values in physical order.
    pub fn values(&self) -> Result<Vec<AuxValue>> {
        self.tags()?.values()
    }

    /// Writes the record in its binary wire form.
    pub fn write_bam<W: Write>(&self, stream: &mut W) -> Result<()> {
        self.require_filled()?;
        stream.write_i32::<LittleEndian>(self.block_size)?;
        stream.write_i32::<LittleEndian>(self.ref_id)?;
        stream.write_i32::<LittleEndian>(self.start)?;
        stream.write_u8(self.name_len)?;
        stream.write_u8(self.mapq)?;
        stream.write_u16::<LittleEndian>(self.bin)?;
        stream.write_u16::<LittleEndian>(self.n_cigar)?;
        stream.write_u16::<LittleEndian>(self.flag)?;
        stream.write_i32::<LittleEndian>(self.seq_len)?;
        stream.write_i32::<LittleEndian>(self.next_ref_id)?;
        stream.write_i32::<LittleEndian>(self.next_start)?;
        stream.write_i32::<LittleEndian>(self.template_len)?;
        stream.write_all(&self.data)?;
        Ok(())
    }

    /// Serializes into a fresh byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(FIXED_BYTES + self.data.len());
        self.write_bam(&mut out)?;
        Ok(out)
    }
}

/// Structural equality: the fixed header fields and the used payload
/// window. The header link does not take part.
impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.block_size == other.block_size
            && self.ref_id == other.ref_id
            && self.start == other.start
            && self.name_len == other.name_len
            && self.mapq == other.mapq
            && self.bin == other.bin
            && self.n_cigar == other.n_cigar
            && self.flag == other.flag
            && self.seq_len == other.seq_len
            && self.next_ref_id == other.next_ref_id
            && self.next_start == other.next_start
            && self.template_len == other.template_len
            && self.data == other.data
    }
}

/// View over the raw auxiliary region of a binary record. Fields are
/// scanned in physical order; decoded values are fresh owned values.
pub struct Tags<'a> {
    raw: &'a [u8],
}

impl<'a> Tags<'a> {
    /// Returns the raw region bytes.
    pub fn raw(&self) -> &[u8] {
        self.raw
    }

    /// Returns the byte offset of the field with `name`, if present.
    pub fn find(&self, name: &TagName) -> Result<Option<usize>> {
        aux::find(self.raw, name)
    }

    pub fn has(&self, name: &TagName) -> Result<bool> {
        Ok(self.find(name)?.is_some())
    }

    /// Decodes the value of the field with `name`. Fails with `UnknownTag`
    /// if the tag is not present.
    pub fn get(&self, name: &TagName) -> Result<AuxValue> {
        match self.find(name)? {
            Some(offset) => {
                let len = aux::field_len(&self.raw[offset..])?;
                aux::decode_bin(self.raw[offset + 2], &self.raw[offset + 3..offset + len])
            }
            None => Err(Error::UnknownTag(*name)),
        }
    }

    /// Decodes every field in physical order.
    pub fn to_vec(&self) -> Result<Vec<(TagName, AuxValue)>> {
        let mut fields = Vec::new();
        let mut start = 0;
        while start < self.raw.len() {
            let len = aux::field_len(&self.raw[start..])?;
            if start + len > self.raw.len() {
                return Err(Error::Corrupted("Truncated tags".to_string()));
            }
            let name = [self.raw[start], self.raw[start + 1]];
            let value =
                aux::decode_bin(self.raw[start + 2], &self.raw[start + 3..start + len])?;
            fields.push((name, value));
            start += len;
        }
        Ok(fields)
    }

    /// Tag names in physical order.
    pub fn keys(&self) -> Result<Vec<TagName>> {
        Ok(self.to_vec()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Decoded values in physical order.
    pub fn values(&self) -> Result<Vec<AuxValue>> {
        Ok(self.to_vec()?.into_iter().map(|(_, value)| value).collect())
    }
}
