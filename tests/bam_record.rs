use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use rand::Rng;

use alnrec::bam::Record;
use alnrec::{AnchorOp, AuxValue, Error, Header, IntegerType};

fn op_code(symbol: u8) -> u32 {
    match symbol {
        b'M' => 0,
        b'I' => 1,
        b'D' => 2,
        b'N' => 3,
        b'S' => 4,
        b'H' => 5,
        b'P' => 6,
        b'=' => 7,
        b'X' => 8,
        b'B' => 9,
        _ => panic!("Unexpected CIGAR operation: {}", symbol as char),
    }
}

fn pack_op(len: u32, symbol: u8) -> u32 {
    len << 4 | op_code(symbol)
}

fn nt_code(nt: u8) -> u8 {
    b"=ACMGRSVTWYHKDBN"
        .iter()
        .position(|&code| code == nt)
        .unwrap_or_else(|| panic!("Nucleotide not expected: {}", nt as char)) as u8
}

/// Packs a text sequence into wire bytes, high nibble first.
fn pack_seq(text: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity((text.len() + 1) / 2);
    for pair in text.chunks(2) {
        let high = nt_code(pair[0]) << 4;
        let low = if pair.len() == 2 { nt_code(pair[1]) } else { 0 };
        packed.push(high | low);
    }
    packed
}

/// Builds serialized record blocks for the tests.
struct BlockBuilder {
    ref_id: i32,
    pos: i32,
    mapq: u8,
    bin: u16,
    flag: u16,
    next_ref_id: i32,
    next_pos: i32,
    tlen: i32,
    name: Vec<u8>,
    cigar: Vec<u32>,
    seq: Vec<u8>,
    qual: Option<Vec<u8>>,
    aux: Vec<u8>,
}

impl BlockBuilder {
    fn new(name: &str) -> Self {
        BlockBuilder {
            ref_id: -1,
            pos: -1,
            mapq: 0,
            bin: 0,
            flag: 0x4,
            next_ref_id: -1,
            next_pos: -1,
            tlen: 0,
            name: name.as_bytes().to_vec(),
            cigar: Vec::new(),
            seq: Vec::new(),
            qual: None,
            aux: Vec::new(),
        }
    }

    fn mapped(mut self, ref_id: i32, pos: i32) -> Self {
        self.ref_id = ref_id;
        self.pos = pos;
        self.flag &= !0x4;
        self
    }

    fn flag(mut self, flag: u16) -> Self {
        self.flag = flag;
        self
    }

    fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    fn tlen(mut self, tlen: i32) -> Self {
        self.tlen = tlen;
        self
    }

    fn cigar(mut self, ops: &[(u32, u8)]) -> Self {
        self.cigar = ops.iter().map(|&(len, symbol)| pack_op(len, symbol)).collect();
        self
    }

    fn seq(mut self, text: &str) -> Self {
        self.seq = text.as_bytes().to_vec();
        self
    }

    fn qual(mut self, values: &[u8]) -> Self {
        self.qual = Some(values.to_vec());
        self
    }

    fn tag_i32(mut self, name: &[u8; 2], value: i32) -> Self {
        self.aux.extend_from_slice(name);
        self.aux.push(b'i');
        self.aux.write_i32::<LittleEndian>(value).unwrap();
        self
    }

    fn tag_string(mut self, name: &[u8; 2], value: &str) -> Self {
        self.aux.extend_from_slice(name);
        self.aux.push(b'Z');
        self.aux.extend_from_slice(value.as_bytes());
        self.aux.push(0);
        self
    }

    fn tag_u32_array(mut self, name: &[u8; 2], values: &[u32]) -> Self {
        self.aux.extend_from_slice(name);
        self.aux.extend_from_slice(b"BI");
        self.aux.write_i32::<LittleEndian>(values.len() as i32).unwrap();
        for &value in values {
            self.aux.write_u32::<LittleEndian>(value).unwrap();
        }
        self
    }

    fn raw_aux(mut self, bytes: &[u8]) -> Self {
        self.aux.extend_from_slice(bytes);
        self
    }

    fn build(self) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.name);
        payload.push(0);
        for value in &self.cigar {
            payload.write_u32::<LittleEndian>(*value).unwrap();
        }
        payload.extend_from_slice(&pack_seq(&self.seq));
        match &self.qual {
            Some(values) => {
                assert_eq!(values.len(), self.seq.len());
                payload.extend_from_slice(values);
            }
            None => payload.extend(std::iter::repeat(0xff).take(self.seq.len())),
        }
        payload.extend_from_slice(&self.aux);

        let mut block = Vec::with_capacity(36 + payload.len());
        block.write_i32::<LittleEndian>(32 + payload.len() as i32).unwrap();
        block.write_i32::<LittleEndian>(self.ref_id).unwrap();
        block.write_i32::<LittleEndian>(self.pos).unwrap();
        block.write_u8(self.name.len() as u8 + 1).unwrap();
        block.write_u8(self.mapq).unwrap();
        block.write_u16::<LittleEndian>(self.bin).unwrap();
        block.write_u16::<LittleEndian>(self.cigar.len() as u16).unwrap();
        block.write_u16::<LittleEndian>(self.flag).unwrap();
        block.write_i32::<LittleEndian>(self.seq.len() as i32).unwrap();
        block.write_i32::<LittleEndian>(self.next_ref_id).unwrap();
        block.write_i32::<LittleEndian>(self.next_pos).unwrap();
        block.write_i32::<LittleEndian>(self.tlen).unwrap();
        block.extend_from_slice(&payload);
        block
    }
}

#[test]
fn minimal_unmapped() {
    let block = BlockBuilder::new("read1").build();
    let record = Record::from_bytes(&block).unwrap();

    assert!(record.is_filled());
    assert!(!record.is_mapped().unwrap());
    assert_eq!(record.template_name().unwrap(), "read1");
    assert_eq!(record.cigar(true).unwrap().to_string(), "");
    assert!(record.sequence().unwrap().is_none());
    assert_eq!(record.ref_id().unwrap(), 0);
    assert_eq!(record.position().unwrap(), 0);
    assert!(!record.has_position().unwrap());
    assert!(!record.has_sequence().unwrap());
    assert!(record.keys().unwrap().is_empty());
}

#[test]
fn mapped_small_cigar() {
    let block = BlockBuilder::new("readA")
        .mapped(0, 99)
        .mapq(60)
        .cigar(&[(10, b'M')])
        .seq("AACCGGTTAA")
        .qual(&[30; 10])
        .build();
    let mut record = Record::from_bytes(&block).unwrap();

    assert_eq!(record.ref_id().unwrap(), 1);
    assert_eq!(record.position().unwrap(), 100);
    assert_eq!(record.align_length().unwrap(), 10);
    assert_eq!(record.right_position().unwrap(), 109);
    assert_eq!(record.cigar(true).unwrap().to_string(), "10M");
    assert_eq!(record.mapping_quality().unwrap(), 60);
    assert!(record.has_mapping_quality().unwrap());
    assert!(record.is_mapped().unwrap());
    assert!(record.is_primary().unwrap());
    assert!(record.is_positive_strand().unwrap());

    // No header attached yet.
    assert!(matches!(record.ref_name(), Err(Error::NoReader)));

    let mut header = Header::new();
    header.push_reference("ref", 1000);
    let header = Arc::new(header);
    record.assign_header(&header);
    assert_eq!(record.ref_name().unwrap(), "ref");
    assert_eq!(record.ref_len().unwrap(), 1000);

    // The link does not keep the header alive.
    drop(header);
    assert!(matches!(record.ref_name(), Err(Error::NoReader)));
}

#[test]
fn sequence_nibble_swap() {
    let block = BlockBuilder::new("r").mapped(0, 0).seq("ACGT").build();
    let record = Record::from_bytes(&block).unwrap();
    let seq = record.sequence().unwrap().unwrap();

    // Wire bytes are 0x12, 0x48; in memory the nibbles of each byte are
    // swapped so that the low nibble holds the earlier position.
    assert_eq!(seq.raw(), &[0x21, 0x84]);
    assert_eq!(seq.len(), 4);
    assert_eq!(seq.to_vec(), b"ACGT".to_vec());
    assert_eq!(seq.at(0), b'A');
    assert_eq!(seq.at(3), b'T');
}

#[test]
fn odd_length_sequence() {
    let block = BlockBuilder::new("r").mapped(0, 0).seq("ACGTN").build();
    let record = Record::from_bytes(&block).unwrap();
    let seq = record.sequence().unwrap().unwrap();
    assert_eq!(seq.len(), 5);
    assert_eq!(seq.to_vec(), b"ACGTN".to_vec());
    assert_eq!(seq.subseq(1..4).collect::<Vec<u8>>(), b"CGT".to_vec());
}

#[test]
fn ambiguity_codes_collapse_to_n() {
    let block = BlockBuilder::new("r").mapped(0, 0).seq("ARGT").build();
    let record = Record::from_bytes(&block).unwrap();
    let seq = record.sequence().unwrap().unwrap();
    assert_eq!(seq.at(1), b'R');
    assert_eq!(seq.at_acgtn_only(1), b'N');
    assert_eq!(seq.at_acgtn_only(0), b'A');
}

#[test]
fn quality_matches_sequence_length() {
    let qual: Vec<u8> = (0..10).collect();
    let block = BlockBuilder::new("r")
        .mapped(0, 10)
        .seq("AACCGGTTAA")
        .qual(&qual)
        .build();
    let record = Record::from_bytes(&block).unwrap();

    assert!(record.has_quality().unwrap());
    assert_eq!(record.quality().unwrap(), qual);
    assert_eq!(record.quality().unwrap().len() as i64, record.seq_length().unwrap());
}

#[test]
fn absent_quality_is_ff_filled() {
    let block = BlockBuilder::new("r").mapped(0, 10).seq("ACGT").build();
    let record = Record::from_bytes(&block).unwrap();
    assert!(!record.has_quality().unwrap());
    assert_eq!(record.quality().unwrap(), vec![0xff; 4]);
}

#[test]
fn cg_escape() {
    let seq = "A".repeat(150);
    let true_cigar = [pack_op(100, b'M'), pack_op(25, b'I'), pack_op(25, b'D')];
    let block = BlockBuilder::new("long")
        .mapped(0, 1000)
        .cigar(&[(150, b'S'), (0, b'N')])
        .seq(&seq)
        .tag_u32_array(b"CG", &true_cigar)
        .build();
    let record = Record::from_bytes(&block).unwrap();

    assert_eq!(record.n_cigar_ops(true).unwrap(), 3);
    assert_eq!(record.n_cigar_ops(false).unwrap(), 2);
    assert_eq!(record.cigar(true).unwrap().to_string(), "100M25I25D");
    assert_eq!(record.cigar(false).unwrap().to_string(), "150S0N");
    // The stored pseudo-CIGAR drives align_length: a soft clip and a
    // zero-length skip consume no reference.
    assert_eq!(record.align_length().unwrap(), 0);
    assert!(matches!(
        record.get(b"CG").unwrap(),
        AuxValue::IntArray(_, IntegerType::U32)
    ));
}

#[test]
fn cg_escape_needs_matching_tag_type() {
    // Same pseudo-CIGAR, but CG is a plain int: the stored CIGAR wins.
    let block = BlockBuilder::new("long")
        .mapped(0, 1000)
        .cigar(&[(4, b'S'), (0, b'N')])
        .seq("ACGT")
        .tag_i32(b"CG", 7)
        .build();
    let record = Record::from_bytes(&block).unwrap();
    assert_eq!(record.n_cigar_ops(true).unwrap(), 2);
    assert_eq!(record.cigar(true).unwrap().to_string(), "4S0N");
}

#[test]
fn cigar_consistency() {
    let block = BlockBuilder::new("r")
        .mapped(0, 0)
        .cigar(&[(8, b'M'), (2, b'I'), (4, b'M'), (1, b'D'), (3, b'M')])
        .build();
    let record = Record::from_bytes(&block).unwrap();

    let cigar = record.cigar(true).unwrap();
    assert_eq!(record.n_cigar_ops(true).unwrap(), cigar.len());
    let (ops, lens) = cigar.to_rle();
    assert_eq!(ops.len(), lens.len());
    let rendered = cigar.to_string();
    assert_eq!(rendered, "8M2I4M1D3M");
    assert_eq!(alnrec::Cigar::from_text(rendered.as_bytes()).unwrap(), cigar);
    assert_eq!(record.align_length().unwrap(), 8 + 4 + 1 + 3);
}

#[test]
fn alignment_anchors() {
    let block = BlockBuilder::new("r")
        .mapped(0, 99)
        .cigar(&[(2, b'M'), (1, b'I'), (3, b'D')])
        .seq("ACG")
        .build();
    let record = Record::from_bytes(&block).unwrap();
    let anchors = record.alignment().unwrap();

    assert_eq!(anchors.len(), 4);
    assert_eq!(
        (anchors[0].seq_pos, anchors[0].ref_pos, anchors[0].aln_pos, anchors[0].op),
        (0, 99, 0, AnchorOp::Start)
    );
    assert_eq!(
        (anchors[1].seq_pos, anchors[1].ref_pos, anchors[1].aln_pos, anchors[1].op),
        (2, 101, 2, AnchorOp::Match)
    );
    assert_eq!(
        (anchors[2].seq_pos, anchors[2].ref_pos, anchors[2].aln_pos, anchors[2].op),
        (3, 101, 3, AnchorOp::Insert)
    );
    assert_eq!(
        (anchors[3].seq_pos, anchors[3].ref_pos, anchors[3].aln_pos, anchors[3].op),
        (3, 104, 6, AnchorOp::Delete)
    );
}

#[test]
fn alignment_of_unmapped_record_is_empty() {
    let block = BlockBuilder::new("r").build();
    let record = Record::from_bytes(&block).unwrap();
    assert!(record.alignment().unwrap().is_empty());
}

#[test]
fn alignment_rejects_clipping_ops() {
    let block = BlockBuilder::new("r")
        .mapped(0, 0)
        .cigar(&[(5, b'H'), (2, b'M')])
        .build();
    let record = Record::from_bytes(&block).unwrap();
    assert!(matches!(record.alignment(), Err(Error::UnsupportedCigarOp('H'))));
}

#[test]
fn aux_values() {
    let mut aux = Vec::new();
    aux.extend_from_slice(b"XAAY"); // XA:A:Y
    aux.extend_from_slice(&[b'X', b'C', b'c', 0xd6]); // XC:c:-42
    aux.extend_from_slice(b"XSS");
    aux.write_i16::<LittleEndian>(-1000).unwrap();
    aux.extend_from_slice(b"XFf");
    aux.write_f32::<LittleEndian>(3.14).unwrap();
    aux.extend_from_slice(b"XHH1AFF\0");
    let block = BlockBuilder::new("r")
        .mapped(0, 0)
        .raw_aux(&aux)
        .tag_string(b"XZ", "hello")
        .tag_i32(b"NM", 1)
        .build();
    let record = Record::from_bytes(&block).unwrap();

    assert_eq!(record.get(b"XA").unwrap(), AuxValue::Char(b'Y'));
    assert_eq!(record.get(b"XC").unwrap(), AuxValue::Int(-42));
    assert_eq!(record.get(b"XS").unwrap(), AuxValue::Int(-1000));
    assert_eq!(record.get(b"XF").unwrap(), AuxValue::Float(3.14));
    assert_eq!(record.get(b"XH").unwrap(), AuxValue::Hex(vec![0x1a, 0xff]));
    assert_eq!(record.get(b"XZ").unwrap(), AuxValue::String("hello".to_string()));
    assert_eq!(record.get(b"NM").unwrap(), AuxValue::Int(1));

    assert!(record.has(b"NM").unwrap());
    assert!(!record.has(b"ZZ").unwrap());
    assert!(matches!(record.get(b"ZZ"), Err(Error::UnknownTag(_))));

    let keys = record.keys().unwrap();
    assert_eq!(
        keys,
        vec![*b"XA", *b"XC", *b"XS", *b"XF", *b"XH", *b"XZ", *b"NM"]
    );
    assert_eq!(record.values().unwrap().len(), keys.len());
    assert_eq!(record.tags().unwrap().find(b"XA").unwrap(), Some(0));
}

#[test]
fn accessors_fail_on_empty_record() {
    let record = Record::new();
    assert!(!record.is_filled());
    assert!(matches!(record.flag(), Err(Error::NotFilled)));
    assert!(matches!(record.position(), Err(Error::NotFilled)));
    assert!(matches!(record.template_name(), Err(Error::NotFilled)));
    assert!(matches!(record.cigar(true), Err(Error::NotFilled)));
    assert!(matches!(record.sequence(), Err(Error::NotFilled)));
    assert!(matches!(record.quality(), Err(Error::NotFilled)));
    assert!(matches!(record.get(b"NM"), Err(Error::NotFilled)));
    assert!(matches!(record.to_bytes(), Err(Error::NotFilled)));
}

#[test]
fn short_buffers_are_rejected() {
    let block = BlockBuilder::new("read1").build();
    assert!(matches!(Record::from_bytes(&block[..10]), Err(Error::ShortBuffer)));
    assert!(matches!(
        Record::from_bytes(&block[..block.len() - 1]),
        Err(Error::ShortBuffer)
    ));

    // A failed refill leaves the previous contents in place.
    let mut record = Record::from_bytes(&block).unwrap();
    assert!(record.fill_from_bytes(&block[..20]).is_err());
    assert_eq!(record.template_name().unwrap(), "read1");
}

#[test]
fn round_trip() {
    let blocks = vec![
        BlockBuilder::new("read1").build(),
        BlockBuilder::new("readA")
            .mapped(0, 99)
            .mapq(60)
            .cigar(&[(10, b'M')])
            .seq("AACCGGTTAA")
            .qual(&[30; 10])
            .tag_i32(b"NM", 1)
            .build(),
        BlockBuilder::new("long")
            .mapped(2, 12345)
            .flag(99)
            .tlen(-200)
            .cigar(&[(4, b'S'), (0, b'N')])
            .seq("ACGT")
            .tag_u32_array(b"CG", &[pack_op(2, b'M'), pack_op(2, b'I')])
            .build(),
    ];
    for block in blocks {
        let record = Record::from_bytes(&block).unwrap();
        assert_eq!(record.to_bytes().unwrap(), block);
    }
}

#[test]
fn copies_are_independent() {
    let block1 = BlockBuilder::new("first").mapped(0, 5).seq("ACGT").build();
    let block2 = BlockBuilder::new("second").build();

    let original = Record::from_bytes(&block1).unwrap();
    let mut copy = original.clone();
    assert_eq!(original, copy);

    copy.fill_from_bytes(&block2).unwrap();
    assert_ne!(original, copy);
    assert_eq!(original.template_name().unwrap(), "first");
    assert_eq!(copy.template_name().unwrap(), "second");
}

#[test]
fn clear_is_idempotent() {
    let block = BlockBuilder::new("read1").build();
    let mut record = Record::from_bytes(&block).unwrap();
    record.clear();
    assert!(!record.is_filled());
    assert!(matches!(record.flag(), Err(Error::NotFilled)));
    let once = record.clone();
    record.clear();
    assert_eq!(record, once);

    // A cleared record can be refilled.
    record.fill_from_bytes(&block).unwrap();
    assert_eq!(record.template_name().unwrap(), "read1");
}

#[test]
fn random_records_survive_a_round_trip() {
    let mut rng = rand::thread_rng();
    let mut record = Record::new();
    for _ in 0..200 {
        let name_len = rng.gen_range(1..10);
        let name: String = (0..name_len)
            .map(|_| b"abcdefghijklmnopqrstuvwxyz0123456789"[rng.gen_range(0..36)] as char)
            .collect();
        let mut builder = BlockBuilder::new(&name)
            .flag(rng.gen::<u16>() | 0x4)
            .mapq(rng.gen())
            .tlen(rng.gen_range(-1000..1000));
        if rng.gen() {
            builder = builder.mapped(rng.gen_range(0..10), rng.gen_range(0..100_000));
            let n_ops = rng.gen_range(1..6);
            let ops: Vec<(u32, u8)> = (0..n_ops)
                .map(|_| (rng.gen_range(1..100), b"MIDNS=X"[rng.gen_range(0..7)]))
                .collect();
            builder = builder.cigar(&ops);
        }
        let seq_len = rng.gen_range(0..50);
        let seq: String = (0..seq_len)
            .map(|_| b"ACGTN"[rng.gen_range(0..5)] as char)
            .collect();
        builder = builder.seq(&seq);
        if seq_len > 0 && rng.gen() {
            let qual: Vec<u8> = (0..seq_len).map(|_| rng.gen_range(0..94)).collect();
            builder = builder.qual(&qual);
        }
        let block = builder.tag_i32(b"NM", rng.gen_range(0..100)).build();

        record.fill_from_bytes(&block).unwrap();
        assert_eq!(record.to_bytes().unwrap(), block);
        assert_eq!(record.template_name().unwrap(), name);
        assert_eq!(record.clone(), record);
        record.cigar(true).unwrap();
        record.align_length().unwrap();
        record.quality().unwrap();
        assert!(matches!(record.get(b"NM").unwrap(), AuxValue::Int(_)));
    }
}
