//! Reference dictionary: names and lengths of the reference sequences an
//! alignment may map to.

/// Names and lengths of reference sequences, indexed by 0-based reference
/// id. The dictionary is immutable after load, so independent records may
/// resolve names from separate threads.
///
/// Records do not own the header: they keep a `Weak` link to it (see
/// [assign_header](../bam/struct.Record.html#method.assign_header)), so a
/// record never extends the lifetime of the reader that produced it.
#[derive(Debug, Clone)]
pub struct Header {
    references: Vec<String>,
    lengths: Vec<i64>,
}

impl Header {
    /// Creates an empty dictionary.
    pub fn new() -> Header {
        Header {
            references: Vec::new(),
            lengths: Vec::new(),
        }
    }

    /// Appends a reference sequence and returns its 0-based id.
    pub fn push_reference<S: Into<String>>(&mut self, name: S, len: i64) -> usize {
        self.references.push(name.into());
        self.lengths.push(len);
        self.references.len() - 1
    }

    /// Number of reference sequences.
    pub fn n_references(&self) -> usize {
        self.references.len()
    }

    /// Returns the name of the reference with `ref_id` (0-based).
    /// Returns None if there is no such reference.
    pub fn reference_name(&self, ref_id: usize) -> Option<&str> {
        self.references.get(ref_id).map(String::as_str)
    }

    /// Returns the length of the reference with `ref_id` (0-based).
    /// Returns None if there is no such reference.
    pub fn reference_len(&self, ref_id: usize) -> Option<i64> {
        self.lengths.get(ref_id).copied()
    }
}
