//! Core variant-record model.
//!
//! Records flow through the pipeline in a typed, owned representation that is
//! independent of the on-disk format: INFO values and per-sample FORMAT
//! columns are tagged unions, and every per-sample field is stored as a
//! concatenated column (flat data plus a prefix-sum delimiter vector) rather
//! than a vector of vectors.

/// Canonical diploid genotype index for the unordered allele pair `(a, b)`
/// with `a <= b`.
pub fn gt_index(a: usize, b: usize) -> usize {
    debug_assert!(a <= b);
    b * (b + 1) / 2 + a
}

/// Number of diploid genotypes for a record with `n_alts` ALT alleles.
pub fn genotype_count(n_alts: usize) -> usize {
    gt_index(n_alts, n_alts) + 1
}

/// A ragged two-dimensional array in concatenated layout: one flat `data`
/// vector plus a delimiter vector of prefix sums with `delim[0] == 0` and
/// `delim[len()] == data.len()`. Row `i` is `data[delim[i]..delim[i + 1]]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Column<T> {
    data: Vec<T>,
    delim: Vec<usize>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Column<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            delim: vec![0],
        }
    }

    /// Assembles a column from its raw concatenated layout. The delimiter
    /// vector must be a prefix-sum vector bracketing `data`.
    pub fn from_parts(data: Vec<T>, delim: Vec<usize>) -> Self {
        debug_assert!(!delim.is_empty());
        debug_assert_eq!(delim[0], 0);
        debug_assert_eq!(*delim.last().unwrap(), data.len());
        Self { data, delim }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.delim.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of elements across all rows.
    pub fn flat_len(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[self.delim[i]..self.delim[i + 1]]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        let (start, end) = (self.delim[i], self.delim[i + 1]);
        &mut self.data[start..end]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[T]> {
        (0..self.len()).map(|i| self.row(i))
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<T> {
        &mut self.data
    }

    pub fn delim(&self) -> &[usize] {
        &self.delim
    }

    /// Appends a row from an iterator.
    pub fn push_row<I>(&mut self, row: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.data.extend(row);
        self.delim.push(self.data.len());
    }

    /// Logically clears the column without releasing capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.delim.clear();
        self.delim.push(0);
    }

    pub fn reserve(&mut self, rows: usize, flat: usize) {
        self.delim.reserve(rows);
        self.data.reserve(flat);
    }

    /// Rewrites the delimiters for a rectangular shape of `len()` rows with
    /// `inner` elements each. The flat data must already have that size.
    pub fn set_rectangular(&mut self, inner: usize) {
        debug_assert_eq!(self.data.len(), (self.delim.len() - 1) * inner);
        for (i, d) in self.delim.iter_mut().enumerate() {
            *d = i * inner;
        }
    }
}

impl<T: Copy + Default> Column<T> {
    /// Clears and resizes to a rectangular `outer x inner` scaffold of
    /// default values, reusing the existing allocation.
    pub fn scaffold(&mut self, outer: usize, inner: usize) {
        self.data.clear();
        self.data.resize(outer * inner, T::default());
        self.delim.clear();
        self.delim.extend((0..=outer).map(|i| i * inner));
        debug_assert_eq!(*self.delim.last().unwrap(), self.data.len());
    }
}

/// Stable removal of the elements whose position modulo `filter.len()` is
/// flagged. The modulo down-maps flat indexes of a concatenated column to
/// inner positions; for a plain vector it is the identity.
pub fn remove_by_filter<T>(vec: &mut Vec<T>, filter: &[bool]) {
    let width = filter.len();
    let mut k = 0;
    vec.retain(|_| {
        let keep = !filter[k % width];
        k += 1;
        keep
    });
}

/// An integer INFO vector, tagged by storage width.
#[derive(Clone, Debug, PartialEq)]
pub enum IntArray {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
}

impl IntArray {
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A typed INFO value.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
    Flag,
    Integer(i32),
    Float(f32),
    String(String),
    IntegerArray(IntArray),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
}

/// A typed per-sample FORMAT column. Numeric fields are concatenated
/// columns; string-valued fields (GT) carry one string per sample.
#[derive(Clone, Debug, PartialEq)]
pub enum FormatValue {
    I8(Column<i8>),
    I16(Column<i16>),
    I32(Column<i32>),
    F32(Column<f32>),
    Str(Vec<String>),
}

impl FormatValue {
    /// Flat element count, across all samples.
    pub fn flat_len(&self) -> usize {
        match self {
            Self::I8(c) => c.flat_len(),
            Self::I16(c) => c.flat_len(),
            Self::I32(c) => c.flat_len(),
            Self::F32(c) => c.flat_len(),
            Self::Str(v) => v.len(),
        }
    }
}

/// A single variant site with typed INFO and FORMAT payloads.
///
/// `info` and `genotypes` are ordered mappings; field order is preserved
/// through the pipeline and on output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub chrom: String,
    /// 1-based position.
    pub pos: usize,
    /// `"."` when absent.
    pub id: String,
    pub ref_bases: String,
    pub alt: Vec<String>,
    pub qual: Option<f32>,
    pub filters: Vec<String>,
    pub info: Vec<(String, InfoValue)>,
    pub genotypes: Vec<(String, FormatValue)>,
}

impl Record {
    pub fn n_alts(&self) -> usize {
        self.alt.len()
    }

    pub fn info_value(&self, key: &str) -> Option<&InfoValue> {
        self.info
            .iter()
            .find(|(id, _)| id == key)
            .map(|(_, value)| value)
    }

    pub fn format_value(&self, key: &str) -> Option<&FormatValue> {
        self.genotypes
            .iter()
            .find(|(id, _)| id == key)
            .map(|(_, value)| value)
    }

    pub fn format_value_mut(&mut self, key: &str) -> Option<&mut FormatValue> {
        self.genotypes
            .iter_mut()
            .find(|(id, _)| id == key)
            .map(|(_, value)| value)
    }

    pub fn has_format(&self, key: &str) -> bool {
        self.genotypes.iter().any(|(id, _)| id == key)
    }
}
