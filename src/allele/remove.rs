//! Rare-allele removal.
//!
//! A removal pass derives a triple of parallel filter vectors (R, A, G) from
//! the record's INFO `AF` values, compacts every allele-indexed array by
//! them, renormalizes PL, and recomputes GT from the surviving likelihoods.
//! The filter vectors and the `g(a, b)` reverse lookup are owned by the
//! pipeline and reused across records.

use std::fmt::Write;

use crate::{
    error::{Error, Result},
    header::{FieldNumbers, Number},
    record::{
        Column, FormatValue, InfoValue, IntArray, Record, genotype_count, gt_index,
        remove_by_filter,
    },
};

/// Outcome of a removal pass over one record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Removal {
    /// No allele fell under the threshold; the record was left untouched.
    Unchanged,
    /// Some alleles were removed and all dependent fields rewritten.
    Rewritten,
    /// Every ALT allele fell under the threshold; skip the record.
    Dropped,
}

/// Filter vectors for fields of multiplicity A, R or G, flagging the
/// positions to be removed, plus the reverse lookup of the genotype-index
/// formula. Capacities grow monotonically across records.
#[derive(Debug, Default)]
pub struct FilterCache {
    pub r: Vec<bool>,
    pub a: Vec<bool>,
    pub g: Vec<bool>,
    formula_reverse: Vec<(usize, usize)>,
}

impl FilterCache {
    /// Builds the R vector from INFO `AF`: ALT `i` is flagged iff
    /// `AF[i] < threshold`. REF is never flagged.
    pub fn derive_r_from_af(
        &mut self,
        record: &Record,
        record_no: usize,
        threshold: f32,
    ) -> Result<()> {
        let n_alts = record.n_alts();

        self.r.clear();
        self.r.resize(n_alts + 1, false);

        let Some(value) = record.info_value("AF") else {
            return Err(Error::MissingAf { record: record_no });
        };

        let InfoValue::FloatArray(afs) = value else {
            return Err(Error::AfTypeMismatch { record: record_no });
        };

        if afs.len() != n_alts {
            return Err(Error::AfLengthMismatch {
                record: record_no,
                expected: n_alts,
                actual: afs.len(),
            });
        }

        for (i, &af) in afs.iter().enumerate() {
            if af < threshold {
                self.r[i + 1] = true;
            }
        }

        Ok(())
    }

    /// Derives A and G from R and tops up the formula reverse lookup. Must
    /// run after one of the `derive_r_*` methods.
    pub fn derive_a_g(&mut self, n_alts: usize) {
        self.a.clear();
        self.a.extend_from_slice(&self.r[1..]);

        let gt_size = genotype_count(n_alts);
        self.g.clear();
        self.g.resize(gt_size, false);

        for b in 0..=n_alts {
            for a in 0..=b {
                self.g[gt_index(a, b)] = self.r[a] || self.r[b];
            }
        }

        // The formula inverse does not depend on the record, so the lookup
        // is only extended, never rebuilt.
        if self.formula_reverse.len() < gt_size {
            self.formula_reverse.resize(gt_size, (0, 0));
            for b in 0..=n_alts {
                for a in 0..=b {
                    self.formula_reverse[gt_index(a, b)] = (a, b);
                }
            }
        }
    }

    /// Allele pair `(a, b)` with `g(a, b) == k`.
    pub fn reverse(&self, k: usize) -> (usize, usize) {
        self.formula_reverse[k]
    }
}

fn ones(filter: &[bool]) -> usize {
    filter.iter().filter(|&&flagged| flagged).count()
}

/// Compacts every INFO vector declared A or R by the matching filter.
pub fn update_infos(
    record: &mut Record,
    record_no: usize,
    numbers: &FieldNumbers,
    cache: &FilterCache,
) -> Result<()> {
    for (id, value) in record.info.iter_mut() {
        let filter = match numbers.info(id) {
            Number::A => &cache.a,
            Number::R => &cache.r,
            _ => continue,
        };

        compact_info_value(record_no, id, value, filter)?;
    }

    Ok(())
}

fn compact_info_value(
    record_no: usize,
    id: &str,
    value: &mut InfoValue,
    filter: &[bool],
) -> Result<()> {
    let actual = match value {
        InfoValue::IntegerArray(IntArray::I8(v)) => compact_vector(v, filter),
        InfoValue::IntegerArray(IntArray::I16(v)) => compact_vector(v, filter),
        InfoValue::IntegerArray(IntArray::I32(v)) => compact_vector(v, filter),
        InfoValue::FloatArray(v) => compact_vector(v, filter),
        InfoValue::StringArray(v) => compact_vector(v, filter),
        // Scalars and flags cannot carry allele multiplicity.
        _ => Some(1),
    };

    if let Some(actual) = actual {
        return Err(Error::FieldLengthMismatch {
            record: record_no,
            field: id.to_string(),
            expected: filter.len(),
            actual,
        });
    }

    Ok(())
}

/// Compacts in place; returns the offending length when it disagrees with
/// the filter.
fn compact_vector<T>(vec: &mut Vec<T>, filter: &[bool]) -> Option<usize> {
    if vec.len() != filter.len() {
        return Some(vec.len());
    }

    remove_by_filter(vec, filter);
    None
}

/// Compacts every FORMAT column declared A, R or G; PL columns are
/// additionally renormalized so each sample's minimum is 0.
pub fn update_genotypes(
    record: &mut Record,
    record_no: usize,
    numbers: &FieldNumbers,
    cache: &FilterCache,
) -> Result<()> {
    let n_samples = numbers.n_samples();

    for (id, value) in record.genotypes.iter_mut() {
        let filter = match numbers.format(id) {
            Number::A => &cache.a,
            Number::R => &cache.r,
            Number::G => &cache.g,
            _ => continue,
        };

        match value {
            FormatValue::I8(column) => compact_column(column, filter, n_samples, record_no, id)?,
            FormatValue::I16(column) => compact_column(column, filter, n_samples, record_no, id)?,
            FormatValue::I32(column) => compact_column(column, filter, n_samples, record_no, id)?,
            FormatValue::F32(column) => compact_column(column, filter, n_samples, record_no, id)?,
            FormatValue::Str(_) => {
                return Err(Error::DiploidOrCardinalityMismatch {
                    record: record_no,
                    field: id.clone(),
                });
            }
        }

        if id == "PL" {
            match value {
                FormatValue::I8(column) => renormalize(column),
                FormatValue::I16(column) => renormalize(column),
                FormatValue::I32(column) => renormalize(column),
                FormatValue::F32(column) => renormalize(column),
                FormatValue::Str(_) => unreachable!(),
            }
        }
    }

    Ok(())
}

fn compact_column<T>(
    column: &mut Column<T>,
    filter: &[bool],
    n_samples: usize,
    record_no: usize,
    id: &str,
) -> Result<()> {
    let n_before = filter.len();
    let n_after = n_before - ones(filter);

    if column.flat_len() != n_samples * n_before {
        return Err(Error::DiploidOrCardinalityMismatch {
            record: record_no,
            field: id.to_string(),
        });
    }

    remove_by_filter(column.data_mut(), filter);
    debug_assert_eq!(column.flat_len(), n_samples * n_after);

    column.set_rectangular(n_after);
    Ok(())
}

/// Shifts each sample's values so the row minimum is 0.
fn renormalize<T>(column: &mut Column<T>)
where
    T: Copy + Default + PartialOrd + std::ops::Sub<Output = T>,
{
    for i in 0..column.len() {
        let row = column.row_mut(i);
        let Some(&first) = row.first() else { continue };

        let mut min = first;
        for &value in row.iter() {
            if value < min {
                min = value;
            }
        }

        if min > T::default() {
            for value in row.iter_mut() {
                *value = *value - min;
            }
        }
    }
}

/// Recomputes GT from the post-removal PL values: the genotype with the
/// smallest PL wins (lowest index on ties), and the pair is looked up via
/// the formula reverse cache. Rewritten genotypes are always unphased.
pub fn fix_gt(record: &mut Record, record_no: usize, cache: &FilterCache) -> Result<()> {
    let Some(gt_pos) = record.genotypes.iter().position(|(id, _)| id == "GT") else {
        return Ok(());
    };

    let Some(pl_pos) = record.genotypes.iter().position(|(id, _)| id == "PL") else {
        tracing::warn!(
            record = record_no,
            "no PL field; GT left unchanged after allele removal"
        );
        return Ok(());
    };

    let mut gts = match &mut record.genotypes[gt_pos].1 {
        FormatValue::Str(values) => std::mem::take(values),
        _ => {
            return Err(Error::reader(
                record_no,
                "GT field was not a string column",
            ));
        }
    };

    match &record.genotypes[pl_pos].1 {
        FormatValue::I8(column) => fix_gt_from_pl(column, &mut gts, cache),
        FormatValue::I16(column) => fix_gt_from_pl(column, &mut gts, cache),
        FormatValue::I32(column) => fix_gt_from_pl(column, &mut gts, cache),
        FormatValue::F32(column) => fix_gt_from_pl(column, &mut gts, cache),
        FormatValue::Str(_) => {
            record.genotypes[gt_pos].1 = FormatValue::Str(gts);
            return Err(Error::PlTypeMismatch { record: record_no });
        }
    }

    record.genotypes[gt_pos].1 = FormatValue::Str(gts);
    Ok(())
}

fn fix_gt_from_pl<T>(column: &Column<T>, gts: &mut [String], cache: &FilterCache)
where
    T: Copy + PartialOrd,
{
    for (i, gt) in gts.iter_mut().enumerate().take(column.len()) {
        let row = column.row(i);
        if row.is_empty() {
            continue;
        }

        let mut i_min = 0;
        for (k, &value) in row.iter().enumerate() {
            if value < row[i_min] {
                i_min = k;
            }
        }

        let (a, b) = cache.reverse(i_min);
        gt.clear();
        let _ = write!(gt, "{a}/{b}");
    }
}

/// Compacts `alt` and every A/R/G-indexed field by the already-derived
/// filter vectors, then recomputes GT. Shared by the removal and splitting
/// stages.
pub fn apply_filters(
    record: &mut Record,
    record_no: usize,
    numbers: &FieldNumbers,
    cache: &FilterCache,
) -> Result<()> {
    remove_by_filter(&mut record.alt, &cache.a);
    update_infos(record, record_no, numbers, cache)?;
    update_genotypes(record, record_no, numbers, cache)?;
    fix_gt(record, record_no, cache)
}

/// Removes all ALT alleles with `AF < threshold` from the record,
/// rewriting every dependent array. Returns [`Removal::Dropped`] when no
/// ALT allele survives.
pub fn remove_rare_alleles(
    record: &mut Record,
    record_no: usize,
    numbers: &FieldNumbers,
    threshold: f32,
    cache: &mut FilterCache,
) -> Result<Removal> {
    let n_alts = record.n_alts();

    cache.derive_r_from_af(record, record_no, threshold)?;
    cache.derive_a_g(n_alts);

    tracing::debug!(record = record_no, filter_a = ?cache.a, filter_r = ?cache.r, filter_g = ?cache.g);

    if cache.a.iter().all(|&flagged| flagged) {
        tracing::debug!(
            record = record_no,
            "no remaining alleles; record skipped completely"
        );
        return Ok(Removal::Dropped);
    }

    if !cache.a.iter().any(|&flagged| flagged) {
        return Ok(Removal::Unchanged);
    }

    apply_filters(record, record_no, numbers, cache)?;
    Ok(Removal::Rewritten)
}
