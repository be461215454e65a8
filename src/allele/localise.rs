//! Local-allele projection.
//!
//! For records with more ALT alleles than the budget `L`, each sample's
//! observable allele space is reduced to the `L` alleles most likely to be
//! non-reference for that sample: genotype likelihoods are folded into
//! per-allele probabilities, the top `L` ALT indices become the sample's
//! `LAA` row, and `AD`/`PL` are subsampled into `LAD`/`LPL`. The record's
//! global `alt` list is left untouched.
//!
//! Buffers cycle through the cache: the column built for `LAD`/`LPL` comes
//! out of the per-width scratch slot, and the retired `AD`/`PL` buffer (when
//! the globals are dropped) moves back into that slot for the next record.

use crate::{
    error::{Error, Result},
    record::{Column, FormatValue, Record, genotype_count, gt_index},
};

const LOCAL_FIELDS: [&str; 4] = ["LAA", "LAD", "LGT", "LPL"];

/// Pipeline-owned buffers for the projector, reused across records.
#[derive(Debug, Default)]
pub struct LocaliseCache {
    /// Per-sample indices of the retained alleles, `L` per sample.
    laa: Column<i32>,
    /// Probability accumulator, one slot per allele (REF included), paired
    /// with the allele's original index.
    probs: Vec<(f64, usize)>,
    scratch_i8: Column<i8>,
    scratch_i16: Column<i16>,
    scratch_i32: Column<i32>,
}

fn pl_to_prob(pl: f64) -> f64 {
    10f64.powf(-pl / 10.0)
}

/// Projects the record onto at most `l` local alleles per sample.
pub fn localise_alleles(
    record: &mut Record,
    record_no: usize,
    n_samples: usize,
    l: usize,
    keep_globals: bool,
    cache: &mut LocaliseCache,
) -> Result<()> {
    debug_assert!(record.n_alts() > l);
    project(record, record_no, n_samples, l, keep_globals, cache, false)
}

/// Produces the same LAA/LAD/LPL schema for a record that already fits the
/// budget: LAA lists every ALT verbatim.
pub fn pseudo_localise_alleles(
    record: &mut Record,
    record_no: usize,
    n_samples: usize,
    keep_globals: bool,
    cache: &mut LocaliseCache,
) -> Result<()> {
    let l = record.n_alts();
    project(record, record_no, n_samples, l, keep_globals, cache, true)
}

fn project(
    record: &mut Record,
    record_no: usize,
    n_samples: usize,
    l: usize,
    keep_globals: bool,
    cache: &mut LocaliseCache,
    identity: bool,
) -> Result<()> {
    for id in LOCAL_FIELDS {
        if record.has_format(id) {
            return Err(Error::FieldAlreadyPresent {
                record: record_no,
                field: id.to_string(),
            });
        }
    }

    let n_alts = record.n_alts();

    let Some(pl_pos) = record.genotypes.iter().position(|(id, _)| id == "PL") else {
        return Err(Error::MissingPl { record: record_no });
    };

    match &record.genotypes[pl_pos].1 {
        FormatValue::I8(column) => {
            determine_laa(cache, column, n_alts, n_samples, l, record_no, identity)?
        }
        FormatValue::I16(column) => {
            determine_laa(cache, column, n_alts, n_samples, l, record_no, identity)?
        }
        FormatValue::I32(column) => {
            determine_laa(cache, column, n_alts, n_samples, l, record_no, identity)?
        }
        _ => return Err(Error::PlTypeMismatch { record: record_no }),
    }

    tracing::debug!(record = record_no, laa = ?cache.laa, "local allele index map");

    // LAD
    if let Some(ad_pos) = record.genotypes.iter().position(|(id, _)| id == "AD") {
        let lad = match &mut record.genotypes[ad_pos].1 {
            FormatValue::I8(ad) => FormatValue::I8(build_lad(
                ad,
                &cache.laa,
                &mut cache.scratch_i8,
                n_alts,
                l,
                keep_globals,
                record_no,
            )?),
            FormatValue::I16(ad) => FormatValue::I16(build_lad(
                ad,
                &cache.laa,
                &mut cache.scratch_i16,
                n_alts,
                l,
                keep_globals,
                record_no,
            )?),
            FormatValue::I32(ad) => FormatValue::I32(build_lad(
                ad,
                &cache.laa,
                &mut cache.scratch_i32,
                n_alts,
                l,
                keep_globals,
                record_no,
            )?),
            _ => return Err(Error::AdTypeMismatch { record: record_no }),
        };

        record.genotypes.push((String::from("LAD"), lad));
    }

    // LPL; the PL size was already validated while determining LAA.
    let lpl = match &mut record.genotypes[pl_pos].1 {
        FormatValue::I8(pl) => FormatValue::I8(build_lpl(
            pl,
            &cache.laa,
            &mut cache.scratch_i8,
            l,
            keep_globals,
        )),
        FormatValue::I16(pl) => FormatValue::I16(build_lpl(
            pl,
            &cache.laa,
            &mut cache.scratch_i16,
            l,
            keep_globals,
        )),
        FormatValue::I32(pl) => FormatValue::I32(build_lpl(
            pl,
            &cache.laa,
            &mut cache.scratch_i32,
            l,
            keep_globals,
        )),
        _ => unreachable!("PL width checked above"),
    };
    record.genotypes.push((String::from("LPL"), lpl));

    // LAA comes last because the builders above read from the cache.
    let laa = std::mem::take(&mut cache.laa);
    record.genotypes.push((String::from("LAA"), FormatValue::I32(laa)));

    if !keep_globals {
        record
            .genotypes
            .retain(|(id, _)| id != "AD" && id != "PL");
    }

    Ok(())
}

/// Fills `cache.laa` with each sample's `l` most likely ALT indices, in
/// ascending index order. With `identity` set, every sample simply lists
/// `1..=n_alts`.
fn determine_laa<T>(
    cache: &mut LocaliseCache,
    pls: &Column<T>,
    n_alts: usize,
    n_samples: usize,
    l: usize,
    record_no: usize,
    identity: bool,
) -> Result<()>
where
    T: Copy + Into<i32>,
{
    if pls.flat_len() != n_samples * genotype_count(n_alts) {
        return Err(Error::DiploidOrCardinalityMismatch {
            record: record_no,
            field: String::from("PL"),
        });
    }

    let laa = &mut cache.laa;
    laa.clear();
    laa.reserve(n_samples + 1, n_samples * l);

    if identity {
        for _ in 0..n_samples {
            laa.push_row((1..=n_alts).map(|i| i as i32));
        }
        return Ok(());
    }

    for i in 0..n_samples {
        let sample_pls = pls.row(i);

        let probs = &mut cache.probs;
        probs.clear();
        probs.resize(n_alts + 1, (0.0, 0));
        for (index, slot) in probs.iter_mut().enumerate() {
            slot.1 = index;
        }

        // Each genotype's probability is credited to both of its alleles.
        for b in 0..=n_alts {
            for a in 0..=b {
                let prob = pl_to_prob(f64::from(sample_pls[gt_index(a, b)].into()));
                probs[a].0 += prob;
                probs[b].0 += prob;
            }
        }

        // Rank the ALT alleles by accumulated probability (REF is always
        // kept and never listed), then restore index order over the top l.
        probs[1..].sort_by(|x, y| {
            y.0.partial_cmp(&x.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.1.cmp(&y.1))
        });
        probs[1..=l].sort_by_key(|&(_, index)| index);

        laa.push_row(probs[1..=l].iter().map(|&(_, index)| index as i32));
    }

    debug_assert_eq!(cache.laa.flat_len(), n_samples * l);
    Ok(())
}

/// Builds the LAD column: the REF depth followed by the depths of the
/// sample's local alleles. When the globals are being dropped, the retired
/// AD buffer is moved into the scratch slot.
fn build_lad<T>(
    ad: &mut Column<T>,
    laa: &Column<i32>,
    scratch: &mut Column<T>,
    n_alts: usize,
    l: usize,
    keep_globals: bool,
    record_no: usize,
) -> Result<Column<T>>
where
    T: Copy + Default,
{
    let n_samples = laa.len();

    if ad.flat_len() != n_samples * (n_alts + 1) {
        return Err(Error::DiploidOrCardinalityMismatch {
            record: record_no,
            field: String::from("AD"),
        });
    }

    let mut buffer = std::mem::take(scratch);
    buffer.clear();
    buffer.reserve(n_samples + 1, n_samples * (l + 1));

    for i in 0..n_samples {
        let sample_ad = ad.row(i);
        let sample_laa = laa.row(i);

        buffer.push_row(
            std::iter::once(sample_ad[0])
                .chain(sample_laa.iter().map(|&index| sample_ad[index as usize])),
        );
    }

    if !keep_globals {
        *scratch = std::mem::take(ad);
    }

    Ok(buffer)
}

/// Builds the LPL column by remapping triangular genotype indices through
/// the sample's LAA row.
fn build_lpl<T>(
    pl: &mut Column<T>,
    laa: &Column<i32>,
    scratch: &mut Column<T>,
    l: usize,
    keep_globals: bool,
) -> Column<T>
where
    T: Copy + Default,
{
    let n_samples = laa.len();

    let mut buffer = std::mem::take(scratch);
    buffer.scaffold(n_samples, genotype_count(l));

    for i in 0..n_samples {
        let sample_laa = laa.row(i);
        let sample_pl = pl.row(i);
        let sample_lpl = buffer.row_mut(i);

        // The LAA row holds only ALT indices, so local index `k >= 1` maps
        // to original allele `laa[k - 1]`, and 0 (REF) maps to 0.
        sample_lpl[0] = sample_pl[0];
        for b in 1..=l {
            let orig_b = sample_laa[b - 1] as usize;
            sample_lpl[gt_index(0, b)] = sample_pl[gt_index(0, orig_b)];

            for a in 1..=b {
                let orig_a = sample_laa[a - 1] as usize;
                sample_lpl[gt_index(a, b)] = sample_pl[gt_index(orig_a, orig_b)];
            }
        }
    }

    if !keep_globals {
        *scratch = std::mem::take(pl);
    }

    buffer
}

/// Reclaims the LAA buffer from a record that has been written out.
pub fn salvage_cache(record: &mut Record, cache: &mut LocaliseCache) {
    // LPL and LAD were built from the scratch slots and the retired PL/AD
    // buffers already moved back, so only LAA needs reclaiming.
    if let Some(FormatValue::I32(column)) = record.format_value_mut("LAA") {
        cache.laa = std::mem::take(column);
    }
}
