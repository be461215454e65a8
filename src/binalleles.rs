//! The `binalleles` subcommand: collapse every n-allelic record into up to
//! n−1 biallelic records whose pseudo-REF and pseudo-ALT each pool the
//! original alleles on one side of a length cut point.
//!
//! For each cut, the three output PL values are the minima of the input PL
//! over the genotype pairs drawn from REFBIN×REFBIN, REFBIN×ALTBIN and
//! ALTBIN×ALTBIN, and GT is the argmin of the three.

use std::path::PathBuf;

use anyhow::{Context, Result};
use noodles::vcf::variant::RecordBuf;

use crate::{
    convert,
    error::{self, Error},
    header,
    io::{OutputType, VariantSource, create_writer},
    record::{Column, FormatValue, InfoValue, IntArray, Record, genotype_count, gt_index},
};

/// Configuration for one `binalleles` invocation.
#[derive(Debug, Clone)]
pub struct BinallelesConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub output_type: OutputType,
    pub bin_by_length: bool,
    /// Also emit cuts that fall between alleles of equal length.
    pub same_length_splits: bool,
    pub threads: usize,
}

/// Statistics describing one `binalleles` run.
#[derive(Debug, Default, Clone)]
pub struct BinallelesSummary {
    pub records_in: usize,
    pub records_out: usize,
}

/// Pipeline-owned scratch for the binning stage, reused across records.
#[derive(Debug, Default)]
struct Binner {
    same_length_splits: bool,
    n_samples: usize,
    /// `(length, original index)` per allele, index 0 for REF.
    lengths: Vec<(usize, usize)>,
    refbin: Vec<i16>,
    altbin: Vec<i16>,
}

impl Binner {
    /// Emits the binned records for one input record into `out`. Records
    /// that are not multi-allelic or carry no PL pass through unchanged.
    fn transform(
        &mut self,
        record: Record,
        record_no: usize,
        out: &mut Vec<Record>,
    ) -> error::Result<()> {
        let n_alts = record.n_alts();
        let n_alleles = n_alts + 1;

        if n_alts <= 1 || !record.has_format("PL") {
            out.push(record);
            return Ok(());
        }

        self.lengths.clear();
        self.lengths.push((record.ref_bases.len(), 0));
        self.lengths
            .extend(record.alt.iter().enumerate().map(|(i, alt)| (alt.len(), i + 1)));
        self.lengths.sort_unstable();

        for i in 0..n_alleles - 1 {
            let refbin_max = self.lengths[i].0;
            let altbin_min = self.lengths[i + 1].0;

            // A length must not be present in both groups.
            if refbin_max == altbin_min && !self.same_length_splits {
                continue;
            }

            self.refbin.clear();
            self.refbin
                .extend(self.lengths[..=i].iter().map(|&(_, index)| index as i16));
            self.altbin.clear();
            self.altbin
                .extend(self.lengths[i + 1..].iter().map(|&(_, index)| index as i16));

            let id = if record.id != "." {
                format!("{}_div_{}", record.id, i)
            } else {
                String::from(".")
            };

            let (gts, pls) = match record.format_value("PL").expect("PL presence checked") {
                FormatValue::I8(column) => self.bin_pls(column, n_alts, record_no)?,
                FormatValue::I16(column) => self.bin_pls(column, n_alts, record_no)?,
                FormatValue::I32(column) => self.bin_pls(column, n_alts, record_no)?,
                _ => return Err(Error::PlTypeMismatch { record: record_no }),
            };

            out.push(Record {
                chrom: record.chrom.clone(),
                pos: record.pos,
                id,
                ref_bases: String::from("."),
                alt: vec![String::from("."), String::from(".")],
                qual: None,
                filters: Vec::new(),
                info: vec![
                    (
                        String::from("REFBIN_MAXLEN"),
                        InfoValue::Integer(refbin_max as i32),
                    ),
                    (
                        String::from("ALTBIN_MINLEN"),
                        InfoValue::Integer(altbin_min as i32),
                    ),
                    (
                        String::from("REFBIN_INDEXES"),
                        InfoValue::IntegerArray(IntArray::I16(self.refbin.clone())),
                    ),
                    (
                        String::from("ALTBIN_INDEXES"),
                        InfoValue::IntegerArray(IntArray::I16(self.altbin.clone())),
                    ),
                ],
                genotypes: vec![
                    (String::from("GT"), FormatValue::Str(gts)),
                    (String::from("PL"), pls),
                ],
            });
        }

        Ok(())
    }

    /// Computes the three-entry PL row and the matching GT call for every
    /// sample under the current REFBIN/ALTBIN partition.
    fn bin_pls<T>(
        &self,
        in_pls: &Column<T>,
        n_alts: usize,
        record_no: usize,
    ) -> error::Result<(Vec<String>, FormatValue)>
    where
        T: Copy + Ord + Into<i32>,
    {
        if in_pls.flat_len() != self.n_samples * genotype_count(n_alts) {
            return Err(Error::DiploidOrCardinalityMismatch {
                record: record_no,
                field: String::from("PL"),
            });
        }

        let mut gts = Vec::with_capacity(self.n_samples);
        let mut out_pls: Column<i32> = Column::new();
        out_pls.reserve(self.n_samples + 1, self.n_samples * 3);

        for j in 0..self.n_samples {
            let in_pl = in_pls.row(j);

            let out_pl = [
                min_over_pairs(in_pl, &self.refbin, &self.refbin),
                min_over_pairs(in_pl, &self.refbin, &self.altbin),
                min_over_pairs(in_pl, &self.altbin, &self.altbin),
            ];

            let mut argmin = 0;
            for (k, value) in out_pl.iter().enumerate() {
                if *value < out_pl[argmin] {
                    argmin = k;
                }
            }

            gts.push(String::from(match argmin {
                0 => "0/0",
                1 => "0/1",
                _ => "1/1",
            }));

            out_pls.push_row(out_pl);
        }

        Ok((gts, FormatValue::I32(out_pls)))
    }
}

/// Minimum input PL over all unordered genotype pairs with one allele drawn
/// from each bin.
fn min_over_pairs<T>(pl: &[T], xs: &[i16], ys: &[i16]) -> i32
where
    T: Copy + Ord + Into<i32>,
{
    let mut best: Option<T> = None;

    for &b in ys {
        for &a in xs {
            let (a, b) = (a.min(b) as usize, a.max(b) as usize);
            let value = pl[gt_index(a, b)];
            if best.is_none_or(|m| value < m) {
                best = Some(value);
            }
        }
    }

    best.expect("bins are never empty").into()
}

pub fn run(config: &BinallelesConfig) -> Result<BinallelesSummary> {
    tracing::info!(
        input = %config.input.display(),
        output = %config.output.display(),
        bin_by_length = config.bin_by_length,
        same_length_splits = config.same_length_splits,
        "starting allele binning",
    );

    let mut source = VariantSource::open(&config.input)?;
    let input_header = source
        .read_header()
        .context("failed to read input header")?;

    let n_samples = input_header.sample_names().len();
    if n_samples == 0 {
        return Err(Error::NoSamples.into());
    }

    let output_header = if config.bin_by_length {
        header::binalleles_header(&input_header)
    } else {
        input_header.clone()
    };

    let mut writer = create_writer(&config.output, config.output_type, config.threads)?;
    writer
        .write_variant_header(&output_header)
        .context("failed to write output header")?;

    let mut summary = BinallelesSummary::default();
    let mut binner = Binner {
        same_length_splits: config.same_length_splits,
        n_samples,
        ..Binner::default()
    };

    let mut buf = RecordBuf::default();
    let mut pending: Vec<Record> = Vec::new();

    loop {
        let record_no = summary.records_in;

        let n = source
            .read_record(&input_header, &mut buf)
            .map_err(|source| Error::Reader {
                record: record_no,
                source,
            })?;
        if n == 0 {
            break;
        }
        summary.records_in += 1;

        let record = convert::decode(record_no, &buf)?;

        pending.clear();
        if config.bin_by_length {
            tracing::debug!(record = record_no, "binning begin");
            binner.transform(record, record_no, &mut pending)?;
            tracing::debug!(record = record_no, "binning end");
        } else {
            pending.push(record);
        }

        for record in pending.drain(..) {
            let encoded = convert::encode(record_no, &record)?;
            writer
                .write_variant(&output_header, &encoded)
                .map_err(|source| Error::Writer {
                    record: record_no,
                    source,
                })?;
            summary.records_out += 1;
        }
    }

    writer.finish().context("failed to finalize output")?;

    tracing::info!(
        records_in = summary.records_in,
        records_out = summary.records_out,
        "allele binning finished",
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binner(n_samples: usize, same_length_splits: bool) -> Binner {
        Binner {
            same_length_splits,
            n_samples,
            ..Binner::default()
        }
    }

    fn record_with_lengths() -> Record {
        let mut record = Record {
            chrom: String::from("chr1"),
            pos: 30,
            id: String::from("site1"),
            ref_bases: String::from("A"),
            alt: ["T", "G", "ATG"].iter().map(|s| s.to_string()).collect(),
            ..Record::default()
        };

        // One sample; PL over 3 ALTs has g(3,3)+1 = 10 entries. Genotype
        // (0,3) is the certain one.
        let mut pl_values = vec![50i32; genotype_count(3)];
        pl_values[gt_index(0, 3)] = 0;

        let mut pl = Column::new();
        pl.push_row(pl_values);

        record.genotypes.push((
            String::from("GT"),
            FormatValue::Str(vec![String::from("0/3")]),
        ));
        record
            .genotypes
            .push((String::from("PL"), FormatValue::I32(pl)));

        record
    }

    fn info_int(record: &Record, key: &str) -> i32 {
        match record.info_value(key) {
            Some(InfoValue::Integer(n)) => *n,
            other => panic!("unexpected {key}: {other:?}"),
        }
    }

    fn info_indexes(record: &Record, key: &str) -> Vec<i16> {
        match record.info_value(key) {
            Some(InfoValue::IntegerArray(IntArray::I16(v))) => v.clone(),
            other => panic!("unexpected {key}: {other:?}"),
        }
    }

    #[test]
    fn bins_along_length_cut_points() {
        let mut out = Vec::new();
        binner(1, false)
            .transform(record_with_lengths(), 0, &mut out)
            .unwrap();

        // Cuts at i=0 and i=1 fall between equal lengths (1,1,1) and are
        // skipped; only the i=2 cut between length 1 and length 3 remains.
        assert_eq!(out.len(), 1);
        let bin = &out[0];

        assert_eq!(bin.id, "site1_div_2");
        assert_eq!(bin.ref_bases, ".");
        assert_eq!(bin.alt, vec![String::from("."), String::from(".")]);
        assert_eq!(info_int(bin, "REFBIN_MAXLEN"), 1);
        assert_eq!(info_int(bin, "ALTBIN_MINLEN"), 3);
        assert_eq!(info_indexes(bin, "REFBIN_INDEXES"), vec![0, 1, 2]);
        assert_eq!(info_indexes(bin, "ALTBIN_INDEXES"), vec![3]);

        // REFBIN pairs all have PL 50; the cross pair (0,3) has PL 0; the
        // within-ALTBIN pair (3,3) has PL 50.
        match bin.format_value("PL").unwrap() {
            FormatValue::I32(column) => assert_eq!(column.row(0), &[50, 0, 50]),
            other => panic!("unexpected PL column: {other:?}"),
        }
        match bin.format_value("GT").unwrap() {
            FormatValue::Str(gts) => assert_eq!(gts[0], "0/1"),
            other => panic!("unexpected GT column: {other:?}"),
        }
    }

    #[test]
    fn same_length_splits_emits_every_cut() {
        let mut out = Vec::new();
        binner(1, true)
            .transform(record_with_lengths(), 0, &mut out)
            .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].id, "site1_div_0");
        assert_eq!(info_indexes(&out[0], "REFBIN_INDEXES"), vec![0]);
        assert_eq!(info_indexes(&out[0], "ALTBIN_INDEXES"), vec![1, 2, 3]);
        assert_eq!(out[2].id, "site1_div_2");
    }

    #[test]
    fn biallelic_records_pass_through() {
        let mut record = record_with_lengths();
        record.alt = vec![String::from("T")];
        let snapshot = record.clone();

        let mut out = Vec::new();
        binner(1, false).transform(record, 0, &mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0], snapshot);
    }

    #[test]
    fn records_without_pl_pass_through() {
        let mut record = record_with_lengths();
        record.genotypes.retain(|(id, _)| id != "PL");
        let snapshot = record.clone();

        let mut out = Vec::new();
        binner(1, false).transform(record, 0, &mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0], snapshot);
    }

    #[test]
    fn wrong_pl_cardinality_is_rejected() {
        let mut record = record_with_lengths();
        if let Some(FormatValue::I32(column)) = record.format_value_mut("PL") {
            column.data_mut().pop();
        }

        let mut out = Vec::new();
        let result = binner(1, false).transform(record, 2, &mut out);
        assert!(matches!(
            result,
            Err(Error::DiploidOrCardinalityMismatch { record: 2, .. })
        ));
    }
}
