//! Length-based record splitting.
//!
//! A record whose ALT set straddles the length cutoff is duplicated: the
//! first copy keeps the alleles with `len <= cutoff`, the second the longer
//! ones. Both copies are compacted through the same filter machinery as
//! rare-allele removal.

use crate::{
    allele::remove::{self, FilterCache},
    error::Result,
    header::FieldNumbers,
    record::Record,
};

/// Which alleles a split copy retains.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Keep {
    Short,
    Long,
}

/// True iff the record is multi-allelic and has ALT alleles on both sides
/// of the cutoff.
pub fn needs_splitting(record: &Record, cutoff: usize) -> bool {
    if record.n_alts() < 2 {
        return false;
    }

    let has_shorter = record.alt.iter().any(|alt| alt.len() <= cutoff);
    let has_longer = record.alt.iter().any(|alt| alt.len() > cutoff);

    has_shorter && has_longer
}

/// Splits the record into a short-allele copy and a long-allele copy, in
/// that order. IDs other than `.` are suffixed `_split1` / `_split2`.
pub fn split_record(
    record: Record,
    record_no: usize,
    numbers: &FieldNumbers,
    cutoff: usize,
    cache: &mut FilterCache,
) -> Result<(Record, Record)> {
    let mut long = record;
    let mut short = long.clone();

    if short.id != "." {
        short.id.push_str("_split1");
        long.id.push_str("_split2");
    }

    strip_alleles(&mut short, record_no, numbers, cutoff, Keep::Short, cache)?;
    strip_alleles(&mut long, record_no, numbers, cutoff, Keep::Long, cache)?;

    Ok((short, long))
}

fn strip_alleles(
    record: &mut Record,
    record_no: usize,
    numbers: &FieldNumbers,
    cutoff: usize,
    keep: Keep,
    cache: &mut FilterCache,
) -> Result<()> {
    let n_alts = record.n_alts();

    cache.r.clear();
    cache.r.resize(n_alts + 1, false);
    for (i, alt) in record.alt.iter().enumerate() {
        let is_short = alt.len() <= cutoff;
        cache.r[i + 1] = match keep {
            Keep::Short => !is_short,
            Keep::Long => is_short,
        };
    }

    cache.derive_a_g(n_alts);

    tracing::debug!(record = record_no, ?keep, filter_a = ?cache.a, filter_r = ?cache.r, filter_g = ?cache.g);

    remove::apply_filters(record, record_no, numbers, cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Number;
    use crate::record::{Column, FormatValue, Record};

    fn numbers() -> FieldNumbers {
        FieldNumbers::from_pairs(
            1,
            &[],
            &[
                ("GT", Number::Count(1)),
                ("AD", Number::R),
                ("PL", Number::G),
            ],
        )
    }

    fn record_with_mixed_lengths() -> Record {
        let mut record = Record {
            chrom: String::from("chr1"),
            pos: 50,
            id: String::from("rs42"),
            ref_bases: String::from("A"),
            alt: ["T", "ATG", "G", "ATGCTG"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Record::default()
        };

        let mut ad = Column::new();
        ad.push_row(0i32..5);
        let mut pl = Column::new();
        pl.push_row(0i32..15);

        record.genotypes.push((
            String::from("GT"),
            FormatValue::Str(vec![String::from("0/1")]),
        ));
        record
            .genotypes
            .push((String::from("AD"), FormatValue::I32(ad)));
        record
            .genotypes
            .push((String::from("PL"), FormatValue::I32(pl)));

        record
    }

    #[test]
    fn predicate_requires_both_sides_of_the_cutoff() {
        let mut record = record_with_mixed_lengths();
        assert!(needs_splitting(&record, 2));

        record.alt = vec![String::from("T"), String::from("G")];
        assert!(!needs_splitting(&record, 2));

        record.alt = vec![String::from("ATG")];
        assert!(!needs_splitting(&record, 2));
    }

    #[test]
    fn split_partitions_alts_by_length() {
        let record = record_with_mixed_lengths();
        let mut cache = FilterCache::default();

        let (short, long) = split_record(record, 0, &numbers(), 2, &mut cache).unwrap();

        assert_eq!(short.alt, vec![String::from("T"), String::from("G")]);
        assert_eq!(long.alt, vec![String::from("ATG"), String::from("ATGCTG")]);
        assert_eq!(short.id, "rs42_split1");
        assert_eq!(long.id, "rs42_split2");

        // Short copy keeps original alleles {0, 1, 3}: AD rows follow the
        // R-filter, PL rows the G-filter.
        match short.format_value("AD").unwrap() {
            FormatValue::I32(column) => assert_eq!(column.row(0), &[0, 1, 3]),
            other => panic!("unexpected AD column: {other:?}"),
        }
        match short.format_value("PL").unwrap() {
            FormatValue::I32(column) => assert_eq!(column.row(0), &[0, 1, 2, 6, 7, 9]),
            other => panic!("unexpected PL column: {other:?}"),
        }

        // Long copy keeps original alleles {0, 2, 4}.
        match long.format_value("AD").unwrap() {
            FormatValue::I32(column) => assert_eq!(column.row(0), &[0, 2, 4]),
            other => panic!("unexpected AD column: {other:?}"),
        }
        match long.format_value("PL").unwrap() {
            FormatValue::I32(column) => assert_eq!(column.row(0), &[0, 3, 5, 10, 12, 14]),
            other => panic!("unexpected PL column: {other:?}"),
        }

        // GT was recomputed from the compacted PL of each copy.
        match short.format_value("GT").unwrap() {
            FormatValue::Str(gts) => assert_eq!(gts[0], "0/0"),
            other => panic!("unexpected GT column: {other:?}"),
        }
    }

    #[test]
    fn missing_id_gets_no_suffix() {
        let mut record = record_with_mixed_lengths();
        record.id = String::from(".");
        let mut cache = FilterCache::default();

        let (short, long) = split_record(record, 0, &numbers(), 2, &mut cache).unwrap();
        assert_eq!(short.id, ".");
        assert_eq!(long.id, ".");
    }
}
