//! Conversion between `noodles` record buffers and the core record model.
//!
//! The reader side narrows integer FORMAT columns to the smallest of
//! i8/i16/i32 that holds every value (staying clear of the BCF sentinel
//! ranges), so the per-width dispatch downstream operates on realistic
//! widths. The writer side widens everything back to i32; the serializer
//! picks its own on-disk encoding.

use noodles::core::Position;
use noodles::vcf::variant::{
    RecordBuf,
    record::samples::series::value::genotype::Phasing,
    record_buf::{
        AlternateBases, Ids, Info as InfoBuf,
        info::field::{Value as InfoFieldValue, value::Array as InfoArray},
        samples::{
            Keys, Samples,
            sample::{Value as SampleValue, value::Array as SampleArray, value::Genotype},
        },
    },
};

use crate::{
    error::{Error, Result},
    record::{Column, FormatValue, InfoValue, IntArray, Record},
};

/// Largest magnitudes representable in the narrow widths without touching
/// the BCF reserved sentinel ranges.
const I8_SAFE_MIN: i32 = i8::MIN as i32 + 8;
const I16_SAFE_MIN: i32 = i16::MIN as i32 + 8;

pub fn decode(record_no: usize, buf: &RecordBuf) -> Result<Record> {
    let id = {
        let ids = buf.ids().as_ref();
        if ids.is_empty() {
            String::from(".")
        } else {
            ids.iter().cloned().collect::<Vec<_>>().join(";")
        }
    };

    let mut record = Record {
        chrom: buf.reference_sequence_name().to_string(),
        pos: buf.variant_start().map(usize::from).unwrap_or_default(),
        id,
        ref_bases: buf.reference_bases().to_string(),
        alt: buf.alternate_bases().as_ref().to_vec(),
        qual: buf.quality_score(),
        filters: buf.filters().as_ref().iter().cloned().collect(),
        info: Vec::new(),
        genotypes: Vec::new(),
    };

    for (key, value) in buf.info().as_ref() {
        // A keyed INFO entry with no value ("KEY=.") has no typed
        // representation in the core model and is dropped here.
        let Some(value) = value else { continue };
        record
            .info
            .push((key.clone(), decode_info_value(record_no, key, value)?));
    }

    let samples = buf.samples();

    for (key_index, key) in samples.keys().as_ref().iter().enumerate() {
        let values: Vec<Option<SampleValue>> = samples
            .values()
            .map(|sample| sample.values().get(key_index).cloned().flatten())
            .collect();
        let column = decode_format_column(record_no, key, values.iter())?;
        record.genotypes.push((key.clone(), column));
    }

    Ok(record)
}

fn decode_info_value(record_no: usize, key: &str, value: &InfoFieldValue) -> Result<InfoValue> {
    let decoded = match value {
        InfoFieldValue::Flag => InfoValue::Flag,
        InfoFieldValue::Integer(n) => InfoValue::Integer(*n),
        InfoFieldValue::Float(f) => InfoValue::Float(*f),
        InfoFieldValue::Character(c) => InfoValue::String(c.to_string()),
        InfoFieldValue::String(s) => InfoValue::String(s.clone()),
        InfoFieldValue::Array(InfoArray::Integer(values)) => {
            let dense = dense(record_no, key, values)?;
            InfoValue::IntegerArray(IntArray::I32(dense))
        }
        InfoFieldValue::Array(InfoArray::Float(values)) => {
            InfoValue::FloatArray(dense(record_no, key, values)?)
        }
        InfoFieldValue::Array(InfoArray::Character(values)) => InfoValue::StringArray(
            values
                .iter()
                .map(|c| c.map(String::from).unwrap_or_else(|| String::from(".")))
                .collect(),
        ),
        InfoFieldValue::Array(InfoArray::String(values)) => InfoValue::StringArray(
            values
                .iter()
                .map(|s| s.clone().unwrap_or_else(|| String::from(".")))
                .collect(),
        ),
    };

    Ok(decoded)
}

fn dense<T: Copy>(record_no: usize, key: &str, values: &[Option<T>]) -> Result<Vec<T>> {
    values
        .iter()
        .map(|value| {
            value.ok_or_else(|| {
                Error::reader(
                    record_no,
                    format!("field {key}: '.' placeholders inside arrays are not supported"),
                )
            })
        })
        .collect()
}

fn decode_format_column<'a, I>(record_no: usize, key: &str, values: I) -> Result<FormatValue>
where
    I: Iterator<Item = &'a Option<SampleValue>> + Clone,
{
    if key == "GT" {
        let mut out = Vec::new();
        for value in values {
            let gt = match value {
                None => String::from("."),
                Some(SampleValue::Genotype(genotype)) => genotype_string(genotype),
                Some(SampleValue::String(s)) => s.clone(),
                Some(other) => {
                    return Err(Error::reader(
                        record_no,
                        format!("GT field held an unexpected value: {other:?}"),
                    ));
                }
            };

            if gt.split(['/', '|']).count() > 2 {
                return Err(Error::DiploidOrCardinalityMismatch {
                    record: record_no,
                    field: String::from("GT"),
                });
            }

            out.push(gt);
        }
        return Ok(FormatValue::Str(out));
    }

    // Type is decided by the first present value; all-missing columns fall
    // back to an integer column of empty rows.
    let tag = values.clone().find_map(|value| value.as_ref());

    match tag {
        Some(SampleValue::Float(_)) | Some(SampleValue::Array(SampleArray::Float(_))) => {
            let mut column = Column::new();
            for value in values {
                match value {
                    None => column.push_row([]),
                    Some(SampleValue::Float(f)) => column.push_row([*f]),
                    Some(SampleValue::Array(SampleArray::Float(row))) => {
                        column.push_row(dense(record_no, key, row)?)
                    }
                    Some(other) => {
                        return Err(Error::reader(
                            record_no,
                            format!("field {key}: mixed value types across samples: {other:?}"),
                        ));
                    }
                }
            }
            Ok(FormatValue::F32(column))
        }
        Some(SampleValue::String(_))
        | Some(SampleValue::Character(_))
        | Some(SampleValue::Genotype(_)) => {
            let mut out = Vec::new();
            for value in values {
                out.push(match value {
                    None => String::from("."),
                    Some(SampleValue::String(s)) => s.clone(),
                    Some(SampleValue::Character(c)) => c.to_string(),
                    Some(SampleValue::Genotype(genotype)) => genotype_string(genotype),
                    Some(other) => {
                        return Err(Error::reader(
                            record_no,
                            format!("field {key}: mixed value types across samples: {other:?}"),
                        ));
                    }
                });
            }
            Ok(FormatValue::Str(out))
        }
        _ => {
            let mut column = Column::new();
            for value in values {
                match value {
                    None => column.push_row([]),
                    Some(SampleValue::Integer(n)) => column.push_row([*n]),
                    Some(SampleValue::Array(SampleArray::Integer(row))) => {
                        column.push_row(dense(record_no, key, row)?)
                    }
                    Some(other) => {
                        return Err(Error::reader(
                            record_no,
                            format!("field {key}: mixed value types across samples: {other:?}"),
                        ));
                    }
                }
            }
            Ok(narrow_int_column(column))
        }
    }
}

/// Chooses the narrowest storage width that holds every element.
fn narrow_int_column(column: Column<i32>) -> FormatValue {
    let min = column.data().iter().copied().min().unwrap_or(0);
    let max = column.data().iter().copied().max().unwrap_or(0);

    if min >= I8_SAFE_MIN && max <= i8::MAX as i32 {
        FormatValue::I8(map_column(column, |v| v as i8))
    } else if min >= I16_SAFE_MIN && max <= i16::MAX as i32 {
        FormatValue::I16(map_column(column, |v| v as i16))
    } else {
        FormatValue::I32(column)
    }
}

fn map_column<T, U, F>(column: Column<T>, f: F) -> Column<U>
where
    T: Copy,
    F: Fn(T) -> U,
{
    let delim = column.delim().to_vec();
    let data = column.data().iter().copied().map(f).collect();
    Column::from_parts(data, delim)
}

/// Renders a `noodles` genotype value as a plain GT string ("0/1" style,
/// leading phasing marker stripped).
fn genotype_string(genotype: &Genotype) -> String {
    let mut out = String::new();

    for (i, allele) in genotype.as_ref().iter().enumerate() {
        if i > 0 {
            out.push(match allele.phasing() {
                Phasing::Phased => '|',
                Phasing::Unphased => '/',
            });
        }

        match allele.position() {
            Some(position) => out.push_str(&position.to_string()),
            None => out.push('.'),
        }
    }

    out
}

pub fn encode(record_no: usize, record: &Record) -> Result<RecordBuf> {
    let position = Position::try_from(record.pos).map_err(|e| Error::Writer {
        record: record_no,
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;

    let mut builder = RecordBuf::builder()
        .set_reference_sequence_name(record.chrom.clone())
        .set_variant_start(position)
        .set_reference_bases(record.ref_bases.clone())
        .set_alternate_bases(AlternateBases::from(record.alt.clone()));

    if record.id != "." {
        let ids = record
            .id
            .split(';')
            .map(String::from)
            .collect::<Ids>();
        builder = builder.set_ids(ids);
    }

    if let Some(qual) = record.qual {
        builder = builder.set_quality_score(qual);
    }

    if !record.filters.is_empty() {
        builder = builder.set_filters(record.filters.iter().cloned().collect());
    }

    if !record.info.is_empty() {
        let mut info = InfoBuf::default();
        for (key, value) in &record.info {
            info.insert(key.clone(), Some(encode_info_value(value)));
        }
        builder = builder.set_info(info);
    }

    if !record.genotypes.is_empty() {
        builder = builder.set_samples(encode_samples(record_no, record)?);
    }

    Ok(builder.build())
}

fn encode_info_value(value: &InfoValue) -> InfoFieldValue {
    match value {
        InfoValue::Flag => InfoFieldValue::Flag,
        InfoValue::Integer(n) => InfoFieldValue::Integer(*n),
        InfoValue::Float(f) => InfoFieldValue::Float(*f),
        InfoValue::String(s) => InfoFieldValue::String(s.clone()),
        InfoValue::IntegerArray(values) => {
            let widened: Vec<Option<i32>> = match values {
                IntArray::I8(v) => v.iter().map(|&n| Some(i32::from(n))).collect(),
                IntArray::I16(v) => v.iter().map(|&n| Some(i32::from(n))).collect(),
                IntArray::I32(v) => v.iter().map(|&n| Some(n)).collect(),
            };
            InfoFieldValue::Array(InfoArray::Integer(widened))
        }
        InfoValue::FloatArray(values) => {
            InfoFieldValue::Array(InfoArray::Float(values.iter().map(|&f| Some(f)).collect()))
        }
        InfoValue::StringArray(values) => InfoFieldValue::Array(InfoArray::String(
            values.iter().map(|s| Some(s.clone())).collect(),
        )),
    }
}

fn encode_samples(record_no: usize, record: &Record) -> Result<Samples> {
    let n_samples = record
        .genotypes
        .first()
        .map(|(_, column)| match column {
            FormatValue::I8(c) => c.len(),
            FormatValue::I16(c) => c.len(),
            FormatValue::I32(c) => c.len(),
            FormatValue::F32(c) => c.len(),
            FormatValue::Str(v) => v.len(),
        })
        .unwrap_or_default();

    let keys: Keys = record
        .genotypes
        .iter()
        .map(|(key, _)| key.clone())
        .collect();

    let mut values = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let mut sample = Vec::with_capacity(record.genotypes.len());

        for (key, column) in &record.genotypes {
            let value = match column {
                FormatValue::I8(c) => encode_int_row(c.row(i).iter().map(|&v| i32::from(v))),
                FormatValue::I16(c) => encode_int_row(c.row(i).iter().map(|&v| i32::from(v))),
                FormatValue::I32(c) => encode_int_row(c.row(i).iter().copied()),
                FormatValue::F32(c) => {
                    let row = c.row(i);
                    match row.len() {
                        0 => None,
                        1 => Some(SampleValue::Float(row[0])),
                        _ => Some(SampleValue::Array(SampleArray::Float(
                            row.iter().map(|&f| Some(f)).collect(),
                        ))),
                    }
                }
                FormatValue::Str(strings) => {
                    let s = &strings[i];
                    if s == "." {
                        None
                    } else if key == "GT" {
                        let genotype =
                            s.parse::<Genotype>().map_err(|e| Error::Writer {
                                record: record_no,
                                source: std::io::Error::new(
                                    std::io::ErrorKind::InvalidData,
                                    format!("invalid genotype string {s}: {e}"),
                                ),
                            })?;
                        Some(SampleValue::from(genotype))
                    } else {
                        Some(SampleValue::String(s.clone()))
                    }
                }
            };

            sample.push(value);
        }

        values.push(sample);
    }

    Ok(Samples::new(keys, values))
}

fn encode_int_row<I>(row: I) -> Option<SampleValue>
where
    I: ExactSizeIterator<Item = i32>,
{
    match row.len() {
        0 => None,
        1 => {
            let mut row = row;
            Some(SampleValue::Integer(row.next().unwrap()))
        }
        _ => Some(SampleValue::Array(SampleArray::Integer(
            row.map(Some).collect(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::vcf::variant::record_buf::samples::sample::Value;

    fn sample_record() -> RecordBuf {
        let keys: Keys = [String::from("GT"), String::from("AD"), String::from("PL")]
            .into_iter()
            .collect();

        let values = vec![vec![
            Some(Value::String(String::from("0/1"))),
            Some(Value::Array(SampleArray::Integer(vec![
                Some(10),
                Some(3),
            ]))),
            Some(Value::Array(SampleArray::Integer(vec![
                Some(40),
                Some(0),
                Some(50),
            ]))),
        ]];

        RecordBuf::builder()
            .set_reference_sequence_name("chr1")
            .set_variant_start(Position::try_from(100).unwrap())
            .set_reference_bases("A")
            .set_alternate_bases(AlternateBases::from(vec![String::from("T")]))
            .set_samples(Samples::new(keys, values))
            .build()
    }

    #[test]
    fn decode_builds_concatenated_columns() {
        let record = decode(0, &sample_record()).unwrap();

        assert_eq!(record.chrom, "chr1");
        assert_eq!(record.pos, 100);
        assert_eq!(record.id, ".");
        assert_eq!(record.alt, vec![String::from("T")]);

        match record.format_value("GT").unwrap() {
            FormatValue::Str(gts) => assert_eq!(gts, &vec![String::from("0/1")]),
            other => panic!("unexpected GT column: {other:?}"),
        }

        match record.format_value("AD").unwrap() {
            FormatValue::I8(column) => {
                assert_eq!(column.len(), 1);
                assert_eq!(column.row(0), &[10, 3]);
            }
            other => panic!("unexpected AD column: {other:?}"),
        }
    }

    #[test]
    fn narrowing_picks_smallest_safe_width() {
        let mut small = Column::new();
        small.push_row([0, 99]);
        assert!(matches!(narrow_int_column(small), FormatValue::I8(_)));

        let mut medium = Column::new();
        medium.push_row([0, 1000]);
        assert!(matches!(narrow_int_column(medium), FormatValue::I16(_)));

        let mut large = Column::new();
        large.push_row([0, 100_000]);
        assert!(matches!(narrow_int_column(large), FormatValue::I32(_)));
    }

    #[test]
    fn triploid_genotypes_are_rejected() {
        let keys: Keys = [String::from("GT")].into_iter().collect();
        let values = vec![vec![Some(Value::String(String::from("0/1/2")))]];

        let buf = RecordBuf::builder()
            .set_reference_sequence_name("chr1")
            .set_variant_start(Position::try_from(5).unwrap())
            .set_reference_bases("A")
            .set_samples(Samples::new(keys, values))
            .build();

        assert!(matches!(
            decode(7, &buf),
            Err(Error::DiploidOrCardinalityMismatch { record: 7, .. })
        ));
    }

    #[test]
    fn encode_round_trips_decode() {
        let original = sample_record();
        let record = decode(0, &original).unwrap();
        let encoded = encode(0, &record).unwrap();

        assert_eq!(encoded.reference_sequence_name(), "chr1");
        assert_eq!(encoded.variant_start().map(usize::from), Some(100));

        let decoded_again = decode(0, &encoded).unwrap();
        assert_eq!(record, decoded_again);
    }
}
