//! The `allele` subcommand: rare-allele removal, length-based splitting and
//! local-allele projection, composed per record in that order.

pub mod localise;
pub mod remove;
pub mod split;

use std::path::PathBuf;

use anyhow::{Context, Result};
use noodles::vcf::variant::RecordBuf;

use crate::{
    convert,
    error::Error,
    header::{self, FieldNumbers},
    io::{OutputType, VariantSource, create_writer},
    record::Record,
};

use self::localise::LocaliseCache;
use self::remove::{FilterCache, Removal};

/// Configuration for one `allele` invocation.
#[derive(Debug, Clone)]
pub struct AlleleConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub output_type: OutputType,
    /// Remove ALT alleles with `AF < threshold`; 0 disables the stage.
    pub rare_af_threshold: f32,
    /// Length cutoff for splitting; 0 disables the stage.
    pub split_by_length: usize,
    /// Local-allele budget `L`; 0 disables the stage.
    pub local_alleles: usize,
    pub keep_global_fields: bool,
    pub transform_all: bool,
    pub threads: usize,
}

/// Statistics describing one `allele` run.
#[derive(Debug, Default, Clone)]
pub struct AlleleSummary {
    pub records_in: usize,
    pub records_out: usize,
    pub records_dropped: usize,
    pub records_split: usize,
    pub records_localised: usize,
}

pub fn run(config: &AlleleConfig) -> Result<AlleleSummary> {
    tracing::info!(
        input = %config.input.display(),
        output = %config.output.display(),
        rare_af_threshold = config.rare_af_threshold,
        split_by_length = config.split_by_length,
        local_alleles = config.local_alleles,
        "starting allele transformation",
    );

    let mut source = VariantSource::open(&config.input)?;
    let input_header = source
        .read_header()
        .context("failed to read input header")?;

    let mut output_header = input_header.clone();
    if config.local_alleles > 0 {
        header::add_local_definitions(&mut output_header);
    }

    let numbers = FieldNumbers::from_header(&input_header);

    let mut writer = create_writer(&config.output, config.output_type, config.threads)?;
    writer
        .write_variant_header(&output_header)
        .context("failed to write output header")?;

    let mut summary = AlleleSummary::default();
    let mut filter_cache = FilterCache::default();
    let mut localise_cache = LocaliseCache::default();

    let mut buf = RecordBuf::default();
    // Fan-out scratch; at most two records per input.
    let mut pending: Vec<Record> = Vec::with_capacity(2);

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

        let mut record = convert::decode(record_no, &buf)?;

        if config.rare_af_threshold != 0.0 && record.n_alts() > 1 {
            tracing::debug!(record = record_no, "allele-removal begin");
            let outcome = remove::remove_rare_alleles(
                &mut record,
                record_no,
                &numbers,
                config.rare_af_threshold,
                &mut filter_cache,
            )?;
            tracing::debug!(record = record_no, "allele-removal end");

            if outcome == Removal::Dropped {
                summary.records_dropped += 1;
                continue;
            }
        }

        pending.clear();
        if config.split_by_length > 0 && split::needs_splitting(&record, config.split_by_length) {
            tracing::debug!(record = record_no, "splitting-by-length begin");
            let (short, long) = split::split_record(
                record,
                record_no,
                &numbers,
                config.split_by_length,
                &mut filter_cache,
            )?;
            tracing::debug!(record = record_no, "splitting-by-length end");

            pending.push(short);
            pending.push(long);
            summary.records_split += 1;
        } else {
            pending.push(record);
        }

        for mut record in pending.drain(..) {
            let mut localised = false;

            if config.local_alleles > 0 {
                if record.n_alts() > config.local_alleles {
                    tracing::debug!(record = record_no, "allele-localisation begin");
                    localise::localise_alleles(
                        &mut record,
                        record_no,
                        numbers.n_samples(),
                        config.local_alleles,
                        config.keep_global_fields,
                        &mut localise_cache,
                    )?;
                    tracing::debug!(record = record_no, "allele-localisation end");
                    localised = true;
                } else if config.transform_all {
                    tracing::debug!(record = record_no, "allele-pseudo-localisation begin");
                    localise::pseudo_localise_alleles(
                        &mut record,
                        record_no,
                        numbers.n_samples(),
                        config.keep_global_fields,
                        &mut localise_cache,
                    )?;
                    tracing::debug!(record = record_no, "allele-pseudo-localisation end");
                    localised = true;
                }
            }

            let encoded = convert::encode(record_no, &record)?;
            writer
                .write_variant(&output_header, &encoded)
                .map_err(|source| Error::Writer {
                    record: record_no,
                    source,
                })?;
            summary.records_out += 1;

            if localised {
                summary.records_localised += 1;
                localise::salvage_cache(&mut record, &mut localise_cache);
            }
        }
    }

    writer.finish().context("failed to finalize output")?;

    tracing::info!(
        records_in = summary.records_in,
        records_out = summary.records_out,
        dropped = summary.records_dropped,
        split = summary.records_split,
        localised = summary.records_localised,
        "allele transformation finished",
    );

    Ok(summary)
}
