use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    allele::{self, AlleleConfig},
    binalleles::{self, BinallelesConfig},
    io::OutputType,
};

#[derive(Debug, Parser)]
#[command(
    name = "decovar",
    author,
    version,
    about = "deCODE variant tools: reduce the allele complexity of multi-allelic VCF/BCF records",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Remove rare alleles, split records by allele length and/or localise
    /// per-sample alleles.
    Allele(AlleleArgs),
    /// Collapse multi-allelic records into biallelic length bins.
    Binalleles(BinallelesArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Path to input file or '-' for stdin.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Path to output file or '-' for stdout.
    #[arg(short = 'o', long = "output", default_value = "-", value_name = "OUTPUT")]
    output: PathBuf,

    /// Output compressed BCF (b), uncompressed BCF (u), compressed VCF (z),
    /// uncompressed VCF (v); or use automatic (a) detection.
    #[arg(short = 'O', long = "output-type", value_enum, default_value_t = OutputType::Auto)]
    output_type: OutputType,

    /// Maximum number of threads to use.
    #[arg(short = '@', long = "threads", default_value_t = default_threads())]
    threads: usize,

    /// Print diagnostics to stderr.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Debug, Args)]
struct AlleleArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// For multi-allelic records, remove alleles with AF < than threshold.
    /// 0 removes none.
    #[arg(long = "rare-af-thresh", default_value_t = 0.0)]
    rare_af_threshold: f32,

    /// Alleles shorter than this stay in the record; longer ones are moved
    /// into a separate one. 0 disables splitting.
    #[arg(long = "split-by-length", default_value_t = 0)]
    split_by_length: usize,

    /// For multi-allelic records with more than L alleles, transform global
    /// alleles to local alleles. 0 never transforms.
    #[arg(
        short = 'L',
        long = "local-alleles",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(..=127)
    )]
    local_alleles: u8,

    /// Keep the PL and AD fields in addition to LPL and LAD.
    #[arg(long = "keep-global-fields")]
    keep_global_fields: bool,

    /// Also produce LAA (and rename PL/AD) for records that already fit the
    /// budget, so every record carries the same FORMAT fields.
    #[arg(long = "transform-all")]
    transform_all: bool,
}

#[derive(Debug, Args)]
struct BinallelesArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Activate binning by length.
    #[arg(long = "bin-by-length")]
    bin_by_length: bool,

    /// Also emit records whose cut falls between alleles of the same
    /// length.
    #[arg(long = "same-length-splits")]
    same_length_splits: bool,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().clamp(2, 8))
        .unwrap_or(2)
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Allele(args) => {
            init_logging(args.common.verbose);

            if !(0.0..=1.0).contains(&args.rare_af_threshold) {
                anyhow::bail!("--rare-af-thresh must be within [0, 1]");
            }

            let config = AlleleConfig {
                input: args.common.input,
                output: args.common.output,
                output_type: args.common.output_type,
                rare_af_threshold: args.rare_af_threshold,
                split_by_length: args.split_by_length,
                local_alleles: usize::from(args.local_alleles),
                keep_global_fields: args.keep_global_fields,
                transform_all: args.transform_all,
                threads: args.common.threads,
            };

            allele::run(&config)?;
        }
        Command::Binalleles(args) => {
            init_logging(args.common.verbose);

            let config = BinallelesConfig {
                input: args.common.input,
                output: args.common.output,
                output_type: args.common.output_type,
                bin_by_length: args.bin_by_length,
                same_length_splits: args.same_length_splits,
                threads: args.common.threads,
            };

            binalleles::run(&config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let directives = if verbose { "decovar=debug" } else { "decovar=warn" };
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Diagnostics go to stderr; stdout may be carrying the output stream.
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_allele_options() {
        let cli = Cli::parse_from([
            "decovar",
            "allele",
            "in.vcf",
            "-o",
            "out.bcf",
            "-O",
            "b",
            "--rare-af-thresh",
            "0.001",
            "--split-by-length",
            "10",
            "-L",
            "3",
            "--keep-global-fields",
        ]);

        let Command::Allele(args) = cli.command else {
            panic!("expected allele subcommand");
        };
        assert_eq!(args.common.input, PathBuf::from("in.vcf"));
        assert_eq!(args.common.output, PathBuf::from("out.bcf"));
        assert_eq!(args.common.output_type, OutputType::Bcf);
        assert_eq!(args.rare_af_threshold, 0.001);
        assert_eq!(args.split_by_length, 10);
        assert_eq!(args.local_alleles, 3);
        assert!(args.keep_global_fields);
        assert!(!args.transform_all);
    }

    #[test]
    fn parses_binalleles_options() {
        let cli = Cli::parse_from(["decovar", "binalleles", "-", "--bin-by-length"]);

        let Command::Binalleles(args) = cli.command else {
            panic!("expected binalleles subcommand");
        };
        assert_eq!(args.common.input, PathBuf::from("-"));
        assert_eq!(args.common.output, PathBuf::from("-"));
        assert!(args.bin_by_length);
        assert!(!args.same_length_splits);
    }

    #[test]
    fn local_alleles_budget_is_capped() {
        let result = Cli::try_parse_from(["decovar", "allele", "in.vcf", "-L", "200"]);
        assert!(result.is_err());
    }
}
