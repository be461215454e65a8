//! Stream plumbing: transparent input opening, format detection, and the
//! `-O`-letter writer factory.
//!
//! Inputs may be plain VCF text, gzip/bgzf-compressed VCF, or (bgzf) BCF;
//! compression layers are peeled by magic-byte sniffing before the container
//! format is detected. Output compression for the `b`/`z` types runs on a
//! bgzf worker pool sized by `-@`.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    num::NonZeroUsize,
    path::Path,
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use flate2::read::MultiGzDecoder;
use noodles::bcf;
use noodles::bgzf;
use noodles::vcf::{
    self,
    variant::{RecordBuf, io::Write as VariantRecordWrite},
};

/// Container format of the input stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputFormat {
    Vcf,
    Bcf,
}

fn is_stdio(path: &Path, dev: &str) -> bool {
    path == Path::new("-") || path == Path::new(dev)
}

/// Opens a file (or stdin for `-`) and peels off gzip/BGZF layers to expose
/// the underlying raw stream.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let mut reader: Box<dyn BufRead + Send> = if is_stdio(path, "/dev/stdin") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path)
            .with_context(|| format!("failed to open input {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    // Bounded so malformed nested streams cannot loop forever.
    const MAX_DEPTH: usize = 10;

    for _ in 0..MAX_DEPTH {
        let is_gzip = {
            let buf = reader.fill_buf().context("failed to probe input stream")?;
            buf.len() >= 2 && buf[0] == 0x1f && buf[1] == 0x8b
        };

        if !is_gzip {
            break;
        }

        tracing::debug!("detected gzip/BGZF layer");
        // MultiGzDecoder handles BGZF and concatenated gzip members.
        reader = Box::new(BufReader::new(MultiGzDecoder::new(reader)));
    }

    Ok(reader)
}

/// Sniffs the container format from the decompressed stream head.
pub fn detect_format(reader: &mut dyn BufRead) -> io::Result<InputFormat> {
    let buf = reader.fill_buf()?;

    if buf.len() >= 3 && &buf[..3] == b"BCF" {
        Ok(InputFormat::Bcf)
    } else {
        Ok(InputFormat::Vcf)
    }
}

/// A VCF or BCF record source over an already-decompressed stream.
pub enum VariantSource {
    Vcf(vcf::io::Reader<Box<dyn BufRead + Send>>),
    Bcf {
        reader: bcf::io::Reader<Box<dyn BufRead + Send>>,
        record: bcf::Record,
    },
}

impl VariantSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut input = open_input(path)?;

        match detect_format(&mut input).context("failed to detect input format")? {
            InputFormat::Bcf => Ok(Self::Bcf {
                reader: bcf::io::Reader::from(input),
                record: bcf::Record::default(),
            }),
            InputFormat::Vcf => Ok(Self::Vcf(vcf::io::Reader::new(input))),
        }
    }

    pub fn read_header(&mut self) -> io::Result<vcf::Header> {
        match self {
            Self::Vcf(reader) => reader.read_header(),
            Self::Bcf { reader, .. } => reader.read_header(),
        }
    }

    /// Reads the next record into `buf`; returns 0 at end of stream.
    pub fn read_record(&mut self, header: &vcf::Header, buf: &mut RecordBuf) -> io::Result<usize> {
        match self {
            Self::Vcf(reader) => reader.read_record_buf(header, buf),
            Self::Bcf { reader, record } => {
                let n = reader.read_record(record)?;
                if n > 0 {
                    *buf = RecordBuf::try_from_variant_record(header, record)?;
                }
                Ok(n)
            }
        }
    }
}

/// Output selector mirroring the `-O` option letters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputType {
    /// Detect from the output file name; stdout defaults to VCF text.
    #[value(name = "a")]
    Auto,
    /// BGZF-compressed BCF.
    #[value(name = "b")]
    Bcf,
    /// Uncompressed BCF.
    #[value(name = "u")]
    UncompressedBcf,
    /// BGZF-compressed VCF.
    #[value(name = "z")]
    CompressedVcf,
    /// Uncompressed VCF text.
    #[value(name = "v")]
    Vcf,
}

impl OutputType {
    fn resolve(self, path: &Path, to_stdout: bool) -> Self {
        if self != Self::Auto {
            return self;
        }

        if to_stdout {
            return Self::Vcf;
        }

        let name = path.to_string_lossy();
        if name.ends_with(".bcf") {
            Self::Bcf
        } else if name.ends_with(".gz") {
            Self::CompressedVcf
        } else {
            Self::Vcf
        }
    }
}

/// Writer abstraction over the VCF/BCF serializers.
pub trait VariantWrite {
    fn write_variant_header(&mut self, header: &vcf::Header) -> io::Result<()>;
    fn write_variant(&mut self, header: &vcf::Header, record: &RecordBuf) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

impl<W> VariantWrite for vcf::io::Writer<W>
where
    W: io::Write,
{
    fn write_variant_header(&mut self, header: &vcf::Header) -> io::Result<()> {
        self.write_header(header)
    }

    fn write_variant(&mut self, header: &vcf::Header, record: &RecordBuf) -> io::Result<()> {
        VariantRecordWrite::write_variant_record(self, header, record)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.get_mut().flush()
    }
}

impl<W> VariantWrite for bcf::io::Writer<W>
where
    W: io::Write,
{
    fn write_variant_header(&mut self, header: &vcf::Header) -> io::Result<()> {
        self.write_header(header)
    }

    fn write_variant(&mut self, header: &vcf::Header, record: &RecordBuf) -> io::Result<()> {
        VariantRecordWrite::write_variant_record(self, header, record)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.get_mut().flush()
    }
}

/// Builds the writer selected by the `-O` letter; `-@` sizes the BGZF
/// worker pool for the compressed types.
pub fn create_writer(
    path: &Path,
    output_type: OutputType,
    threads: usize,
) -> Result<Box<dyn VariantWrite>> {
    let to_stdout = is_stdio(path, "/dev/stdout");
    let resolved = output_type.resolve(path, to_stdout);

    let raw: Box<dyn Write + Send> = if to_stdout {
        Box::new(io::stdout())
    } else {
        let file = File::create(path)
            .with_context(|| format!("failed to create output {}", path.display()))?;
        Box::new(BufWriter::new(file))
    };

    let workers = NonZeroUsize::new(threads.max(1)).expect("worker count is nonzero");

    let writer: Box<dyn VariantWrite> = match resolved {
        OutputType::Vcf => Box::new(vcf::io::Writer::new(raw)),
        OutputType::CompressedVcf => Box::new(vcf::io::Writer::new(
            bgzf::MultithreadedWriter::with_worker_count(workers, raw),
        )),
        OutputType::UncompressedBcf => Box::new(bcf::io::Writer::from(raw)),
        OutputType::Bcf => Box::new(bcf::io::Writer::from(
            bgzf::MultithreadedWriter::with_worker_count(workers, raw),
        )),
        OutputType::Auto => unreachable!("resolved above"),
    };

    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn detects_bcf_magic() {
        let mut data: &[u8] = b"BCF\x02\x02rest";
        assert_eq!(detect_format(&mut data).unwrap(), InputFormat::Bcf);

        let mut text: &[u8] = b"##fileformat=VCFv4.3\n";
        assert_eq!(detect_format(&mut text).unwrap(), InputFormat::Vcf);
    }

    #[test]
    fn peels_gzip_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.vcf.gz");

        let file = File::create(&path).unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"##fileformat=VCFv4.3\n").unwrap();
        encoder.finish().unwrap();

        let mut reader = open_input(&path).unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "##fileformat=VCFv4.3\n");
    }

    #[test]
    fn auto_resolution_follows_extension() {
        let stdout = Path::new("-");
        assert_eq!(OutputType::Auto.resolve(stdout, true), OutputType::Vcf);

        assert_eq!(
            OutputType::Auto.resolve(Path::new("out.bcf"), false),
            OutputType::Bcf
        );
        assert_eq!(
            OutputType::Auto.resolve(Path::new("out.vcf.gz"), false),
            OutputType::CompressedVcf
        );
        assert_eq!(
            OutputType::Auto.resolve(Path::new("out.vcf"), false),
            OutputType::Vcf
        );
        assert_eq!(
            OutputType::Bcf.resolve(Path::new("out.vcf"), false),
            OutputType::Bcf
        );
    }
}
