//! Header-derived views and header rewriting.
//!
//! The pipeline needs two things from the VCF header: the declared `Number`
//! of every INFO/FORMAT field (to know which arrays are allele-indexed) and
//! the sample count. Both are captured once per run in [`FieldNumbers`] so
//! record transforms never touch the `noodles` header types directly.

use std::collections::HashMap;

use noodles::vcf::{
    self,
    header::record::value::{
        Map,
        map::{Format, Info, format, info},
    },
    variant::record::samples::keys::key as format_key,
};

/// Declared cardinality of an INFO or FORMAT field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Number {
    Count(usize),
    /// One value per ALT allele.
    A,
    /// One value per allele, REF included.
    R,
    /// One value per diploid genotype.
    G,
    /// Unknown / variable (`.`).
    Dot,
}

impl Number {
    /// Expected element count for a record with `n_alts` ALT alleles, if
    /// the declared number pins one down.
    pub fn expected_len(self, n_alts: usize) -> Option<usize> {
        match self {
            Self::Count(n) => Some(n),
            Self::A => Some(n_alts),
            Self::R => Some(n_alts + 1),
            Self::G => Some(crate::record::genotype_count(n_alts)),
            Self::Dot => None,
        }
    }
}

fn from_info_number(number: info::Number) -> Number {
    match number {
        info::Number::Count(n) => Number::Count(n),
        info::Number::AlternateBases => Number::A,
        info::Number::ReferenceAlternateBases => Number::R,
        _ => Number::Dot,
    }
}

fn from_format_number(number: format::Number) -> Number {
    match number {
        format::Number::Count(n) => Number::Count(n),
        format::Number::AlternateBases => Number::A,
        format::Number::ReferenceAlternateBases => Number::R,
        format::Number::Samples => Number::G,
        _ => Number::Dot,
    }
}

/// Declared-number lookup plus the sample count, derived once per run.
#[derive(Clone, Debug, Default)]
pub struct FieldNumbers {
    infos: HashMap<String, Number>,
    formats: HashMap<String, Number>,
    n_samples: usize,
}

impl FieldNumbers {
    pub fn from_header(header: &vcf::Header) -> Self {
        let infos = header
            .infos()
            .iter()
            .map(|(id, map)| (id.clone(), from_info_number(map.number())))
            .collect();

        let formats = header
            .formats()
            .iter()
            .map(|(id, map)| (id.clone(), from_format_number(map.number())))
            .collect();

        Self {
            infos,
            formats,
            n_samples: header.sample_names().len(),
        }
    }

    /// Declared number of an INFO field; undeclared fields count as `.`.
    pub fn info(&self, id: &str) -> Number {
        self.infos.get(id).copied().unwrap_or(Number::Dot)
    }

    /// Declared number of a FORMAT field; undeclared fields count as `.`.
    pub fn format(&self, id: &str) -> Number {
        self.formats.get(id).copied().unwrap_or(Number::Dot)
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(
        n_samples: usize,
        infos: &[(&str, Number)],
        formats: &[(&str, Number)],
    ) -> Self {
        Self {
            infos: infos
                .iter()
                .map(|&(id, number)| (id.to_string(), number))
                .collect(),
            formats: formats
                .iter()
                .map(|&(id, number)| (id.to_string(), number))
                .collect(),
            n_samples,
        }
    }
}

/// Adds the local-allele FORMAT definitions used by the projector: LAA is
/// always declared; LAD/LPL only when the input declares AD/PL.
pub fn add_local_definitions(header: &mut vcf::Header) {
    let formats = header.formats_mut();

    if !formats.contains_key("LAA") {
        formats.insert(
            String::from("LAA"),
            Map::<Format>::new(
                format::Number::Unknown,
                format::Type::Integer,
                "1-based indices into ALT of the alleles that are locally relevant for each sample",
            ),
        );
    }

    if formats.contains_key("AD") && !formats.contains_key("LAD") {
        formats.insert(
            String::from("LAD"),
            Map::<Format>::new(
                format::Number::Unknown,
                format::Type::Integer,
                "Local-allele representation of the per-allele read depths",
            ),
        );
    }

    if formats.contains_key("PL") && !formats.contains_key("LPL") {
        formats.insert(
            String::from("LPL"),
            Map::<Format>::new(
                format::Number::Unknown,
                format::Type::Integer,
                "Local-allele representation of the Phred-scaled genotype likelihoods",
            ),
        );
    }
}

/// Builds the output header for the binning subcommand: all input INFO
/// definitions are replaced by the four bin descriptors, and FORMAT is
/// reduced to GT and PL.
pub fn binalleles_header(input: &vcf::Header) -> vcf::Header {
    let mut header = input.clone();

    let infos = header.infos_mut();
    infos.clear();
    infos.insert(
        String::from("REFBIN_INDEXES"),
        Map::<Info>::new(
            info::Number::Unknown,
            info::Type::Integer,
            "Indexes of original alleles binned as the reference",
        ),
    );
    infos.insert(
        String::from("REFBIN_MAXLEN"),
        Map::<Info>::new(
            info::Number::Count(1),
            info::Type::Integer,
            "Maximum allele length in REFBIN",
        ),
    );
    infos.insert(
        String::from("ALTBIN_INDEXES"),
        Map::<Info>::new(
            info::Number::Unknown,
            info::Type::Integer,
            "Indexes of original alleles binned as the ALT",
        ),
    );
    infos.insert(
        String::from("ALTBIN_MINLEN"),
        Map::<Info>::new(
            info::Number::Count(1),
            info::Type::Integer,
            "Minimum allele length in ALTBIN",
        ),
    );

    let formats = header.formats_mut();
    formats.clear();
    formats.insert(
        String::from(format_key::GENOTYPE),
        Map::<Format>::from(format_key::GENOTYPE),
    );
    formats.insert(
        String::from("PL"),
        Map::<Format>::new(
            format::Number::Samples,
            format::Type::Integer,
            "Phred-scaled genotype likelihoods rounded to the closest integer",
        ),
    );

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_header() -> vcf::Header {
        let mut builder = vcf::Header::builder();
        builder = builder.add_format(format_key::GENOTYPE, Map::<Format>::from(format_key::GENOTYPE));
        builder = builder.add_format(
            "AD",
            Map::<Format>::new(
                format::Number::ReferenceAlternateBases,
                format::Type::Integer,
                "Read depth for each allele",
            ),
        );
        builder = builder.add_format(
            "PL",
            Map::<Format>::new(
                format::Number::Samples,
                format::Type::Integer,
                "Phred-scaled genotype likelihoods",
            ),
        );
        builder = builder.add_info(
            "AF",
            Map::<Info>::new(
                info::Number::AlternateBases,
                info::Type::Float,
                "Allele frequency",
            ),
        );
        builder
            .add_sample_name("sampleA")
            .add_sample_name("sampleB")
            .build()
    }

    #[test]
    fn numbers_from_header() {
        let numbers = FieldNumbers::from_header(&test_header());
        assert_eq!(numbers.info("AF"), Number::A);
        assert_eq!(numbers.format("AD"), Number::R);
        assert_eq!(numbers.format("PL"), Number::G);
        assert_eq!(numbers.format("GT"), Number::Count(1));
        assert_eq!(numbers.format("XX"), Number::Dot);
        assert_eq!(numbers.n_samples(), 2);
    }

    #[test]
    fn expected_lengths() {
        assert_eq!(Number::A.expected_len(3), Some(3));
        assert_eq!(Number::R.expected_len(3), Some(4));
        assert_eq!(Number::G.expected_len(3), Some(10));
        assert_eq!(Number::Dot.expected_len(3), None);
    }

    #[test]
    fn local_definitions_follow_input_fields() {
        let mut header = test_header();
        add_local_definitions(&mut header);
        assert!(header.formats().contains_key("LAA"));
        assert!(header.formats().contains_key("LAD"));
        assert!(header.formats().contains_key("LPL"));

        let mut bare = vcf::Header::builder().build();
        add_local_definitions(&mut bare);
        assert!(bare.formats().contains_key("LAA"));
        assert!(!bare.formats().contains_key("LAD"));
        assert!(!bare.formats().contains_key("LPL"));
    }

    #[test]
    fn binalleles_header_replaces_definitions() {
        let header = binalleles_header(&test_header());
        assert!(header.infos().contains_key("REFBIN_INDEXES"));
        assert!(header.infos().contains_key("ALTBIN_MINLEN"));
        assert!(!header.infos().contains_key("AF"));
        assert_eq!(header.formats().len(), 2);
        assert!(header.formats().contains_key("GT"));
        assert!(header.formats().contains_key("PL"));
        assert_eq!(header.sample_names().len(), 2);
    }
}
