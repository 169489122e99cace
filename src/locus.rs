//! Genomic locus and variant key types
//!
//! Coordinates are 1-indexed, matching VCF positions. Pseudo-autosomal region boundaries are fixed to
//! the GRCh38 assembly.
//!

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

/// GRCh38 chrX pseudo-autosomal regions, as closed 1-indexed intervals
const X_PAR_REGIONS: [(i64, i64); 2] = [(10_001, 2_781_479), (155_701_383, 156_030_895)];

/// GRCh38 chrY pseudo-autosomal regions, as closed 1-indexed intervals
const Y_PAR_REGIONS: [(i64, i64); 2] = [(10_001, 2_781_479), (56_887_903, 57_217_415)];

fn in_regions(regions: &[(i64, i64)], pos: i64) -> bool {
    regions
        .iter()
        .any(|(start, end)| pos >= *start && pos <= *end)
}

/// True if the zero-indexed half-open range `[start, end)` on `contig` overlaps a pseudo-autosomal
/// region
///
pub fn range_overlaps_par(contig: &str, start: i64, end: i64) -> bool {
    let regions = match contig.strip_prefix("chr").unwrap_or(contig) {
        "X" => &X_PAR_REGIONS,
        "Y" => &Y_PAR_REGIONS,
        _ => return false,
    };
    regions
        .iter()
        .any(|(par_start, par_end)| start < *par_end && end > *par_start - 1)
}

/// Sort rank of a contig name, 1-22 first, then X, Y, M, then anything else
///
fn contig_rank(contig: &str) -> u32 {
    let label = contig.strip_prefix("chr").unwrap_or(contig);
    match label {
        "X" => 23,
        "Y" => 24,
        "M" | "MT" => 25,
        _ => match label.parse::<u32>() {
            Ok(x) if (1..=22).contains(&x) => x,
            _ => 26,
        },
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Locus {
    pub contig: String,

    /// 1-indexed position
    pub position: i64,
}

impl Locus {
    pub fn new(contig: &str, position: i64) -> Self {
        Self {
            contig: contig.to_string(),
            position,
        }
    }

    /// Parse locus from a 'chrom:pos' string
    ///
    pub fn parse(s: &str) -> SimpleResult<Self> {
        let Some((contig, pos)) = s.rsplit_once(':') else {
            bail!("Can't parse locus string '{s}', expected format 'contig:position'");
        };
        let position = match pos.parse::<i64>() {
            Ok(x) if x > 0 => x,
            _ => bail!("Can't parse position in locus string '{s}'"),
        };
        if contig.is_empty() {
            bail!("Empty contig name in locus string '{s}'");
        }
        Ok(Self::new(contig, position))
    }

    fn contig_label(&self) -> &str {
        self.contig.strip_prefix("chr").unwrap_or(&self.contig)
    }

    pub fn in_autosome(&self) -> bool {
        contig_rank(&self.contig) <= 22
    }

    pub fn in_x(&self) -> bool {
        self.contig_label() == "X"
    }

    pub fn in_y(&self) -> bool {
        self.contig_label() == "Y"
    }

    pub fn in_x_par(&self) -> bool {
        self.in_x() && in_regions(&X_PAR_REGIONS, self.position)
    }

    pub fn in_y_par(&self) -> bool {
        self.in_y() && in_regions(&Y_PAR_REGIONS, self.position)
    }

    pub fn in_x_nonpar(&self) -> bool {
        self.in_x() && !self.in_x_par()
    }

    pub fn in_y_nonpar(&self) -> bool {
        self.in_y() && !self.in_y_par()
    }
}

impl Ord for Locus {
    fn cmp(&self, other: &Self) -> Ordering {
        contig_rank(&self.contig)
            .cmp(&contig_rank(&other.contig))
            .then_with(|| self.contig.cmp(&other.contig))
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Locus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.contig, self.position)
    }
}

/// A biallelic or multiallelic variant identified by locus and alleles, reference allele first
///
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct VariantKey {
    pub locus: Locus,
    pub alleles: Vec<String>,
}

impl VariantKey {
    pub fn new(locus: Locus, alleles: Vec<String>) -> Self {
        Self { locus, alleles }
    }

    /// Parse a variant key from the locus string and comma-separated allele list used in tabular inputs
    ///
    pub fn parse(locus: &str, alleles: &str) -> SimpleResult<Self> {
        let locus = Locus::parse(locus)?;
        let alleles = alleles
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|x| x.trim().trim_matches('"').to_string())
            .collect::<Vec<_>>();
        if alleles.iter().any(|x| x.is_empty()) {
            bail!("Empty allele in variant at locus {locus}");
        }
        Ok(Self { locus, alleles })
    }

    pub fn is_biallelic(&self) -> bool {
        self.alleles.len() == 2
    }

    /// Minimal representation, trimming bases shared by all alleles
    ///
    /// Shared trailing bases are trimmed first, then shared leading bases with the position
    /// advanced to match. Every allele keeps at least one base.
    ///
    pub fn min_rep(&self) -> Self {
        let Some(min_length) = self.alleles.iter().map(|x| x.len()).min() else {
            return self.clone();
        };
        if self.alleles.len() < 2 {
            return self.clone();
        }
        let shared = |offset: &dyn Fn(&str) -> usize| {
            let first = self.alleles[0].as_bytes()[offset(&self.alleles[0])];
            self.alleles
                .iter()
                .all(|x| x.as_bytes()[offset(x)] == first)
        };
        let mut back = 0;
        while back + 1 < min_length && shared(&|x: &str| x.len() - 1 - back) {
            back += 1;
        }
        let mut front = 0;
        while front + 1 < min_length - back && shared(&|_: &str| front) {
            front += 1;
        }
        Self {
            locus: Locus::new(&self.locus.contig, self.locus.position + front as i64),
            alleles: self
                .alleles
                .iter()
                .map(|x| x[front..x.len() - back].to_string())
                .collect(),
        }
    }

    pub fn is_snv(&self) -> bool {
        self.is_biallelic() && self.alleles[0].len() == 1 && self.alleles[1].len() == 1
    }

    pub fn is_insertion(&self) -> bool {
        self.is_biallelic() && self.alleles[1].len() > self.alleles[0].len()
    }

    pub fn is_deletion(&self) -> bool {
        self.is_biallelic() && self.alleles[1].len() < self.alleles[0].len()
    }

    /// True for purine-purine or pyrimidine-pyrimidine SNVs
    pub fn is_transition(&self) -> bool {
        if !self.is_snv() {
            return false;
        }
        let pair = (
            self.alleles[0].to_ascii_uppercase(),
            self.alleles[1].to_ascii_uppercase(),
        );
        matches!(
            (pair.0.as_str(), pair.1.as_str()),
            ("A", "G") | ("G", "A") | ("C", "T") | ("T", "C")
        )
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.locus, self.alleles.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locus_order() {
        let mut loci = vec![
            Locus::new("chrX", 5),
            Locus::new("chr10", 1),
            Locus::new("chr2", 100),
            Locus::new("chr2", 7),
            Locus::new("chrY", 1),
        ];
        loci.sort();
        let labels = loci.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec!["chr2:7", "chr2:100", "chr10:1", "chrX:5", "chrY:1"]
        );
    }

    #[test]
    fn test_par_regions() {
        assert!(Locus::new("chrX", 10_001).in_x_par());
        assert!(Locus::new("chrX", 10_000).in_x_nonpar());
        assert!(Locus::new("chrX", 156_030_895).in_x_par());
        assert!(Locus::new("chrY", 57_000_000).in_y_par());
        assert!(Locus::new("chrY", 3_000_000).in_y_nonpar());
        assert!(Locus::new("chr20", 1).in_autosome());

        // PAR1 covers zero-indexed [10_000, 2_781_479)
        assert!(range_overlaps_par("chrX", 9_000, 10_001));
        assert!(!range_overlaps_par("chrX", 9_000, 10_000));
        assert!(range_overlaps_par("chrY", 2_781_478, 2_800_000));
        assert!(!range_overlaps_par("chrY", 2_781_479, 2_800_000));
        assert!(!range_overlaps_par("chr20", 9_000, 20_000));
    }

    #[test]
    fn test_min_rep() {
        let key = |pos: i64, alleles: &[&str]| {
            VariantKey::new(
                Locus::new("chr1", pos),
                alleles.iter().map(|x| x.to_string()).collect(),
            )
        };
        assert_eq!(key(100, &["A", "G"]).min_rep(), key(100, &["A", "G"]));
        assert_eq!(key(100, &["AT", "ATT"]).min_rep(), key(100, &["A", "AT"]));
        assert_eq!(key(100, &["CAG", "CTG"]).min_rep(), key(101, &["A", "T"]));
        assert_eq!(key(100, &["GAAC", "GC"]).min_rep(), key(100, &["GAA", "G"]));
        assert_eq!(key(100, &["TCA", "TCG"]).min_rep(), key(102, &["A", "G"]));
    }

    #[test]
    fn test_parse_variant_key() {
        let key = VariantKey::parse("chr1:12345", "[\"A\",\"G\"]").unwrap();
        assert_eq!(key.locus, Locus::new("chr1", 12345));
        assert_eq!(key.alleles, vec!["A", "G"]);
        assert!(key.is_transition());

        let key = VariantKey::parse("chr1:12345", "AT,A").unwrap();
        assert!(key.is_deletion());

        assert!(Locus::parse("chr1").is_err());
        assert!(Locus::parse("chr1:-4").is_err());
    }
}
