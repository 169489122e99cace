//! Dense genotype matrix read from VCF/BCF, with multiallelic records split to one row per alt allele
//!

use std::collections::HashSet;

use camino::Utf8Path;
use log::info;
use rust_htslib::bcf::record::{GenotypeAllele, Numeric};
use rust_htslib::bcf::{self, Read};
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, map_err_with};

use crate::locus::{Locus, VariantKey};
use crate::sample_qc::sex_inference::SexKaryotype;

/// A called genotype after multiallelic splitting, so every allele index is 0 (ref) or 1 (alt)
///
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Call {
    Haploid(u8),
    Diploid(u8, u8),
}

impl Call {
    pub fn ploidy(&self) -> u32 {
        match self {
            Call::Haploid(_) => 1,
            Call::Diploid(_, _) => 2,
        }
    }

    pub fn n_alt_alleles(&self) -> u32 {
        match self {
            Call::Haploid(a) => (*a > 0) as u32,
            Call::Diploid(a, b) => (*a > 0) as u32 + (*b > 0) as u32,
        }
    }

    pub fn is_het(&self) -> bool {
        matches!(self, Call::Diploid(a, b) if a != b)
    }

    pub fn is_diploid_hom_var(&self) -> bool {
        matches!(self, Call::Diploid(a, b) if *a > 0 && *b > 0)
    }

    pub fn is_non_ref(&self) -> bool {
        self.n_alt_alleles() > 0
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GenotypeEntry {
    pub gt: Option<Call>,
    pub gq: Option<i32>,
    pub dp: Option<i32>,
    pub ad: Option<[i32; 2]>,
}

/// Genotype quality cutoffs defining the 'adj' (high quality) genotype subset
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AdjCutoffs {
    pub min_gq: i32,
    pub min_dp: i32,
    pub min_haploid_dp: i32,
    pub min_het_ab: f64,
}

impl Default for AdjCutoffs {
    fn default() -> Self {
        Self {
            min_gq: 20,
            min_dp: 10,
            min_haploid_dp: 5,
            min_het_ab: 0.2,
        }
    }
}

impl GenotypeEntry {
    /// True if this is a called genotype meeting all adj quality cutoffs
    ///
    /// Any missing field needed by a cutoff fails the genotype.
    ///
    pub fn is_adj(&self, cutoffs: &AdjCutoffs) -> bool {
        let Some(gt) = self.gt else {
            return false;
        };
        let (Some(gq), Some(dp)) = (self.gq, self.dp) else {
            return false;
        };
        if gq < cutoffs.min_gq {
            return false;
        }
        let min_dp = if gt.ploidy() == 1 {
            cutoffs.min_haploid_dp
        } else {
            cutoffs.min_dp
        };
        if dp < min_dp {
            return false;
        }
        if gt.is_het() {
            let Some(ad) = self.ad else {
                return false;
            };
            if dp == 0 || (ad[1] as f64 / dp as f64) < cutoffs.min_het_ab {
                return false;
            }
        }
        true
    }
}

/// Adjust a genotype call for the sample's sex karyotype
///
/// XX samples have no chrY calls. XY samples have hemizygous calls on the non-PAR sex chromosomes,
/// where a heterozygous call is treated as missing. All other karyotypes are unchanged.
///
pub fn adjust_sex_ploidy(
    gt: Option<Call>,
    locus: &Locus,
    karyotype: Option<SexKaryotype>,
) -> Option<Call> {
    let gt = gt?;
    match karyotype {
        Some(SexKaryotype::XX) if locus.in_y() => None,
        Some(SexKaryotype::XY) if locus.in_x_nonpar() || locus.in_y_nonpar() => {
            if gt.is_het() {
                None
            } else {
                match gt {
                    Call::Diploid(a, _) => Some(Call::Haploid(a)),
                    x => Some(x),
                }
            }
        }
        _ => Some(gt),
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VariantRow {
    /// Biallelic variant key after splitting
    pub key: VariantKey,

    /// Index of this row's alt allele in the original record
    pub a_index: usize,

    pub was_split: bool,

    /// One entry per sample, in matrix sample order
    pub entries: Vec<GenotypeEntry>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GenotypeMatrix {
    pub samples: Vec<String>,
    pub rows: Vec<VariantRow>,
}

impl GenotypeMatrix {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Restrict rows to those passing `f`
    pub fn retain_rows<F: FnMut(&VariantRow) -> bool>(&mut self, f: F) {
        self.rows.retain(f);
    }

    /// Return a copy of the matrix restricted to the given sample subset, preserving sample order
    ///
    pub fn select_samples(&self, keep: &HashSet<&str>) -> Self {
        let indexes = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| keep.contains(s.as_str()))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let samples = indexes.iter().map(|&i| self.samples[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| VariantRow {
                key: row.key.clone(),
                a_index: row.a_index,
                was_split: row.was_split,
                entries: indexes.iter().map(|&i| row.entries[i].clone()).collect(),
            })
            .collect();
        Self { samples, rows }
    }
}

fn get_optional_value(values: Option<&[i32]>) -> Option<i32> {
    let v = *values?.first()?;
    if v.is_missing() || v == rust_htslib::htslib::bcf_int32_vector_end {
        None
    } else {
        Some(v)
    }
}

fn get_ad_values(values: Option<&[i32]>, allele_count: usize) -> Option<Vec<i32>> {
    let values = values?;
    if values.len() < allele_count {
        return None;
    }
    let values = &values[..allele_count];
    if values.iter().any(|x| x.is_missing() || *x == rust_htslib::htslib::bcf_int32_vector_end) {
        None
    } else {
        Some(values.to_vec())
    }
}

/// Downcode a genotype to biallelic form for alt allele `a_index`
///
fn split_call(alleles: &[Option<u32>], a_index: u32) -> Option<Call> {
    let code = |x: u32| (x == a_index) as u8;
    match alleles {
        [Some(a)] => Some(Call::Haploid(code(*a))),
        [Some(a), Some(b)] => Some(Call::Diploid(code(*a), code(*b))),
        _ => None,
    }
}

/// Read all biallelic-split genotype rows from a VCF or BCF file
///
/// # Arguments
/// * `max_records` - Stop after this many input records, used to build reduced test datasets
///
pub fn read_genotype_matrix(
    filename: &Utf8Path,
    max_records: Option<usize>,
) -> SimpleResult<GenotypeMatrix> {
    info!("Reading genotype matrix from file '{filename}'");

    let mut reader = map_err_with!(
        bcf::Reader::from_path(filename),
        "Unable to open genotype file '{filename}'"
    )?;

    let (rid_to_chrom_name, samples) = {
        let header = reader.header();
        let mut rid_to_chrom_name = Vec::new();
        for rid in 0..header.contig_count() {
            let chrom_bytes = map_err_with!(header.rid2name(rid), "Invalid contig id {rid}")?;
            rid_to_chrom_name.push(String::from_utf8_lossy(chrom_bytes).to_string());
        }
        let samples = header
            .samples()
            .into_iter()
            .map(|x| String::from_utf8_lossy(x).to_string())
            .collect::<Vec<_>>();
        (rid_to_chrom_name, samples)
    };

    {
        let mut seen = HashSet::new();
        for s in samples.iter() {
            if !seen.insert(s) {
                bail!("Duplicate sample id '{s}' in genotype file '{filename}'");
            }
        }
    }

    let sample_count = samples.len();
    let mut matrix = GenotypeMatrix {
        samples,
        rows: Vec::new(),
    };

    let mut record_count = 0;
    let mut rec = reader.empty_record();
    while let Some(r) = reader.read(&mut rec) {
        map_err_with!(r, "Failed to parse variant record in '{filename}'")?;
        if let Some(max_records) = max_records {
            if record_count >= max_records {
                break;
            }
        }
        record_count += 1;

        let rid = match rec.rid() {
            Some(x) => x as usize,
            None => bail!("Variant record without contig in '{filename}'"),
        };
        let locus = Locus::new(&rid_to_chrom_name[rid], rec.pos() + 1);
        let alleles = rec
            .alleles()
            .iter()
            .map(|x| String::from_utf8_lossy(x).to_string())
            .collect::<Vec<_>>();
        let allele_count = alleles.len();
        if allele_count < 2 {
            continue;
        }

        let genotypes = map_err_with!(
            rec.genotypes(),
            "Missing GT field at {locus} in '{filename}'"
        )?;
        let sample_gts = (0..sample_count)
            .map(|sample_index| {
                genotypes
                    .get(sample_index)
                    .iter()
                    .map(|x| match x {
                        GenotypeAllele::Unphased(i) | GenotypeAllele::Phased(i) => {
                            Some(*i as u32)
                        }
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let gq_values = rec.format(b"GQ").integer().ok();
        let dp_values = rec.format(b"DP").integer().ok();
        let ad_values = rec.format(b"AD").integer().ok();

        let sample_fields = (0..sample_count)
            .map(|i| {
                let gq = get_optional_value(gq_values.as_ref().map(|x| x[i]));
                let dp = get_optional_value(dp_values.as_ref().map(|x| x[i]));
                let ad = get_ad_values(ad_values.as_ref().map(|x| x[i]), allele_count);
                (gq, dp, ad)
            })
            .collect::<Vec<_>>();

        let was_split = allele_count > 2;
        for a_index in 1..allele_count {
            if alleles[a_index] == "*" {
                continue;
            }
            let mut key = VariantKey::new(
                locus.clone(),
                vec![alleles[0].clone(), alleles[a_index].clone()],
            );
            if was_split {
                key = key.min_rep();
            }
            let entries = sample_gts
                .iter()
                .zip(sample_fields.iter())
                .map(|(gt, (gq, dp, ad))| GenotypeEntry {
                    gt: split_call(gt, a_index as u32),
                    gq: *gq,
                    dp: *dp,
                    ad: ad.as_ref().map(|ad| {
                        let total = ad.iter().sum::<i32>();
                        [total - ad[a_index], ad[a_index]]
                    }),
                })
                .collect();
            matrix.rows.push(VariantRow {
                key,
                a_index,
                was_split,
                entries,
            });
        }
    }

    info!(
        "Read {} variant rows for {} samples from '{filename}'",
        matrix.rows.len(),
        matrix.sample_count()
    );

    Ok(matrix)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::io::Write;

    pub fn entry(gt: Option<Call>, gq: i32, dp: i32, ad: [i32; 2]) -> GenotypeEntry {
        GenotypeEntry {
            gt,
            gq: Some(gq),
            dp: Some(dp),
            ad: Some(ad),
        }
    }

    #[test]
    fn test_adj() {
        let cutoffs = AdjCutoffs::default();
        assert!(entry(Some(Call::Diploid(0, 1)), 30, 20, [10, 10]).is_adj(&cutoffs));
        assert!(!entry(Some(Call::Diploid(0, 1)), 30, 20, [18, 2]).is_adj(&cutoffs));
        assert!(!entry(Some(Call::Diploid(0, 0)), 19, 20, [20, 0]).is_adj(&cutoffs));
        assert!(!entry(Some(Call::Diploid(1, 1)), 30, 9, [0, 9]).is_adj(&cutoffs));
        assert!(entry(Some(Call::Haploid(1)), 30, 6, [0, 6]).is_adj(&cutoffs));
        assert!(!entry(None, 30, 20, [10, 10]).is_adj(&cutoffs));
    }

    #[test]
    fn test_adjust_sex_ploidy() {
        let het = Some(Call::Diploid(0, 1));
        let hom = Some(Call::Diploid(1, 1));
        let y_nonpar = Locus::new("chrY", 3_000_000);
        let x_nonpar = Locus::new("chrX", 3_000_000);
        let x_par = Locus::new("chrX", 20_000);

        assert_eq!(adjust_sex_ploidy(hom, &y_nonpar, Some(SexKaryotype::XX)), None);
        assert_eq!(adjust_sex_ploidy(het, &x_nonpar, Some(SexKaryotype::XY)), None);
        assert_eq!(
            adjust_sex_ploidy(hom, &x_nonpar, Some(SexKaryotype::XY)),
            Some(Call::Haploid(1))
        );
        assert_eq!(adjust_sex_ploidy(het, &x_par, Some(SexKaryotype::XY)), het);
        assert_eq!(adjust_sex_ploidy(het, &x_nonpar, Some(SexKaryotype::XX)), het);
        assert_eq!(adjust_sex_ploidy(het, &x_nonpar, None), het);
    }

    #[test]
    fn test_read_split_multiallelic_vcf() {
        let mut file = tempfile::Builder::new().suffix(".vcf").tempfile().unwrap();
        writeln!(file, "##fileformat=VCFv4.2").unwrap();
        writeln!(file, "##contig=<ID=chr1,length=1000000>").unwrap();
        writeln!(
            file,
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
        )
        .unwrap();
        writeln!(
            file,
            "##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype quality\">"
        )
        .unwrap();
        writeln!(
            file,
            "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">"
        )
        .unwrap();
        writeln!(
            file,
            "##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allele depths\">"
        )
        .unwrap();
        writeln!(
            file,
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2"
        )
        .unwrap();
        writeln!(
            file,
            "chr1\t100\t.\tA\tG\t50\tPASS\t.\tGT:GQ:DP:AD\t0/1:40:20:10,10\t./.:.:.:."
        )
        .unwrap();
        writeln!(
            file,
            "chr1\t200\t.\tA\tC,T\t50\tPASS\t.\tGT:GQ:DP:AD\t1/2:40:30:2,12,16\t0/0:50:25:25,0,0"
        )
        .unwrap();
        writeln!(
            file,
            "chr1\t300\t.\tAT\tA,ATT\t50\tPASS\t.\tGT:GQ:DP:AD\t0/2:40:30:15,0,15\t0/0:50:25:25,0,0"
        )
        .unwrap();
        file.flush().unwrap();

        let path = Utf8Path::from_path(file.path()).unwrap();
        let matrix = read_genotype_matrix(path, None).unwrap();
        assert_eq!(matrix.samples, vec!["S1", "S2"]);
        assert_eq!(matrix.rows.len(), 5);

        // Split alleles are minimally represented
        assert_eq!(matrix.rows[3].key.alleles, vec!["AT", "A"]);
        assert_eq!(matrix.rows[4].key.alleles, vec!["A", "AT"]);
        assert_eq!(matrix.rows[4].key.locus.position, 300);

        let row = &matrix.rows[0];
        assert!(!row.was_split);
        assert_eq!(row.entries[0].gt, Some(Call::Diploid(0, 1)));
        assert_eq!(row.entries[1].gt, None);
        assert_eq!(row.entries[1].gq, None);

        let row = &matrix.rows[2];
        assert!(row.was_split);
        assert_eq!(row.a_index, 2);
        assert_eq!(row.key.alleles, vec!["A", "T"]);
        assert_eq!(row.entries[0].gt, Some(Call::Diploid(0, 1)));
        assert_eq!(row.entries[0].ad, Some([14, 16]));
        assert_eq!(row.entries[1].gt, Some(Call::Diploid(0, 0)));

        let matrix = read_genotype_matrix(path, Some(1)).unwrap();
        assert_eq!(matrix.rows.len(), 1);
    }
}
