//! Per-variant release annotations joined onto the full callset frequency table
//!

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use crate::freq::strata::{DOWNSAMPLING_KEY, LabelSet, SUBSET_KEY};
use crate::freq::{CallStats, FafEntry, FreqGlobals, FreqRow, FreqTable, Popmax};
use crate::genome_regions::GenomeRegions;
use crate::locus::{Locus, VariantKey};
use crate::stats_utils::Histogram;
use crate::table::KeyedRow;
use crate::tsv_utils::{parse_bool, parse_label_list, read_tsv_rows};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FilteringResult {
    /// Empty for passing variants
    pub filters: BTreeSet<String>,
    pub score: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct InSilicoScores {
    pub cadd_raw_score: Option<f64>,
    pub cadd_phred: Option<f64>,
    pub revel_score: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RegionFlags {
    pub lcr: bool,
    pub segdup: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VariantAnnotation {
    pub key: VariantKey,

    /// None for variants missing from the filtering model results
    pub filtering: Option<FilteringResult>,
    pub as_lowqual: bool,
    pub rsid: Option<String>,

    /// Functional consequence annotation as an opaque JSON document
    pub vep: Option<String>,

    pub in_silico: Option<InSilicoScores>,
    pub region_flags: RegionFlags,
    pub telomere_or_centromere: bool,

    /// Full callset frequencies truncated to the strata without subset or downsampling labels
    pub gnomad_freq: Vec<CallStats>,
    pub gnomad_popmax: Option<Popmax>,
    pub gnomad_faf: Vec<FafEntry>,

    /// Adj genotype histograms with the `_adj` suffix removed
    pub gnomad_qual_hists: BTreeMap<String, Histogram>,
    pub gnomad_raw_qual_hists: BTreeMap<String, Histogram>,
    pub inbreeding_coeff: Option<f64>,

    /// Empty if the variant is absent from the subset frequency table
    pub subset_freq: Vec<CallStats>,
}

impl KeyedRow for VariantAnnotation {
    type Key = VariantKey;
    fn key(&self) -> VariantKey {
        self.key.clone()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VariantAnnotationGlobals {
    pub gnomad_freq_meta: Vec<LabelSet>,
    pub gnomad_freq_index_dict: BTreeMap<String, usize>,
    pub gnomad_faf_meta: Vec<LabelSet>,
    pub gnomad_faf_index_dict: BTreeMap<String, usize>,
    pub popmax_excluded_pops: Vec<String>,
    pub subsets: Vec<String>,
    pub subset_freq_meta: Vec<LabelSet>,
    pub subset_freq_index_dict: BTreeMap<String, usize>,
}

/// Number of leading frequency strata without subset or downsampling labels
///
/// Kept strata must form a prefix of the strata list, so that truncating each frequency array
/// keeps positions consistent with the metadata. A kept stratum after any removed stratum is an
/// error.
///
pub fn get_freq_truncation_length(freq_meta: &[LabelSet]) -> SimpleResult<usize> {
    let is_removed =
        |x: &LabelSet| x.contains_key(DOWNSAMPLING_KEY) || x.contains_key(SUBSET_KEY);
    let length = freq_meta
        .iter()
        .position(is_removed)
        .unwrap_or(freq_meta.len());
    if let Some(offset) = freq_meta[length..].iter().position(|x| !is_removed(x)) {
        bail!(
            "Frequency stratum {:?} at position {} follows a subset or downsampling stratum, so the retained strata can't be selected by truncation",
            freq_meta[length + offset],
            length + offset
        );
    }
    Ok(length)
}

/// Split quality histograms into adj histograms, with the `_adj` suffix removed, and raw histograms
///
pub fn split_qual_hists(
    hists: &BTreeMap<String, Histogram>,
) -> (BTreeMap<String, Histogram>, BTreeMap<String, Histogram>) {
    let mut adj = BTreeMap::new();
    let mut raw = BTreeMap::new();
    for (name, h) in hists {
        match name.strip_suffix("_adj") {
            Some(base) => {
                adj.insert(base.to_string(), h.clone());
            }
            None => {
                raw.insert(name.clone(), h.clone());
            }
        }
    }
    (adj, raw)
}

#[derive(Deserialize)]
struct FilteringRecord {
    locus: String,
    alleles: String,
    filters: Option<String>,
    score: Option<f64>,
}

#[derive(Deserialize)]
struct LowqualRecord {
    locus: String,
    alleles: String,
    as_lowqual: String,
}

#[derive(Deserialize)]
struct VepRecord {
    locus: String,
    alleles: String,
    vep: Option<String>,
}

#[derive(Deserialize)]
struct DbsnpRecord {
    locus: String,
    alleles: String,
    rsid: Option<String>,
}

#[derive(Deserialize)]
struct InSilicoRecord {
    locus: String,
    alleles: String,
    cadd_raw_score: Option<f64>,
    cadd_phred: Option<f64>,
    revel_score: Option<f64>,
}

/// Index parsed annotation records by variant key, failing on duplicates
///
fn index_by_variant<R, T>(
    records: Vec<R>,
    label: &str,
    convert: impl Fn(R) -> SimpleResult<(String, String, T)>,
) -> SimpleResult<BTreeMap<VariantKey, T>> {
    let mut map = BTreeMap::new();
    for record in records {
        let (locus, alleles, value) = convert(record)?;
        let key = VariantKey::parse(&locus, &alleles)?;
        if map.contains_key(&key) {
            bail!(
                "Duplicate variant {} {:?} in {label} input",
                key.locus,
                key.alleles
            );
        }
        map.insert(key, value);
    }
    Ok(map)
}

pub fn read_filtering_model(
    filename: &Utf8Path,
) -> SimpleResult<BTreeMap<VariantKey, FilteringResult>> {
    let label = "variant filtering model";
    let records: Vec<FilteringRecord> = read_tsv_rows(filename, label)?;
    index_by_variant(records, label, |r| {
        let filters = r
            .filters
            .as_deref()
            .map(parse_label_list)
            .unwrap_or_default()
            .into_iter()
            .collect();
        Ok((
            r.locus,
            r.alleles,
            FilteringResult {
                filters,
                score: r.score,
            },
        ))
    })
}

pub fn read_as_lowqual(filename: &Utf8Path) -> SimpleResult<BTreeMap<VariantKey, bool>> {
    let label = "allele-specific low quality";
    let records: Vec<LowqualRecord> = read_tsv_rows(filename, label)?;
    index_by_variant(records, label, |r| {
        let value = parse_bool(&r.as_lowqual, "as_lowqual")?;
        Ok((r.locus, r.alleles, value))
    })
}

pub fn read_vep(filename: &Utf8Path) -> SimpleResult<BTreeMap<VariantKey, String>> {
    let label = "VEP";
    let records: Vec<VepRecord> = read_tsv_rows(filename, label)?;
    let map = index_by_variant(records, label, |r| Ok((r.locus, r.alleles, r.vep)))?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.filter(|x| !x.is_empty()).map(|x| (k, x)))
        .collect())
}

pub fn read_dbsnp(filename: &Utf8Path) -> SimpleResult<BTreeMap<VariantKey, String>> {
    let label = "dbSNP";
    let records: Vec<DbsnpRecord> = read_tsv_rows(filename, label)?;
    let map = index_by_variant(records, label, |r| Ok((r.locus, r.alleles, r.rsid)))?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.filter(|x| !x.is_empty()).map(|x| (k, x)))
        .collect())
}

pub fn read_in_silico(filename: &Utf8Path) -> SimpleResult<BTreeMap<VariantKey, InSilicoScores>> {
    let label = "in silico predictor";
    let records: Vec<InSilicoRecord> = read_tsv_rows(filename, label)?;
    index_by_variant(records, label, |r| {
        Ok((
            r.locus,
            r.alleles,
            InSilicoScores {
                cadd_raw_score: r.cadd_raw_score,
                cadd_phred: r.cadd_phred,
                revel_score: r.revel_score,
            },
        ))
    })
}

/// External annotation sources, each empty when not provided
///
#[derive(Default)]
pub struct AnnotationSources {
    pub filtering: BTreeMap<VariantKey, FilteringResult>,
    pub as_lowqual: BTreeMap<VariantKey, bool>,
    pub vep: BTreeMap<VariantKey, String>,
    pub dbsnp: BTreeMap<VariantKey, String>,
    pub in_silico: BTreeMap<VariantKey, InSilicoScores>,
    pub lcr: GenomeRegions,
    pub segdup: GenomeRegions,
    pub telomere_centromere: GenomeRegions,
}

impl AnnotationSources {
    fn region_flags(&self, locus: &Locus) -> RegionFlags {
        RegionFlags {
            lcr: self.lcr.contains_locus(locus),
            segdup: self.segdup.contains_locus(locus),
        }
    }
}

/// Join all annotation sources onto the variants of the full callset frequency table
///
/// # Arguments
/// * `subset_freq` - Frequency rows and globals of the release subset
///
pub fn build_variant_annotations(
    freq: &FreqTable,
    subset_freq: &FreqTable,
    sources: &AnnotationSources,
) -> SimpleResult<(Vec<VariantAnnotation>, VariantAnnotationGlobals)> {
    let FreqGlobals {
        freq_meta,
        freq_index_dict,
        faf_meta,
        faf_index_dict,
        popmax_excluded_pops,
        ..
    } = &freq.globals;

    let truncation_length = get_freq_truncation_length(freq_meta)?;
    info!(
        "Keeping {} of {} full callset frequency strata without subset or downsampling labels",
        truncation_length,
        freq_meta.len()
    );

    let missing_subset_count = freq
        .rows()
        .iter()
        .filter(|x| !subset_freq.contains_key(&x.key))
        .count();
    if missing_subset_count > 0 {
        info!(
            "{} variants have no subset frequencies",
            missing_subset_count.separate_with_commas()
        );
    }

    let rows = freq
        .rows()
        .iter()
        .map(|row: &FreqRow| {
            let key = &row.key;
            let (gnomad_qual_hists, gnomad_raw_qual_hists) = split_qual_hists(&row.qual_hists);
            VariantAnnotation {
                key: key.clone(),
                filtering: sources.filtering.get(key).cloned(),
                as_lowqual: sources.as_lowqual.get(key).copied().unwrap_or(false),
                rsid: sources.dbsnp.get(key).cloned(),
                vep: sources.vep.get(key).cloned(),
                in_silico: sources.in_silico.get(key).cloned(),
                region_flags: sources.region_flags(&key.locus),
                telomere_or_centromere: sources.telomere_centromere.contains_locus(&key.locus),
                gnomad_freq: row.freq[..truncation_length].to_vec(),
                gnomad_popmax: row.popmax.clone(),
                gnomad_faf: row.faf.clone(),
                gnomad_qual_hists,
                gnomad_raw_qual_hists,
                inbreeding_coeff: row.inbreeding_coeff,
                subset_freq: subset_freq
                    .get(key)
                    .map(|x| x.freq.clone())
                    .unwrap_or_default(),
            }
        })
        .collect();

    let globals = VariantAnnotationGlobals {
        gnomad_freq_meta: freq_meta[..truncation_length].to_vec(),
        gnomad_freq_index_dict: freq_index_dict
            .iter()
            .filter(|(_, i)| **i < truncation_length)
            .map(|(k, i)| (k.clone(), *i))
            .collect(),
        gnomad_faf_meta: faf_meta.clone(),
        gnomad_faf_index_dict: faf_index_dict.clone(),
        popmax_excluded_pops: popmax_excluded_pops.clone(),
        subsets: subset_freq.globals.subsets.clone(),
        subset_freq_meta: subset_freq.globals.freq_meta.clone(),
        subset_freq_index_dict: subset_freq.globals.freq_index_dict.clone(),
    };
    Ok((rows, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freq::strata::{StrataConfig, build_strata, make_index_dict};
    use crate::genotype_matrix::AdjCutoffs;
    use crate::table::Table;
    use std::io::Write;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_freq_truncation_length() {
        let meta = vec![
            labels(&[("group", "adj")]),
            labels(&[("group", "raw")]),
            labels(&[("group", "adj"), ("downsampling", "10")]),
            labels(&[("group", "raw"), ("downsampling", "10")]),
        ];
        assert_eq!(get_freq_truncation_length(&meta).unwrap(), 2);
        assert_eq!(get_freq_truncation_length(&meta[..2]).unwrap(), 2);

        let mut interleaved = meta.clone();
        interleaved.push(labels(&[("group", "adj"), ("pop", "afr")]));
        assert!(get_freq_truncation_length(&interleaved).is_err());
    }

    #[test]
    fn test_split_qual_hists() {
        let hists = ["gq_hist_all", "gq_hist_all_adj", "ab_hist_alt_adj"]
            .iter()
            .map(|x| (x.to_string(), Histogram::new(0.0, 1.0, 2)))
            .collect::<BTreeMap<_, _>>();
        let (adj, raw) = split_qual_hists(&hists);
        assert_eq!(adj.keys().collect::<Vec<_>>(), ["ab_hist_alt", "gq_hist_all"]);
        assert_eq!(raw.keys().collect::<Vec<_>>(), ["gq_hist_all"]);
    }

    fn freq_table(subsets: &[&str], downsamplings: Vec<u32>, keys: &[i64]) -> FreqTable {
        let strata = build_strata(&StrataConfig {
            pop_counts: BTreeMap::from([("afr".to_string(), 100)]),
            include_sex: false,
            downsamplings,
            subset: (!subsets.is_empty()).then(|| subsets.join("|")),
        });
        let rows = keys
            .iter()
            .map(|&position| FreqRow {
                key: VariantKey::new(
                    Locus::new("chr1", position),
                    vec!["A".to_string(), "T".to_string()],
                ),
                freq: (0..strata.len())
                    .map(|i| CallStats {
                        ac: i as u32,
                        af: None,
                        an: 0,
                        homozygote_count: 0,
                    })
                    .collect(),
                faf: Vec::new(),
                popmax: None,
                inbreeding_coeff: Some(0.1),
                qual_hists: BTreeMap::from([(
                    "gq_hist_all_adj".to_string(),
                    Histogram::new(0.0, 100.0, 20),
                )]),
            })
            .collect();
        let globals = FreqGlobals {
            freq_index_dict: make_index_dict(&strata),
            freq_meta: strata,
            faf_meta: Vec::new(),
            faf_index_dict: BTreeMap::new(),
            downsamplings: Vec::new(),
            popmax_excluded_pops: Vec::new(),
            subsets: subsets.iter().map(|x| x.to_string()).collect(),
            adj_cutoffs: AdjCutoffs::default(),
            seed: 0,
        };
        Table::new(globals, rows).unwrap()
    }

    #[test]
    fn test_build_variant_annotations() {
        let freq = freq_table(&[], vec![10], &[100, 200]);
        let subset_freq = freq_table(&["hgdp", "tgp"], Vec::new(), &[100]);
        let key = |position| {
            VariantKey::new(
                Locus::new("chr1", position),
                vec!["A".to_string(), "T".to_string()],
            )
        };

        let mut sources = AnnotationSources::default();
        sources.as_lowqual.insert(key(200), true);
        sources.dbsnp.insert(key(100), "rs123".to_string());
        sources.telomere_centromere.add_region("chr1", 150, 250);
        sources.lcr.add_region("chr1", 0, 100);

        let (rows, globals) = build_variant_annotations(&freq, &subset_freq, &sources).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(globals.gnomad_freq_meta.len(), 4);
        assert_eq!(globals.gnomad_freq_index_dict.len(), 4);
        assert!(!globals.gnomad_freq_index_dict.contains_key("10-adj"));
        assert_eq!(globals.subset_freq_index_dict["hgdp|tgp-afr-raw"], 3);

        let first = &rows[0];
        assert_eq!(first.gnomad_freq.len(), 4);
        assert_eq!(first.gnomad_freq[3].ac, 3);
        assert_eq!(first.subset_freq.len(), 4);
        assert_eq!(first.rsid.as_deref(), Some("rs123"));
        assert!(first.region_flags.lcr);
        assert!(!first.telomere_or_centromere);
        assert!(!first.as_lowqual);
        assert!(first.gnomad_qual_hists.contains_key("gq_hist_all"));

        let second = &rows[1];
        assert!(second.as_lowqual);
        assert!(second.telomere_or_centromere);
        assert!(second.subset_freq.is_empty());
        assert_eq!(second.filtering, None);
    }

    #[test]
    fn test_read_filtering_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "locus\talleles\tfilters\tscore").unwrap();
        writeln!(file, "chr1:100\tA,T\t\t0.9").unwrap();
        writeln!(file, "chr1:200\tA,T\tAC0,InbreedingCoeff\t0.1").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let model = read_filtering_model(path).unwrap();
        assert_eq!(model.len(), 2);
        let first = &model[&VariantKey::parse("chr1:100", "A,T").unwrap()];
        assert!(first.filters.is_empty());
        let second = &model[&VariantKey::parse("chr1:200", "A,T").unwrap()];
        assert_eq!(second.filters.len(), 2);
    }
}
