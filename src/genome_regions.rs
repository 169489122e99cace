use std::collections::HashMap;

use bio::data_structures::interval_tree::IntervalTree;
use camino::Utf8Path;
use log::info;
use simple_error::{SimpleResult, bail, map_err_with};

use crate::locus::Locus;

/// A set of chromosome regions which can be efficiently queried
///
#[derive(Clone)]
pub struct ChromRegions {
    regions: IntervalTree<i64, ()>,
}

impl ChromRegions {
    pub fn new() -> Self {
        Self {
            regions: IntervalTree::new(),
        }
    }

    /// Return true if the start-end range intersects with any regions stored in this object
    ///
    pub fn intersect(&self, start: i64, end: i64) -> bool {
        self.regions.find(start..end).next().is_some()
    }

    /// Return true if zero-indexed `pos` intersects with any regions stored in this object
    ///
    pub fn intersect_pos(&self, pos: i64) -> bool {
        self.intersect(pos, pos + 1)
    }

    /// Add region, regions are not collapsed
    ///
    pub fn add_region(&mut self, start: i64, end: i64) {
        self.regions.insert(start..end, ());
    }
}

impl Default for ChromRegions {
    fn default() -> Self {
        Self::new()
    }
}

/// Genome-wide interval set, such as low-complexity or segmental duplication tracks
///
#[derive(Clone, Default)]
pub struct GenomeRegions {
    pub chroms: HashMap<String, ChromRegions>,
}

impl GenomeRegions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new object from bed file, optionally bgzip-compressed
    ///
    /// # Arguments
    ///
    /// * `label` - Used in log and error messages to describe what type of regions file this is
    ///
    pub fn from_bed(filename: &Utf8Path, label: &str) -> SimpleResult<Self> {
        use rust_htslib::bgzf;
        use std::io::Read;

        info!("Reading {label} regions from file '{filename}'");

        let mut regions = GenomeRegions::new();
        let mut reader = map_err_with!(
            bgzf::Reader::from_path(filename),
            "Unable to open {label} regions file: '{filename}'"
        )?;

        let mut content = String::new();
        map_err_with!(
            reader.read_to_string(&mut content),
            "Can't parse text from {label} regions file: '{filename}'"
        )?;

        for (line_index, line) in content.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') || line.starts_with("track") {
                continue;
            }

            let words = line.split('\t').collect::<Vec<_>>();
            if words.len() < 3 {
                bail!(
                    "Expected at least 3 columns on line {} of {label} regions file: '{filename}'",
                    line_index + 1
                );
            }
            let chrom = words[0];
            let (Ok(start), Ok(end)) = (words[1].parse::<i64>(), words[2].parse::<i64>()) else {
                bail!(
                    "Can't parse coordinates on line {} of {label} regions file: '{filename}'",
                    line_index + 1
                );
            };
            regions.add_region(chrom, start, end);
        }

        Ok(regions)
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.is_empty()
    }

    /// This will add a region
    /// # Arguments
    /// * `chrom` - the contig string
    /// * `start` - the start coordinate (included)
    /// * `end` - the end coordinates (excluded)
    pub fn add_region(&mut self, chrom: &str, start: i64, end: i64) {
        self.chroms
            .entry(chrom.to_owned())
            .or_default()
            .add_region(start, end);
    }

    /// Return true if the 1-indexed locus falls in any region
    ///
    pub fn contains_locus(&self, locus: &Locus) -> bool {
        match self.chroms.get(&locus.contig) {
            Some(x) => x.intersect_pos(locus.position - 1),
            None => false,
        }
    }
}
