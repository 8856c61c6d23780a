// src/config.rs

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path, path::PathBuf};

use crate::schema::{default_cohorts, CanonicalItem, CohortSpec};

/// How many failed attention checks a respondent may have and still be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Zero failures.
    Strict,
    /// At most one failure.
    Lenient,
    /// No attention-check filter.
    Relaxed,
}

impl Strictness {
    pub const ALL: [Strictness; 3] = [Strictness::Strict, Strictness::Lenient, Strictness::Relaxed];

    /// Largest failure count still included, `None` for no limit.
    pub fn max_failures(&self) -> Option<u8> {
        match self {
            Strictness::Strict => Some(0),
            Strictness::Lenient => Some(1),
            Strictness::Relaxed => None,
        }
    }

    pub fn admits(&self, failures: u8) -> bool {
        self.max_failures().map_or(true, |max| failures <= max)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Lenient => "lenient",
            Strictness::Relaxed => "relaxed",
        }
    }
}

pub const DEFAULT_OUTLIER_P_VALUE: f64 = 0.001;

fn default_p_value() -> f64 {
    DEFAULT_OUTLIER_P_VALUE
}

fn default_strictness() -> Strictness {
    Strictness::Strict
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("00_raw")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("01_harmonized")
}

/// File stems of the published snapshots inside `output_dir`. The defaults
/// are the names downstream R and Python scripts already read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotNames {
    pub harmonized: String,
    pub clean: String,
    pub qca_ready: String,
}

impl Default for SnapshotNames {
    fn default() -> Self {
        Self {
            harmonized: "df_iri_harmonized_all".into(),
            clean: "df_iri_clean".into(),
            qca_ready: "df_iri_qca_ready".into(),
        }
    }
}

impl SnapshotNames {
    fn validate(&self) -> Result<()> {
        let stems = [&self.harmonized, &self.clean, &self.qca_ready];
        for stem in stems {
            if stem.trim().is_empty() || stem.contains(['/', '\\']) {
                bail!("snapshot name `{}` must be a plain, non-empty file stem", stem);
            }
        }
        if stems[0] == stems[1] || stems[0] == stems[2] || stems[1] == stems[2] {
            bail!("snapshot names must differ: {:?}", stems);
        }
        Ok(())
    }
}

/// Everything the core needs for one run. Built once and passed into each
/// stage; no stage re-declares its own constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_cohorts")]
    pub cohorts: Vec<CohortSpec>,
    /// Cohort years to load; all configured cohorts when unset.
    #[serde(default)]
    pub include_years: Option<Vec<i32>>,
    #[serde(default = "default_strictness")]
    pub strictness: Strictness,
    /// Tail probability for the chi-squared outlier cut-off.
    #[serde(default = "default_p_value")]
    pub outlier_p_value: f64,
    /// Items left out of outlier detection and reliability.
    #[serde(default)]
    pub exclude_items: Vec<CanonicalItem>,
    #[serde(default)]
    pub snapshot_names: SnapshotNames,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            output_dir: default_output_dir(),
            cohorts: default_cohorts(),
            include_years: None,
            strictness: default_strictness(),
            outlier_p_value: default_p_value(),
            exclude_items: Vec::new(),
            snapshot_names: SnapshotNames::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: PipelineConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.outlier_p_value > 0.0 && self.outlier_p_value < 1.0) {
            bail!(
                "outlier p-value must lie in (0, 1), got {}",
                self.outlier_p_value
            );
        }
        if self.cohorts.is_empty() {
            bail!("no cohorts configured");
        }
        let mut years = HashSet::new();
        for c in &self.cohorts {
            if !years.insert(c.year) {
                bail!("cohort year {} configured twice", c.year);
            }
        }
        if let Some(wanted) = &self.include_years {
            if let Some(missing) = wanted.iter().find(|y| !years.contains(y)) {
                return Err(anyhow!("requested cohort {} is not configured", missing));
            }
        }
        if self.selected_cohorts().is_empty() {
            bail!("cohort selection is empty");
        }
        if self.active_items().is_empty() {
            bail!("every item is excluded; nothing left to analyse");
        }
        self.snapshot_names.validate()?;
        Ok(())
    }

    /// Cohorts to load, in configuration order.
    pub fn selected_cohorts(&self) -> Vec<&CohortSpec> {
        self.cohorts
            .iter()
            .filter(|c| {
                self.include_years
                    .as_ref()
                    .map_or(true, |ys| ys.contains(&c.year))
            })
            .collect()
    }

    /// Items used by outlier detection and reliability, in index order.
    pub fn active_items(&self) -> Vec<CanonicalItem> {
        CanonicalItem::all()
            .filter(|i| !self.exclude_items.contains(i))
            .collect()
    }

    pub fn cohort_path(&self, cohort: &CohortSpec) -> PathBuf {
        if cohort.path.is_absolute() {
            cohort.path.clone()
        } else {
            self.raw_dir.join(&cohort.path)
        }
    }
}
