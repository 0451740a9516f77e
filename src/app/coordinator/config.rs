//! Configuration structures for the ingestion coordinator

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::models::SensorFamily;
use crate::constants::{download, search};

/// Band file tags downloaded for one sensor family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSet {
    pub green: String,
    pub swir1: String,
    pub qa_pixel: String,
    pub qa_radsat: String,
    #[serde(default)]
    pub qa_aerosol: Option<String>,
    pub metadata: String,
}

impl BandSet {
    /// Landsat 8/9 OLI defaults
    pub fn oli() -> Self {
        Self {
            green: "SR_B3".to_string(),
            swir1: "SR_B6".to_string(),
            qa_pixel: "QA_PIXEL".to_string(),
            qa_radsat: "QA_RADSAT".to_string(),
            qa_aerosol: Some("SR_QA_AEROSOL".to_string()),
            metadata: "MTL.txt".to_string(),
        }
    }

    /// Landsat 4/5/7 TM and ETM+ defaults
    pub fn tm() -> Self {
        Self {
            green: "SR_B2".to_string(),
            swir1: "SR_B5".to_string(),
            qa_pixel: "QA_PIXEL".to_string(),
            qa_radsat: "QA_RADSAT".to_string(),
            qa_aerosol: None,
            metadata: "MTL.txt".to_string(),
        }
    }

    /// All tags, metadata file included
    pub fn tags(&self) -> Vec<String> {
        let mut tags = vec![
            self.green.clone(),
            self.swir1.clone(),
            self.qa_pixel.clone(),
            self.qa_radsat.clone(),
        ];
        tags.extend(self.qa_aerosol.clone());
        tags.push(self.metadata.clone());
        tags
    }
}

/// Band sets per sensor family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandSets {
    pub oli: BandSet,
    pub etm: BandSet,
    pub tm: BandSet,
}

impl Default for BandSets {
    fn default() -> Self {
        Self {
            oli: BandSet::oli(),
            etm: BandSet::tm(),
            tm: BandSet::tm(),
        }
    }
}

impl BandSets {
    /// Band set for a family; unrecognised scenes use the OLI set
    pub fn for_family(&self, family: Option<SensorFamily>) -> &BandSet {
        match family {
            Some(SensorFamily::Etm) => &self.etm,
            Some(SensorFamily::Tm) => &self.tm,
            Some(SensorFamily::Oli) | None => &self.oli,
        }
    }

    /// Every configured tag once, in family order
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in [&self.oli, &self.etm, &self.tm]
            .into_iter()
            .flat_map(BandSet::tags)
        {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

/// Configuration for the ingestion coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Datasets searched when the caller names none
    pub datasets: Vec<String>,
    /// Band sets per sensor family
    pub bands: BandSets,
    /// Parent of the per-scene scratch directories
    pub scratch_dir: PathBuf,
    /// Concurrent transfers per scene
    pub concurrency: usize,
    /// Maximum scenes per dataset search
    pub max_results: u32,
    /// Simulate every side effect
    pub dry_run: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            datasets: search::DEFAULT_DATASETS
                .iter()
                .map(|dataset| dataset.to_string())
                .collect(),
            bands: BandSets::default(),
            scratch_dir: PathBuf::from(download::DEFAULT_SCRATCH_DIR),
            concurrency: download::DEFAULT_CONCURRENCY,
            max_results: search::DEFAULT_MAX_RESULTS,
            dry_run: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_datasets(mut self, datasets: Vec<String>) -> Self {
        self.datasets = datasets;
        self
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.datasets.is_empty() {
            return Err("At least one dataset is required".to_string());
        }

        if self.concurrency == 0 {
            return Err("Download concurrency cannot be zero".to_string());
        }

        if self.max_results == 0 {
            return Err("Maximum search results cannot be zero".to_string());
        }

        Ok(())
    }
}
