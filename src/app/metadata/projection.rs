//! Projection of a flattened metadata document into a scene record
//!
//! Each field is looked up through an ordered alias chain covering the
//! Collection 2 layout, the older `PRODUCT_METADATA` layout and bare keys.
//! An alias matches a key exactly or as its trailing `.`-separated suffix,
//! so the same chain works for both grammars and any nesting depth.

use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::{MetadataDocument, MetadataValue};
use crate::errors::{FormatError, FormatResult};

const ENTITY_ID: &[&str] = &[
    "PRODUCT_CONTENTS.LANDSAT_PRODUCT_ID",
    "PRODUCT_METADATA.LANDSAT_PRODUCT_ID",
    "METADATA_FILE_INFO.LANDSAT_PRODUCT_ID",
    "LANDSAT_PRODUCT_ID",
];
const DISPLAY_ID: &[&str] = &[
    "LEVEL1_PROCESSING_RECORD.LANDSAT_SCENE_ID",
    "PRODUCT_CONTENTS.LANDSAT_SCENE_ID",
    "METADATA_FILE_INFO.LANDSAT_SCENE_ID",
    "LANDSAT_SCENE_ID",
];
const DATE_ACQUIRED: &[&str] = &[
    "IMAGE_ATTRIBUTES.DATE_ACQUIRED",
    "PRODUCT_METADATA.DATE_ACQUIRED",
    "DATE_ACQUIRED",
];
const CLOUD_COVER: &[&str] = &[
    "IMAGE_ATTRIBUTES.CLOUD_COVER",
    "IMAGE_ATTRIBUTES.CLOUD_COVER_LAND",
    "PRODUCT_METADATA.CLOUD_COVER",
    "CLOUD_COVER",
];
const SUN_AZIMUTH: &[&str] = &[
    "IMAGE_ATTRIBUTES.SUN_AZIMUTH",
    "PRODUCT_METADATA.SUN_AZIMUTH",
    "SUN_AZIMUTH",
];
const SUN_ELEVATION: &[&str] = &[
    "IMAGE_ATTRIBUTES.SUN_ELEVATION",
    "PRODUCT_METADATA.SUN_ELEVATION",
    "SUN_ELEVATION",
];
const WRS_PATH: &[&str] = &[
    "IMAGE_ATTRIBUTES.WRS_PATH",
    "PRODUCT_METADATA.WRS_PATH",
    "WRS_PATH",
];
const WRS_ROW: &[&str] = &[
    "IMAGE_ATTRIBUTES.WRS_ROW",
    "PRODUCT_METADATA.WRS_ROW",
    "WRS_ROW",
];
const PROCESSING_LEVEL: &[&str] = &[
    "PRODUCT_CONTENTS.PROCESSING_LEVEL",
    "PRODUCT_METADATA.DATA_TYPE",
    "PROCESSING_LEVEL",
    "DATA_TYPE",
];
const SPACECRAFT_ID: &[&str] = &[
    "IMAGE_ATTRIBUTES.SPACECRAFT_ID",
    "PRODUCT_METADATA.SPACECRAFT_ID",
    "SPACECRAFT_ID",
];
const SENSOR_ID: &[&str] = &[
    "IMAGE_ATTRIBUTES.SENSOR_ID",
    "PRODUCT_METADATA.SENSOR_ID",
    "SENSOR_ID",
];

/// Corner groups checked for `CORNER_<corner>_<LAT|LON>_PRODUCT`
const CORNER_GROUPS: &[&str] = &["PROJECTION_ATTRIBUTES", "PRODUCT_METADATA"];

/// Look up the first non-null value along an alias chain
pub fn lookup<'a>(document: &'a MetadataDocument, aliases: &[&str]) -> Option<&'a MetadataValue> {
    aliases.iter().find_map(|alias| {
        if let Some(value) = document.get(*alias).filter(|value| !value.is_null()) {
            return Some(value);
        }

        let suffix = format!(".{}", alias);
        document
            .iter()
            .find(|(key, value)| key.ends_with(&suffix) && !value.is_null())
            .map(|(_, value)| value)
    })
}

fn corner_value(document: &MetadataDocument, corner: &str, axis: &str) -> Option<f64> {
    let key = format!("CORNER_{}_{}_PRODUCT", corner, axis);
    let aliases: Vec<String> = CORNER_GROUPS
        .iter()
        .map(|group| format!("{}.{}", group, key))
        .chain(std::iter::once(key.clone()))
        .collect();
    let aliases: Vec<&str> = aliases.iter().map(String::as_str).collect();
    lookup(document, &aliases).and_then(MetadataValue::as_f64)
}

/// Scene footprint as a closed ring of `[lon, lat]` points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footprint {
    ring: Vec<[f64; 2]>,
}

impl Footprint {
    /// Build the ring UL, UR, LR, LL, UL from `(lat, lon)` corners
    pub fn from_corners(ul: (f64, f64), ur: (f64, f64), lr: (f64, f64), ll: (f64, f64)) -> Self {
        let ring = [ul, ur, lr, ll, ul]
            .iter()
            .map(|(lat, lon)| [*lon, *lat])
            .collect();
        Self { ring }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.ring
    }

    /// Well-known text in longitude/latitude order
    pub fn to_wkt(&self) -> String {
        let coords: Vec<String> = self
            .ring
            .iter()
            .map(|[lon, lat]| format!("{} {}", lon, lat))
            .collect();
        format!("POLYGON(({}))", coords.join(", "))
    }
}

/// Every field the projection could resolve
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneMetadata {
    pub entity_id: Option<String>,
    pub display_id: Option<String>,
    pub dataset_name: Option<String>,
    pub sensor: Option<String>,
    pub satellite: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub path_row: Option<String>,
    pub cloud_cover: Option<f64>,
    pub sun_azimuth: Option<f64>,
    pub sun_elevation: Option<f64>,
    pub processing_level: Option<String>,
    pub footprint: Option<Footprint>,
}

/// A scene ready for registration; only the entity id is mandatory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneRecord {
    pub entity_id: String,
    pub display_id: String,
    pub dataset_name: String,
    pub sensor: Option<String>,
    pub satellite: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub path_row: Option<String>,
    pub cloud_cover: Option<f64>,
    pub sun_azimuth: Option<f64>,
    pub sun_elevation: Option<f64>,
    pub processing_level: Option<String>,
    pub footprint: Option<Footprint>,
}

impl SceneRecord {
    pub fn acquisition_year(&self) -> Option<i32> {
        self.acquisition_date.map(|date| date.year())
    }
}

impl SceneMetadata {
    /// Convert into a record, rejecting documents without an entity id
    ///
    /// The display id falls back to the entity id.
    pub fn into_record(self, source: &Path) -> FormatResult<SceneRecord> {
        let entity_id = self
            .entity_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FormatError::MissingEntityId {
                path: source.to_path_buf(),
            })?;

        Ok(SceneRecord {
            display_id: self.display_id.unwrap_or_else(|| entity_id.clone()),
            entity_id,
            dataset_name: self.dataset_name.unwrap_or_else(|| "unknown".to_string()),
            sensor: self.sensor,
            satellite: self.satellite,
            acquisition_date: self.acquisition_date,
            path_row: self.path_row,
            cloud_cover: self.cloud_cover,
            sun_azimuth: self.sun_azimuth,
            sun_elevation: self.sun_elevation,
            processing_level: self.processing_level,
            footprint: self.footprint,
        })
    }
}

/// Dataset inferred from the spacecraft id
pub fn infer_dataset(spacecraft: &str) -> &'static str {
    let spacecraft = spacecraft.to_ascii_uppercase();
    if spacecraft.contains("LANDSAT_8") || spacecraft.contains("LANDSAT_9") {
        "landsat_ot_c2_l2"
    } else if spacecraft.contains("LANDSAT_7") {
        "landsat_etm_c2_l2"
    } else if spacecraft.contains("LANDSAT_4") || spacecraft.contains("LANDSAT_5") {
        "landsat_tm_c2_l2"
    } else {
        "unknown"
    }
}

/// Project a flattened document into scene fields
pub fn project_scene(document: &MetadataDocument) -> SceneMetadata {
    let text = |aliases: &[&str]| lookup(document, aliases).and_then(MetadataValue::as_text);
    let number = |aliases: &[&str]| lookup(document, aliases).and_then(MetadataValue::as_f64);

    let satellite = text(SPACECRAFT_ID);
    let path_row = match (
        lookup(document, WRS_PATH).and_then(MetadataValue::as_i64),
        lookup(document, WRS_ROW).and_then(MetadataValue::as_i64),
    ) {
        (Some(path), Some(row)) => Some(format!("{:03}/{:03}", path, row)),
        _ => None,
    };

    let corner = |name: &str| {
        Some((
            corner_value(document, name, "LAT")?,
            corner_value(document, name, "LON")?,
        ))
    };
    let footprint = match (corner("UL"), corner("UR"), corner("LR"), corner("LL")) {
        (Some(ul), Some(ur), Some(lr), Some(ll)) => Some(Footprint::from_corners(ul, ur, lr, ll)),
        _ => None,
    };

    SceneMetadata {
        entity_id: text(ENTITY_ID),
        display_id: text(DISPLAY_ID),
        dataset_name: satellite
            .as_deref()
            .map(|spacecraft| infer_dataset(spacecraft).to_string()),
        sensor: text(SENSOR_ID),
        acquisition_date: lookup(document, DATE_ACQUIRED).and_then(MetadataValue::as_date),
        path_row,
        cloud_cover: number(CLOUD_COVER),
        sun_azimuth: number(SUN_AZIMUTH),
        sun_elevation: number(SUN_ELEVATION),
        processing_level: text(PROCESSING_LEVEL),
        footprint,
        satellite,
    }
}
