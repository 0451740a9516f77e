//! Scene metadata parsing
//!
//! Metadata files come in two grammars: grouped `KEY = VALUE` text (`MTL.txt`)
//! and XML (`MTL.xml`). Both flatten into the same [`MetadataDocument`], which
//! [`project_scene`] maps onto a fixed scene record.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::errors::{FormatError, FormatResult};

pub mod projection;
pub mod text;
pub mod value;
pub mod xml;

pub use projection::{infer_dataset, lookup, project_scene, Footprint, SceneMetadata, SceneRecord};
pub use value::{coerce_value, MetadataValue};

/// Flattened metadata keyed by `.`-joined group or element path
pub type MetadataDocument = BTreeMap<String, MetadataValue>;

/// Synthetic document returned by the parser in dry-run mode
const DRY_RUN_DOCUMENT: &str = r#"GROUP = LANDSAT_METADATA_FILE
  GROUP = PRODUCT_CONTENTS
    LANDSAT_PRODUCT_ID = "LC90040532026030LGN00_DRYRUN"
    PROCESSING_LEVEL = "L2SP"
  END_GROUP = PRODUCT_CONTENTS
  GROUP = IMAGE_ATTRIBUTES
    SPACECRAFT_ID = "LANDSAT_9"
    SENSOR_ID = "OLI_TIRS"
    WRS_PATH = 4
    WRS_ROW = 53
    DATE_ACQUIRED = 2026-01-15
    CLOUD_COVER = 95.00
    SUN_AZIMUTH = 150.0
    SUN_ELEVATION = 60.0
  END_GROUP = IMAGE_ATTRIBUTES
  GROUP = PROJECTION_ATTRIBUTES
    CORNER_UL_LAT_PRODUCT = 10.334375
    CORNER_UL_LON_PRODUCT = -68.00742
    CORNER_UR_LAT_PRODUCT = 10.332388
    CORNER_UR_LON_PRODUCT = -67.494426
    CORNER_LR_LAT_PRODUCT = 9.991131
    CORNER_LR_LON_PRODUCT = -67.496022
    CORNER_LL_LAT_PRODUCT = 9.993051
    CORNER_LL_LON_PRODUCT = -68.008472
  END_GROUP = PROJECTION_ATTRIBUTES
  GROUP = LEVEL1_PROCESSING_RECORD
    LANDSAT_SCENE_ID = "LC90040532026030LGN00_DRYRUN"
  END_GROUP = LEVEL1_PROCESSING_RECORD
END_GROUP = LANDSAT_METADATA_FILE
END
"#;

/// Metadata file grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Grouped `KEY = VALUE` text
    Text,
    /// XML elements
    Xml,
}

/// Select the grammar by extension, then by the first non-blank line
pub fn detect_grammar(path: &Path, content: &str) -> FormatResult<Grammar> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("txt") => return Ok(Grammar::Text),
        Some("xml") => return Ok(Grammar::Xml),
        _ => {}
    }

    match content.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) if line.starts_with('<') => Ok(Grammar::Xml),
        Some(line) if line.contains('=') => Ok(Grammar::Text),
        _ => Err(FormatError::UnknownFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Whether a downloaded file is a metadata document rather than a raster
pub fn is_metadata_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("txt") | Some("xml")
    )
}

/// Parses metadata files into documents and scene records
#[derive(Debug, Clone, Default)]
pub struct MetadataParser {
    dry_run: bool,
}

impl MetadataParser {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Parse content in a known grammar
    pub fn parse_str(&self, content: &str, grammar: Grammar) -> FormatResult<MetadataDocument> {
        match grammar {
            Grammar::Text => Ok(text::parse(content)),
            Grammar::Xml => xml::parse(content),
        }
    }

    /// Read and parse a metadata file
    ///
    /// In dry-run mode the file is not read and a fixed synthetic document
    /// is returned.
    pub async fn parse_file(&self, path: &Path) -> FormatResult<MetadataDocument> {
        if self.dry_run {
            info!("DRY-RUN: using synthetic metadata for {}", path.display());
            return self.parse_str(DRY_RUN_DOCUMENT, Grammar::Text);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let grammar = detect_grammar(path, &content)?;
        let document = self.parse_str(&content, grammar)?;
        debug!(
            "Parsed {} keys from {} ({:?})",
            document.len(),
            path.display(),
            grammar
        );
        Ok(document)
    }

    /// Parse a metadata file straight into a scene record
    ///
    /// # Errors
    ///
    /// Returns `FormatError` when the file is unreadable, in an unknown
    /// grammar, malformed, or yields no entity id
    pub async fn parse_scene(&self, path: &Path) -> FormatResult<SceneRecord> {
        let document = self.parse_file(path).await?;
        project_scene(&document).into_record(path)
    }
}
