use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("Could not find header row with 'Product' column")]
    HeaderNotFound,
    #[error("Missing required 'Product' column. Found: {0:?}")]
    MissingProductColumn(Vec<String>),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Canonical fields a matrix column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixField {
    ProductName,
    Benefits,
    Surfaces,
    IncompatibleSurfaces,
    SoilageTypes,
    IncompatibleSoilage,
    Locations,
}

impl MatrixField {
    /// Case-insensitive header lookup. Unrecognized headers map to `None`
    /// and their columns are dropped.
    fn from_header(header: &str) -> Option<Self> {
        match header.trim().to_lowercase().as_str() {
            "product" => Some(Self::ProductName),
            "key benefits" => Some(Self::Benefits),
            "surface" => Some(Self::Surfaces),
            "incompatible surface" => Some(Self::IncompatibleSurfaces),
            "soilage" => Some(Self::SoilageTypes),
            "incompatible soilage" => Some(Self::IncompatibleSoilage),
            "location / area" | "location/area" => Some(Self::Locations),
            _ => None,
        }
    }
}

/// Placeholder strings treated as an absent cell.
const NULL_VALUES: [&str; 6] = ["not stated", "n/a", "na", "none", "-", ""];

/// One product with every value accumulated from its span of source rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub product_name: String,
    pub benefits: Vec<String>,
    pub surfaces: Vec<String>,
    pub incompatible_surfaces: Vec<String>,
    pub soilage_types: Vec<String>,
    pub incompatible_soilage: Vec<String>,
    pub locations: Vec<String>,
}

impl MatrixRow {
    #[must_use]
    pub fn new(product_name: String) -> Self {
        Self {
            product_name,
            ..Self::default()
        }
    }

    /// Total values across all list fields; one relationship per value.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.benefits.len()
            + self.surfaces.len()
            + self.incompatible_surfaces.len()
            + self.soilage_types.len()
            + self.incompatible_soilage.len()
            + self.locations.len()
    }

    fn append(&mut self, field: MatrixField, value: String) {
        let list = match field {
            MatrixField::ProductName => return,
            MatrixField::Benefits => &mut self.benefits,
            MatrixField::Surfaces => &mut self.surfaces,
            MatrixField::IncompatibleSurfaces => &mut self.incompatible_surfaces,
            MatrixField::SoilageTypes => &mut self.soilage_types,
            MatrixField::IncompatibleSoilage => &mut self.incompatible_soilage,
            MatrixField::Locations => &mut self.locations,
        };
        if !list.contains(&value) {
            list.push(value);
        }
    }
}

/// Summary statistics over a parsed matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSummary {
    pub total_products: usize,
    pub unique_surfaces: usize,
    pub unique_incompatible_surfaces: usize,
    pub unique_soilage_types: usize,
    pub unique_locations: usize,
    pub unique_benefits: usize,
    pub surfaces: Vec<String>,
    pub locations: Vec<String>,
}

/// Parse a product application matrix from a CSV file.
///
/// Handles the multi-row convention where a product name appears on one
/// row and subsequent rows with an empty product cell carry additional
/// values for the same product:
///
/// ```text
/// Product    | Key Benefits | Surface
/// 3D-GLOSS   | Shiny        | Vinyl
///            | Non-slip     | Timber
/// ACID WASH  | Cleans       | Ceramic
/// ```
///
/// The header row is located by scanning for a cell reading "product",
/// so exports with preamble/framing rows above the table parse as-is.
pub struct MatrixParser {
    path: PathBuf,
}

impl MatrixParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the matrix file into one `MatrixRow` per product.
    pub async fn parse(&self) -> ParseResult<Vec<MatrixRow>> {
        tracing::info!(path = %self.path.display(), "parsing matrix file");

        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ParseError::UnsupportedFormat("no extension".into()))?;
        if !ext.eq_ignore_ascii_case("csv") {
            return Err(ParseError::UnsupportedFormat(ext.to_lowercase()));
        }

        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ParseError::FileNotFound(self.path.clone())
            } else {
                ParseError::Io(e)
            }
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_slice());
        let records: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;

        let header_idx = find_header_row(&records).ok_or(ParseError::HeaderNotFound)?;
        let columns = map_columns(&records[header_idx])?;

        let rows = fold_rows(&records[header_idx + 1..], &columns);
        tracing::info!(products = rows.len(), "parsed matrix");
        Ok(rows)
    }
}

/// Summary statistics for parsed rows, with sorted unique value lists.
#[must_use]
pub fn summarize(rows: &[MatrixRow]) -> MatrixSummary {
    let mut surfaces = BTreeSet::new();
    let mut incompatible_surfaces = BTreeSet::new();
    let mut soilage = BTreeSet::new();
    let mut locations = BTreeSet::new();
    let mut benefits = BTreeSet::new();

    for row in rows {
        surfaces.extend(row.surfaces.iter().cloned());
        incompatible_surfaces.extend(row.incompatible_surfaces.iter().cloned());
        soilage.extend(row.soilage_types.iter().cloned());
        locations.extend(row.locations.iter().cloned());
        benefits.extend(row.benefits.iter().cloned());
    }

    MatrixSummary {
        total_products: rows.len(),
        unique_surfaces: surfaces.len(),
        unique_incompatible_surfaces: incompatible_surfaces.len(),
        unique_soilage_types: soilage.len(),
        unique_locations: locations.len(),
        unique_benefits: benefits.len(),
        surfaces: surfaces.into_iter().collect(),
        locations: locations.into_iter().collect(),
    }
}

/// First row containing a cell reading "product" (case-insensitive).
fn find_header_row(records: &[StringRecord]) -> Option<usize> {
    records.iter().position(|record| {
        record
            .iter()
            .any(|cell| cell.trim().eq_ignore_ascii_case("product"))
    })
}

fn map_columns(header: &StringRecord) -> ParseResult<Vec<(usize, MatrixField)>> {
    let columns: Vec<(usize, MatrixField)> = header
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| MatrixField::from_header(cell).map(|field| (idx, field)))
        .collect();

    if !columns
        .iter()
        .any(|(_, field)| *field == MatrixField::ProductName)
    {
        let found = header.iter().map(str::to_string).collect();
        return Err(ParseError::MissingProductColumn(found));
    }

    tracing::debug!(mapped = columns.len(), "mapped matrix columns");
    Ok(columns)
}

fn fold_rows(records: &[StringRecord], columns: &[(usize, MatrixField)]) -> Vec<MatrixRow> {
    let product_col = columns
        .iter()
        .find(|(_, field)| *field == MatrixField::ProductName)
        .map(|(idx, _)| *idx)
        .unwrap_or_default();

    let mut rows = Vec::new();
    let mut current: Option<MatrixRow> = None;

    for record in records {
        let product_name = record.get(product_col).and_then(clean_value);

        if let Some(name) = product_name {
            // A repeated or partial header row embedded in the data.
            if name.eq_ignore_ascii_case("product") {
                continue;
            }

            if let Some(finished) = current.take() {
                rows.push(finished);
            }
            let mut row = MatrixRow::new(name);
            append_values(&mut row, record, columns);
            current = Some(row);
        } else if let Some(row) = current.as_mut() {
            // Continuation row: extend the current product.
            append_values(row, record, columns);
        }
    }

    if let Some(finished) = current {
        rows.push(finished);
    }

    rows
}

fn append_values(row: &mut MatrixRow, record: &StringRecord, columns: &[(usize, MatrixField)]) {
    for &(idx, field) in columns {
        if field == MatrixField::ProductName {
            continue;
        }
        if let Some(value) = record.get(idx).and_then(clean_value) {
            row.append(field, value);
        }
    }
}

/// Trim a cell and treat the placeholder set as absent.
fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NULL_VALUES.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const BASIC: &str = "\
Product,Key Benefits,Surface,Incompatible Surface,Soilage,Incompatible Soilage,Location / Area
3D-GLOSS,Shiny,Vinyl,,,,Hospitals
,Non-slip,Timber,,,,
ACID WASH,Cleans,Ceramic,Timber,Grease,,Kitchens
";

    #[tokio::test]
    async fn test_multi_row_products() {
        let file = write_csv(BASIC);
        let rows = MatrixParser::new(file.path()).parse().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_name, "3D-GLOSS");
        assert_eq!(rows[0].surfaces, vec!["Vinyl", "Timber"]);
        assert_eq!(rows[0].benefits, vec!["Shiny", "Non-slip"]);
        assert_eq!(rows[1].product_name, "ACID WASH");
        assert_eq!(rows[1].surfaces, vec!["Ceramic"]);
        assert_eq!(rows[1].incompatible_surfaces, vec!["Timber"]);
    }

    #[tokio::test]
    async fn test_header_scan_skips_preamble() {
        let framed = format!("Application Matrix,,,,,,\nExported 2026-01-24,,,,,,\n{BASIC}");
        let file = write_csv(&framed);
        let rows = MatrixParser::new(file.path()).parse().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_name, "3D-GLOSS");
    }

    #[tokio::test]
    async fn test_repeated_header_row_skipped() {
        let content = "\
Product,Key Benefits,Surface
3D-GLOSS,Shiny,Vinyl
Product,Key Benefits,Surface
ACID WASH,Cleans,Ceramic
";
        let file = write_csv(content);
        let rows = MatrixParser::new(file.path()).parse().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].product_name, "ACID WASH");
    }

    #[tokio::test]
    async fn test_null_placeholders_dropped() {
        let content = "\
Product,Key Benefits,Surface
3D-GLOSS,Not Stated,Vinyl
,N/A,-
,none,Timber
";
        let file = write_csv(content);
        let rows = MatrixParser::new(file.path()).parse().await.unwrap();

        assert!(rows[0].benefits.is_empty());
        assert_eq!(rows[0].surfaces, vec!["Vinyl", "Timber"]);
    }

    #[tokio::test]
    async fn test_continuation_values_deduplicated_per_product() {
        let content = "\
Product,Key Benefits,Surface
3D-GLOSS,Shiny,Vinyl
,Shiny,Vinyl
";
        let file = write_csv(content);
        let rows = MatrixParser::new(file.path()).parse().await.unwrap();

        assert_eq!(rows[0].benefits, vec!["Shiny"]);
        assert_eq!(rows[0].surfaces, vec!["Vinyl"]);
    }

    #[tokio::test]
    async fn test_parse_is_deterministic() {
        let file = write_csv(BASIC);
        let parser = MatrixParser::new(file.path());

        let first = parser.parse().await.unwrap();
        let second = parser.parse().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let result = MatrixParser::new("matrix.xlsx").parse().await;

        assert!(matches!(result, Err(ParseError::UnsupportedFormat(ext)) if ext == "xlsx"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = MatrixParser::new("does-not-exist.csv").parse().await;

        assert!(matches!(result, Err(ParseError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_header_not_found() {
        let file = write_csv("Name,Value\nfoo,bar\n");
        let result = MatrixParser::new(file.path()).parse().await;

        assert!(matches!(result, Err(ParseError::HeaderNotFound)));
    }

    #[test]
    fn test_summarize() {
        let rows = vec![
            MatrixRow {
                product_name: "A".into(),
                surfaces: vec!["Vinyl".into(), "Timber".into()],
                locations: vec!["Hospitals".into()],
                ..MatrixRow::default()
            },
            MatrixRow {
                product_name: "B".into(),
                surfaces: vec!["Vinyl".into()],
                locations: vec!["Kitchens".into()],
                ..MatrixRow::default()
            },
        ];

        let summary = summarize(&rows);

        assert_eq!(summary.total_products, 2);
        assert_eq!(summary.unique_surfaces, 2);
        assert_eq!(summary.surfaces, vec!["Timber", "Vinyl"]);
        assert_eq!(summary.locations, vec!["Hospitals", "Kitchens"]);
    }
}
