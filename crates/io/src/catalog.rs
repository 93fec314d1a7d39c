// Variable catalog import
//
// The catalog is a delimited file with a header row. Only four columns are
// read: Variable, Name (or Description), Dimensions, Units. Anything else is
// ignored.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use wrfsel_core::{Catalog, VariableDescriptor};

use crate::csv::{read_file_as_utf8, sniff_delimiter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// File could not be read.
    Io(String),
    /// Malformed CSV.
    Parse(String),
    /// Header row lacks a required column.
    MissingColumn(&'static str),
    /// Same variable id appears twice.
    DuplicateVariable { id: String, line: usize },
    /// No variable rows at all.
    Empty,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Parse(msg) => write!(f, "catalog parse error: {msg}"),
            Self::MissingColumn(col) => write!(f, "catalog is missing column '{col}'"),
            Self::DuplicateVariable { id, line } => {
                write!(f, "duplicate variable '{id}' on line {line}")
            }
            Self::Empty => write!(f, "catalog has no variables"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Accepted header names per field, compared case-insensitively.
const ID_HEADERS: &[&str] = &["variable"];
const DESCRIPTION_HEADERS: &[&str] = &["name", "description"];
const DIMENSIONS_HEADERS: &[&str] = &["dimensions"];
const UNITS_HEADERS: &[&str] = &["units"];

pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
    let content = read_file_as_utf8(path).map_err(CatalogError::Io)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Catalog, CatalogError> {
    parse_with_delimiter(content, sniff_delimiter(content))
}

pub fn parse_with_delimiter(content: &str, delimiter: u8) -> Result<Catalog, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    let headers = reader.headers().map_err(|e| CatalogError::Parse(e.to_string()))?.clone();
    let find = |names: &[&str], label: &'static str| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
            .ok_or(CatalogError::MissingColumn(label))
    };
    let id_col = find(ID_HEADERS, "Variable")?;
    let description_col = find(DESCRIPTION_HEADERS, "Name")?;
    let dimensions_col = find(DIMENSIONS_HEADERS, "Dimensions")?;
    let units_col = find(UNITS_HEADERS, "Units")?;

    let mut variables = Vec::new();
    let mut seen = HashSet::new();

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| CatalogError::Parse(e.to_string()))?;
        let field = |col: usize| record.get(col).unwrap_or("").to_string();

        let id = field(id_col);
        if id.is_empty() {
            continue;
        }
        // +2: header is line 1, records are 0-based
        if !seen.insert(id.clone()) {
            return Err(CatalogError::DuplicateVariable { id, line: idx + 2 });
        }

        variables.push(VariableDescriptor {
            id,
            description: field(description_col),
            dimensions: field(dimensions_col),
            units: field(units_col),
        });
    }

    if variables.is_empty() {
        return Err(CatalogError::Empty);
    }

    Ok(Catalog::new(variables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_keeps_order_and_renames_name() {
        let content = "\
Variable,Name,Dimensions,Units,Stagger
T2,2-meter temperature,2,K,
PCPT,Total precipitation,2,mm,
SNOW,Snow water equivalent,2,kg m-2,
";
        let catalog = parse(content).unwrap();
        let ids: Vec<&str> = catalog.ids().collect();
        assert_eq!(ids, vec!["T2", "PCPT", "SNOW"]);
        assert_eq!(catalog.get(0).unwrap().description, "2-meter temperature");
        assert_eq!(catalog.get(2).unwrap().units, "kg m-2");
    }

    #[test]
    fn test_parse_column_order_and_case_do_not_matter() {
        let content = "units;DIMENSIONS;description;variable\nK;2;Skin temperature;TSK\n";
        let catalog = parse(content).unwrap();
        let v = catalog.get(0).unwrap();
        assert_eq!(v.id, "TSK");
        assert_eq!(v.description, "Skin temperature");
        assert_eq!(v.dimensions, "2");
        assert_eq!(v.units, "K");
    }

    #[test]
    fn test_missing_column() {
        let content = "Variable,Name,Units\nT2,Temp,K\n";
        assert_eq!(parse(content), Err(CatalogError::MissingColumn("Dimensions")));
    }

    #[test]
    fn test_duplicate_variable() {
        let content = "Variable,Name,Dimensions,Units\nT2,a,2,K\nU10,b,2,m s-1\nT2,c,2,K\n";
        assert_eq!(
            parse(content),
            Err(CatalogError::DuplicateVariable { id: "T2".to_string(), line: 4 })
        );
    }

    #[test]
    fn test_blank_ids_skipped_and_empty_rejected() {
        let content = "Variable,Name,Dimensions,Units\n,orphan,2,K\nQ2,Mixing ratio,2,kg kg-1\n";
        assert_eq!(parse(content).unwrap().len(), 1);

        let content = "Variable,Name,Dimensions,Units\n";
        assert_eq!(parse(content), Err(CatalogError::Empty));
    }

    #[test]
    fn test_load_from_file_with_bom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrf-variables.csv");
        fs::write(&path, "\u{feff}Variable,Name,Dimensions,Units\nT2,Temp,2,K\n").unwrap();

        let catalog = load(&path).unwrap();
        assert_eq!(catalog.get(0).unwrap().id, "T2");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, CatalogError::Io(_)));
    }
}
