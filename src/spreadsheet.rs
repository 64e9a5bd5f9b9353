// 📊 Spreadsheet Tabulation - metadata sheet (CSV export or .xlsx workbook) → rows
//
// Both formats are read into a grid of cell strings, then tabulated the
// same way.
//
// Column layout is found by header name when the header is recognizable,
// otherwise by sniffing the first data row the way technicians fill it in:
//   - identity column: the one cell that starts with the donor prefix
//   - prep column: the one cell mentioning OCT, FFPE or Vanderbilt

use crate::record::SpreadsheetRow;
use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, info};

/// Identity header names, strongest first. A column named `HPAP` wins over
/// a `Slide` or `Filename` column in the same sheet.
const IDENTITY_HEADERS: &[&[&str]] = &[
    &["hpap", "hpap id"],
    &["sample", "sample id", "slide", "slide id", "filename", "file name"],
];
const PREP_HEADERS: &[&[&str]] = &[&["prep", "preparation", "prep type", "stain"]];
const IMAGE_ID_HEADERS: &[&[&str]] = &[&["image id", "image_id", "imageid", "image"]];
const ANATOMY_HEADERS: &[&[&str]] = &[&["anatomy", "location", "tissue", "region"]];

/// Markers of a prep cell in the first data row
const PREP_MARKERS: &[&str] = &["oct", "ffpe", "vand"];

// ============================================================================
// FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    Csv,
    Xlsx,
}

impl SpreadsheetFormat {
    /// Format for a file extension (without the dot, any case)
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "csv" => Ok(SpreadsheetFormat::Csv),
            "xlsx" => Ok(SpreadsheetFormat::Xlsx),
            other => bail!(
                "unsupported spreadsheet extension '{}' (expected csv or xlsx)",
                other
            ),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_extension(&ext)
            .with_context(|| format!("Cannot read spreadsheet: {}", path.display()))
    }
}

// ============================================================================
// COLUMN LAYOUT
// ============================================================================

/// 0-based column indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub identity: usize,
    pub prep: usize,
    pub image_id: Option<usize>,
    pub anatomy: Option<usize>,
}

impl ColumnLayout {
    /// Locate columns from the header row, falling back to `first_row`
    pub fn detect(headers: &[String], first_row: &[String], donor_prefix: &str) -> Result<Self> {
        let identity = match by_header(headers, IDENTITY_HEADERS, "identity")? {
            Some(col) => col,
            None => sniff(first_row, "identity", None, |cell| cell.starts_with(donor_prefix))?
                .ok_or_else(|| anyhow!("'{}' column not found", donor_prefix))?,
        };

        let prep = match by_header(headers, PREP_HEADERS, "prep")? {
            Some(col) => col,
            None => sniff(first_row, "prep", Some(identity), |cell| {
                let lower = cell.to_lowercase();
                PREP_MARKERS.iter().any(|marker| lower.contains(marker))
            })?
            .ok_or_else(|| anyhow!("'Prep' column not found"))?,
        };

        if identity == prep {
            bail!("column #{} looks like both the identity and the prep column", identity + 1);
        }

        Ok(ColumnLayout {
            identity,
            prep,
            image_id: by_header(headers, IMAGE_ID_HEADERS, "image id")?,
            anatomy: by_header(headers, ANATOMY_HEADERS, "anatomy")?,
        })
    }
}

/// First tier of `tiers` with a matching header decides; two matches in
/// that tier are ambiguous
fn by_header(headers: &[String], tiers: &[&[&str]], role: &str) -> Result<Option<usize>> {
    for names in tiers {
        let matches: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| names.contains(&header.trim().to_lowercase().as_str()))
            .map(|(col, _)| col)
            .collect();

        match matches.as_slice() {
            [] => continue,
            [col] => return Ok(Some(*col)),
            [first, second, ..] => bail!(
                "columns #{} and #{} both look like the {} column",
                first + 1,
                second + 1,
                role
            ),
        }
    }

    Ok(None)
}

/// The single cell of `row` that `looks_like` accepts, ignoring column `skip`
fn sniff<F>(row: &[String], role: &str, skip: Option<usize>, looks_like: F) -> Result<Option<usize>>
where
    F: Fn(&str) -> bool,
{
    let mut found: Option<usize> = None;

    for (col, cell) in row.iter().enumerate() {
        let cell = cell.trim();
        if Some(col) == skip || cell.is_empty() || !looks_like(cell) {
            continue;
        }

        if let Some(first) = found {
            bail!(
                "columns #{} and #{} of the first data row both look like the {} column",
                first + 1,
                col + 1,
                role
            );
        }
        found = Some(col);
    }

    Ok(found)
}

// ============================================================================
// READING
// ============================================================================

/// Read the sheet at `path`, picking the reader from its extension
pub fn read_rows(path: &Path, donor_prefix: &str) -> Result<Vec<SpreadsheetRow>> {
    let rows = match SpreadsheetFormat::from_path(path)? {
        SpreadsheetFormat::Csv => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open spreadsheet: {}", path.display()))?;
            parse_rows(file, donor_prefix)
        }
        SpreadsheetFormat::Xlsx => {
            let workbook: Xlsx<_> = open_workbook(path)
                .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
            tabulate_workbook(workbook, donor_prefix)
        }
    }
    .with_context(|| format!("Failed to read spreadsheet: {}", path.display()))?;

    info!("{} row(s) read from '{}'", rows.len(), path.display());
    Ok(rows)
}

/// Tabulate CSV data: header row, then one record per non-blank row
pub fn parse_rows<R: Read>(input: R, donor_prefix: &str) -> Result<Vec<SpreadsheetRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let grid: Vec<Vec<String>> = reader
        .records()
        .enumerate()
        .map(|(idx, result)| {
            result
                .map(|record| record.iter().map(str::to_string).collect())
                .with_context(|| format!("Failed to parse CSV line {}", idx + 1))
        })
        .collect::<Result<_>>()?;

    tabulate(grid, 1, donor_prefix)
}

/// Tabulate the first worksheet of an .xlsx workbook
pub fn parse_workbook<R: Read + Seek>(input: R, donor_prefix: &str) -> Result<Vec<SpreadsheetRow>> {
    let workbook = Xlsx::new(input).context("Failed to open workbook")?;
    tabulate_workbook(workbook, donor_prefix)
}

fn tabulate_workbook<R: Read + Seek>(mut workbook: Xlsx<R>, donor_prefix: &str) -> Result<Vec<SpreadsheetRow>> {
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?
        .context("Failed to read first worksheet")?;

    // Worksheet row of the first used row (1-indexed)
    let header_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);

    let grid: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    tabulate(grid, header_line, donor_prefix)
}

/// Text of a worksheet cell; whole numbers lose their `.0`
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// First grid row is the header, found on sheet line `header_line`
fn tabulate(grid: Vec<Vec<String>>, header_line: usize, donor_prefix: &str) -> Result<Vec<SpreadsheetRow>> {
    let mut lines = grid.into_iter();
    let headers = lines.next().ok_or_else(|| anyhow!("spreadsheet is empty"))?;
    let records: Vec<Vec<String>> = lines.collect();

    let first_row = records
        .first()
        .ok_or_else(|| anyhow!("spreadsheet has no data rows"))?;

    let layout = ColumnLayout::detect(&headers, first_row, donor_prefix)?;
    debug!(?layout, "spreadsheet columns detected");

    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let line = header_line + 1 + idx;
        let cell = |col: usize| record.get(col).map(|c| c.trim()).unwrap_or("");

        let identity = cell(layout.identity);
        let prep = cell(layout.prep);

        if identity.is_empty() && prep.is_empty() {
            debug!(line, "blank row skipped");
            continue;
        }

        rows.push(SpreadsheetRow {
            line,
            identity_label: identity.to_string(),
            stain_label: prep.to_string(),
            image_id: layout.image_id.map(|col| cell(col).to_string()),
            anatomy_text: layout.anatomy.map(|col| cell(col).to_string()),
        });
    }

    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Minimal single-sheet .xlsx with inline-string cells; numeric-looking
    /// cells are written as numbers
    fn workbook(cells: &[&[&str]]) -> Vec<u8> {
        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in cells.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let cell_ref = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                if value.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, cell_ref, value));
                } else {
                    sheet.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        cell_ref, value
                    ));
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
            ),
            ("xl/worksheets/sheet1.xml", sheet),
        ];

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_columns_found_by_header() {
        let csv = "\
Image ID,HPAP ID,Anatomy,Prep
1001,HPAP-001_A,Pancreas - Head,OCT
1002,HPAP-001_B,Spleen,FFPE
";
        let rows = parse_rows(csv.as_bytes(), "HPAP").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].identity_label, "HPAP-001_A");
        assert_eq!(rows[0].stain_label, "OCT");
        assert_eq!(rows[0].image_id.as_deref(), Some("1001"));
        assert_eq!(rows[0].anatomy_text.as_deref(), Some("Pancreas - Head"));
        assert_eq!(rows[1].line, 3);

        println!("✅ Header detection test passed");
    }

    #[test]
    fn test_columns_sniffed_from_first_row() {
        let csv = "\
Col A,Col B,Col C
  HPAP-001_Spleen_1 ,notes, ffpe
HPAP-001_Thymus_1,,OCT
,,
";
        let rows = parse_rows(csv.as_bytes(), "HPAP").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identity_label, "HPAP-001_Spleen_1");
        assert_eq!(rows[0].stain_label, "ffpe");
        assert_eq!(rows[0].image_id, None);
        assert_eq!(rows[1].identity_label, "HPAP-001_Thymus_1");
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn test_identity_cell_not_taken_for_prep() {
        let csv = "\
x,y
HPAP-001_Pancreas_OCT,Vanderbilt
";
        let rows = parse_rows(csv.as_bytes(), "HPAP").unwrap();
        assert_eq!(rows[0].identity_label, "HPAP-001_Pancreas_OCT");
        assert_eq!(rows[0].stain_label, "Vanderbilt");
    }

    #[test]
    fn test_two_identity_candidates_rejected() {
        let csv = "\
a,b,c
HPAP-001_x,HPAP-001_y,OCT
";
        let err = parse_rows(csv.as_bytes(), "HPAP").unwrap_err();
        assert!(err.to_string().contains("both look like the identity column"));
    }

    #[test]
    fn test_missing_prep_column_rejected() {
        let csv = "\
a,b
HPAP-001_x,something
";
        let err = parse_rows(csv.as_bytes(), "HPAP").unwrap_err();
        assert!(err.to_string().contains("'Prep' column not found"));
    }

    #[test]
    fn test_hpap_header_preferred_over_slide() {
        let csv = "\
Slide,HPAP,Prep
7,HPAP-001_Spleen_1,FFPE
";
        let rows = parse_rows(csv.as_bytes(), "HPAP").unwrap();
        assert_eq!(rows[0].identity_label, "HPAP-001_Spleen_1");

        // Weaker aliases still count when no HPAP column exists
        let csv = "\
Slide,Prep
HPAP-001_Spleen_1,FFPE
";
        let rows = parse_rows(csv.as_bytes(), "HPAP").unwrap();
        assert_eq!(rows[0].identity_label, "HPAP-001_Spleen_1");

        let csv = "\
HPAP,HPAP ID,Prep
HPAP-001_a,HPAP-001_b,OCT
";
        let err = parse_rows(csv.as_bytes(), "HPAP").unwrap_err();
        assert!(err.to_string().contains("both look like the identity column"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SpreadsheetFormat::from_extension("csv").unwrap(), SpreadsheetFormat::Csv);
        assert_eq!(SpreadsheetFormat::from_extension(".XLSX").unwrap(), SpreadsheetFormat::Xlsx);
        assert!(SpreadsheetFormat::from_extension("xls").is_err());
        assert!(SpreadsheetFormat::from_path(Path::new("sheet")).is_err());

        let err = read_rows(Path::new("/nowhere/sheet.ods"), "HPAP").unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported spreadsheet extension 'ods'"));
    }

    #[test]
    fn test_workbook_first_sheet_tabulated() {
        let bytes = workbook(&[
            &["Image ID", "HPAP", "Prep"],
            &["1001", "HPAP-001_Pancreas - Head", "OCT"],
            &["", "", ""],
            &["1002", "HPAP-001_Spleen", "FFPE"],
        ]);

        let rows = parse_workbook(Cursor::new(bytes), "HPAP").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].identity_label, "HPAP-001_Pancreas - Head");
        assert_eq!(rows[0].stain_label, "OCT");
        assert_eq!(rows[0].image_id.as_deref(), Some("1001"));
        assert_eq!(rows[1].line, 4);
        assert_eq!(rows[1].image_id.as_deref(), Some("1002"));

        println!("✅ Workbook tabulation test passed");
    }

    #[test]
    fn test_workbook_read_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("HPAP-001 slides.xlsx");
        std::fs::write(
            &path,
            workbook(&[&["HPAP", "Prep"], &["HPAP-001_Thymus", "OCT"]]),
        )
        .unwrap();

        let rows = read_rows(&path, "HPAP").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identity_label, "HPAP-001_Thymus");
    }

    #[test]
    fn test_workbook_bytes_never_read_as_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        std::fs::write(&path, b"PK\x03\x04 not really a workbook").unwrap();

        let err = read_rows(&path, "HPAP").unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to open workbook"), "{}", message);
        assert!(!message.contains("no data rows"), "{}", message);
    }

    #[test]
    fn test_empty_sheet_rejected() {
        let err = parse_rows("HPAP,Prep\n".as_bytes(), "HPAP").unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }
}
