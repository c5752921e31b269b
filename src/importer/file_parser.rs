// ==========================================
// Org Structure Engine - File Parser Implementations
// ==========================================
// Reading stage: Excel (.xlsx/.xls) / CSV (.csv) into RawTable
// Row indexes are preserved one-to-one with the source file so that
// downstream diagnostics can point at real rows
// ==========================================

use crate::importer::error::ImportError;
use crate::importer::org_importer_trait::{FileParser, MergedRegion, RawTable};
use calamine::{open_workbook, Data, Ods, Range, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use std::error::Error;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Picks the most plausible delimiter from the first non-empty line.
fn sniff_delimiter(sample: &str) -> u8 {
    let first_line = sample.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let mut best = b',';
    let mut best_count = 0;
    for cand in [b';', b',', b'\t'] {
        let count = first_line.bytes().filter(|&b| b == cand).count();
        if count > best_count {
            best = cand;
            best_count = count;
        }
    }
    best
}

/// Flattens a calamine range into a dense grid, absolute coordinates,
/// so merge regions line up with row/col indexes.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let (height, width) = match range.end() {
        Some((r, c)) => (r + 1, c + 1),
        None => return Vec::new(),
    };

    let mut rows = Vec::with_capacity(height as usize);
    for r in 0..height {
        let mut row = Vec::with_capacity(width as usize);
        for c in 0..width {
            let value = range
                .get_value((r, c))
                .map(|cell| cell.to_string().trim().to_string())
                .unwrap_or_default();
            row.push(value);
        }
        rows.push(row);
    }
    rows
}

// ==========================================
// CSV parser
// ==========================================
pub struct CsvFileParser;

impl FileParser for CsvFileParser {
    fn parse_table(&self, file_path: &Path) -> Result<RawTable, Box<dyn Error>> {
        if !file_path.exists() {
            return Err(Box::new(ImportError::FileNotFound(
                file_path.display().to_string(),
            )));
        }

        if let Some(ext) = file_path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(Box::new(ImportError::InvalidFileFormat(
                    ext.to_string_lossy().to_string(),
                )));
            }
        }

        let bytes = std::fs::read(file_path).map_err(ImportError::from)?;
        let bytes = match bytes.strip_prefix(UTF8_BOM) {
            Some(stripped) => stripped,
            None => &bytes[..],
        };
        let text = String::from_utf8_lossy(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(sniff_delimiter(&text))
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(ImportError::from)?;
            rows.push(record.iter().map(|v| v.trim().to_string()).collect());
        }

        Ok(RawTable {
            rows,
            merges: Vec::new(),
        })
    }
}

// ==========================================
// Excel parser
// ==========================================
pub struct ExcelFileParser;

impl FileParser for ExcelFileParser {
    fn parse_table(&self, file_path: &Path) -> Result<RawTable, Box<dyn Error>> {
        if !file_path.exists() {
            return Err(Box::new(ImportError::FileNotFound(
                file_path.display().to_string(),
            )));
        }

        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "xlsx" => {
                let mut workbook: Xlsx<_> = open_workbook(file_path)
                    .map_err(|e: calamine::XlsxError| ImportError::ExcelParseError(e.to_string()))?;

                let sheet_names = workbook.sheet_names();
                if sheet_names.is_empty() {
                    return Err(Box::new(ImportError::ExcelParseError(
                        "workbook has no sheets".to_string(),
                    )));
                }
                let sheet_name = sheet_names[0].clone();

                workbook
                    .load_merged_regions()
                    .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;
                let merges = workbook
                    .merged_regions_by_sheet(&sheet_name)
                    .into_iter()
                    .map(|(_, _, dims)| MergedRegion {
                        start_row: dims.start.0,
                        start_col: dims.start.1,
                        end_row: dims.end.0,
                        end_col: dims.end.1,
                    })
                    .collect();

                let range = workbook
                    .worksheet_range(&sheet_name)
                    .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

                Ok(RawTable {
                    rows: range_to_rows(&range),
                    merges,
                })
            }
            "xls" => {
                // The legacy container exposes no merge metadata through
                // calamine; cells still come through.
                let mut workbook: Xls<_> = open_workbook(file_path)
                    .map_err(|e: calamine::XlsError| ImportError::ExcelParseError(e.to_string()))?;

                let sheet_names = workbook.sheet_names();
                if sheet_names.is_empty() {
                    return Err(Box::new(ImportError::ExcelParseError(
                        "workbook has no sheets".to_string(),
                    )));
                }
                let sheet_name = sheet_names[0].clone();

                let range = workbook
                    .worksheet_range(&sheet_name)
                    .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

                Ok(RawTable {
                    rows: range_to_rows(&range),
                    merges: Vec::new(),
                })
            }
            "ods" => {
                let mut workbook: Ods<_> = open_workbook(file_path)
                    .map_err(|e: calamine::OdsError| ImportError::ExcelParseError(e.to_string()))?;

                let sheet_names = workbook.sheet_names();
                if sheet_names.is_empty() {
                    return Err(Box::new(ImportError::ExcelParseError(
                        "workbook has no sheets".to_string(),
                    )));
                }
                let sheet_name = sheet_names[0].clone();

                let range = workbook
                    .worksheet_range(&sheet_name)
                    .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

                Ok(RawTable {
                    rows: range_to_rows(&range),
                    merges: Vec::new(),
                })
            }
            other => Err(Box::new(ImportError::InvalidFileFormat(other.to_string()))),
        }
    }
}

// ==========================================
// Universal parser (dispatch by extension)
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_table(&self, file_path: &Path) -> Result<RawTable, Box<dyn Error>> {
        if !file_path.exists() {
            return Err(Box::new(ImportError::FileNotFound(
                file_path.display().to_string(),
            )));
        }

        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvFileParser.parse_table(file_path),
            "xlsx" | "xls" | "ods" => ExcelFileParser.parse_table(file_path),
            _ => Err(Box::new(ImportError::InvalidFileFormat(ext))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_csv_parser_comma_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "FullName,TabNumber,Email").unwrap();
        writeln!(temp_file, "Ivanov Ivan,EMP001,ivanov@example.com").unwrap();

        let table = CsvFileParser.parse_table(temp_file.path()).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 1), "TabNumber");
        assert_eq!(table.cell(1, 0), "Ivanov Ivan");
        assert!(table.merges.is_empty());
    }

    #[test]
    fn test_csv_parser_sniffs_semicolons_and_strips_bom() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"\xef\xbb\xbf").unwrap();
        writeln!(temp_file, "FullName;TabNumber").unwrap();
        writeln!(temp_file, "Ivanov Ivan;EMP001").unwrap();

        let table = CsvFileParser.parse_table(temp_file.path()).unwrap();
        assert_eq!(table.cell(0, 0), "FullName");
        assert_eq!(table.cell(1, 1), "EMP001");
    }

    #[test]
    fn test_csv_parser_keeps_blank_rows_for_row_numbering() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "FullName,TabNumber").unwrap();
        writeln!(temp_file, ",").unwrap();
        writeln!(temp_file, "Ivanov Ivan,EMP001").unwrap();

        let table = CsvFileParser.parse_table(temp_file.path()).unwrap();
        assert_eq!(table.row_count(), 3);
        assert!(table.is_row_empty(1));
        assert_eq!(table.cell(2, 1), "EMP001");
    }

    #[test]
    fn test_parser_file_not_found() {
        let err = CsvFileParser
            .parse_table(Path::new("no_such_file.csv"))
            .unwrap_err();
        let import_err = err.downcast_ref::<ImportError>().unwrap();
        assert!(matches!(import_err, ImportError::FileNotFound(_)));
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let temp_file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .unwrap();

        let err = UniversalFileParser
            .parse_table(temp_file.path())
            .unwrap_err();
        let import_err = err.downcast_ref::<ImportError>().unwrap();
        assert!(matches!(import_err, ImportError::InvalidFileFormat(_)));
    }

    #[test]
    fn test_sniff_delimiter_prefers_majority() {
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter(""), b',');
    }
}
