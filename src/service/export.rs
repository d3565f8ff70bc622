use anyhow::{Context, Result};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use serde_json::Value;

use crate::model::report::ReportFormat;
use crate::service::projection::Record;

/// Downloadable file flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// Query-string spelling used by the export endpoint.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "excel" | "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    /// Schedules may ask for PDF, which has no writer.
    pub fn for_schedule(format: ReportFormat) -> Option<Self> {
        match format {
            ReportFormat::Csv => Some(ExportFormat::Csv),
            ReportFormat::Excel => Some(ExportFormat::Xlsx),
            ReportFormat::Pdf => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// Text form of a cell; null becomes an empty cell.
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn render(format: ExportFormat, sheet: &str, columns: &[&str], rows: &[Record]) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => to_csv(columns, rows),
        ExportFormat::Xlsx => to_xlsx(sheet, columns, rows),
    }
}

pub fn to_csv(columns: &[&str], rows: &[Record]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(columns)?;

    for row in rows {
        wtr.write_record(columns.iter().map(|c| cell_text(row.get(*c))))?;
    }

    wtr.into_inner().context("Failed to flush CSV writer")
}

pub fn to_xlsx(sheet: &str, columns: &[&str], rows: &[Record]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x4472C4))
        .set_border(FormatBorder::Thin);

    let worksheet = workbook.add_worksheet();
    // Sheet names are capped at 31 characters
    let name: String = sheet.chars().take(31).collect();
    worksheet.set_name(&name)?;

    for (col, column) in columns.iter().enumerate() {
        worksheet.write_with_format(0, col as u16, *column, &header_format)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, column) in columns.iter().enumerate() {
            let col = col as u16;
            match row.get(*column) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) => {
                    if let Some(f) = n.as_f64() {
                        worksheet.write_number(r, col, f)?;
                    }
                }
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(r, col, *b)?;
                }
                other => {
                    worksheet.write_string(r, col, cell_text(other))?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Record> {
        let mut a = Record::new();
        a.insert("emp_id".into(), json!("EMP1"));
        a.insert("name".into(), json!("Ann, Lee"));
        a.insert("amount".into(), json!(1200.5));
        let mut b = Record::new();
        b.insert("emp_id".into(), json!("EMP2"));
        b.insert("name".into(), Value::Null);
        b.insert("amount".into(), json!(7));
        vec![a, b]
    }

    #[test]
    fn csv_reparses_to_the_same_cells() {
        let columns = ["emp_id", "name", "amount"];
        let bytes = to_csv(&columns, &rows()).unwrap();

        let mut rdr = csv::Reader::from_reader(bytes.as_slice());
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, columns);

        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], "Ann, Lee");
        assert_eq!(&records[0][2], "1200.5");
        assert_eq!(&records[1][1], "");
        assert_eq!(&records[1][2], "7");
    }

    #[test]
    fn empty_csv_still_has_a_header() {
        let bytes = to_csv(&["a", "b"], &[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().trim_end(), "a,b");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx("Payslip Component Report with a long name", &["emp_id", "name", "amount"], &rows())
            .unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn formats_parse_and_map() {
        assert_eq!(ExportFormat::parse("Excel"), Some(ExportFormat::Xlsx));
        assert_eq!(ExportFormat::parse("csv"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::parse("pdf"), None);
        assert_eq!(ExportFormat::for_schedule(ReportFormat::Pdf), None);
        assert_eq!(ExportFormat::for_schedule(ReportFormat::Excel).unwrap().extension(), "xlsx");
    }
}
