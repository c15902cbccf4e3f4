// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Serialize a ReportTable into an in-memory xlsx workbook
// role: output/xlsx
// inputs: ReportTable
// outputs: xlsx bytes (single worksheet "Sheet1", header row, no index column, no styling)
// invariants:
// - row 1 is the header ["JQL Query", "January", ..., "December"]
// - data rows start at row 2 in table order; unknown counts are left as empty cells
// - header and query cells are always string cells, whatever the text looks like
// errors: umya-spreadsheet write failures surface through anyhow
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::{anyhow, Result};
use std::io::Cursor;
use umya_spreadsheet::helper::coordinate::coordinate_from_index;

use crate::report::{column_names, ReportTable};

pub const SHEET_NAME: &str = "Sheet1";

fn cell_ref(col: u32, row: u32) -> String {
  coordinate_from_index(&col, &row)
}

pub fn write_table(table: &ReportTable) -> Result<Vec<u8>> {
  let mut book = umya_spreadsheet::new_file();
  let sheet = book
    .get_sheet_by_name_mut(SHEET_NAME)
    .ok_or_else(|| anyhow!("new workbook has no {} worksheet", SHEET_NAME))?;

  for (idx, name) in column_names().iter().enumerate() {
    sheet.get_cell_mut(cell_ref(idx as u32 + 1, 1).as_str()).set_value_string(*name);
  }

  for (row_idx, row) in table.rows.iter().enumerate() {
    let r = row_idx as u32 + 2;
    sheet.get_cell_mut(cell_ref(1, r).as_str()).set_value_string(row.query.as_str());

    for (month_idx, count) in row.counts().iter().enumerate() {
      if let Some(n) = count {
        sheet
          .get_cell_mut(cell_ref(month_idx as u32 + 2, r).as_str())
          .set_value_number(*n as f64);
      }
    }
  }

  let mut buf: Vec<u8> = Vec::new();
  umya_spreadsheet::writer::xlsx::write_writer(&book, Cursor::new(&mut buf))
    .map_err(|e| anyhow!("writing xlsx workbook: {:?}", e))?;

  Ok(buf)
}

/// Parse a workbook produced by `write_table` back into its header and rows.
#[cfg(test)]
pub fn read_table(bytes: &[u8]) -> Result<(Vec<String>, ReportTable)> {
  use crate::report::ReportRow;

  let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
    .map_err(|e| anyhow!("reading xlsx workbook: {:?}", e))?;
  let sheet = book
    .get_sheet_by_name(SHEET_NAME)
    .ok_or_else(|| anyhow!("workbook has no {} worksheet", SHEET_NAME))?;

  let value = |col: u32, row: u32| -> String {
    sheet
      .get_cell(cell_ref(col, row).as_str())
      .map(|c| c.get_value().to_string())
      .unwrap_or_default()
  };

  let header: Vec<String> = (1..=13).map(|c| value(c, 1)).collect();

  let mut rows = Vec::new();
  let mut r = 2;
  while !value(1, r).is_empty() {
    let mut counts = [None; 12];
    for (i, slot) in counts.iter_mut().enumerate() {
      let raw = value(i as u32 + 2, r);
      *slot = if raw.is_empty() { None } else { Some(raw.parse::<f64>()? as u64) };
    }
    rows.push(ReportRow::new(value(1, r), counts));
    r += 1;
  }

  Ok((header, ReportTable { rows }))
}
