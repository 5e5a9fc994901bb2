use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::ReportRecord;

pub const REPORT_HEADERS: [&str; 4] = ["Student Name", "Class", "Vaccine Name", "Date Vaccinated"];
pub const SHEET_NAME: &str = "Vaccination Report";
const FILE_STEM: &str = "vaccination_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Pdf];

    pub fn file_name(&self) -> String {
        let extension = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        };
        format!("{FILE_STEM}.{extension}")
    }
}

/// The single snapshot every encoding is built from.
pub fn report_rows(records: &[ReportRecord]) -> Vec<[&str; 4]> {
    records
        .iter()
        .map(|record| {
            [
                record.student_name.as_str(),
                record.class.as_str(),
                record.vaccine_name.as_str(),
                record.date_vaccinated.as_str(),
            ]
        })
        .collect()
}

pub fn encode(format: ExportFormat, records: &[ReportRecord]) -> anyhow::Result<Vec<u8>> {
    let rows = report_rows(records);
    match format {
        ExportFormat::Csv => to_csv(&rows),
        ExportFormat::Xlsx => to_xlsx(&rows),
        ExportFormat::Pdf => to_pdf(&rows),
    }
}

/// Encodes every format before writing any, so a page that one format
/// cannot carry leaves no partial set of files behind.
pub fn write_exports(
    dir: &Path,
    formats: &[ExportFormat],
    records: &[ReportRecord],
) -> anyhow::Result<Vec<PathBuf>> {
    let encoded = formats
        .iter()
        .map(|format| {
            encode(*format, records)
                .with_context(|| format!("failed to build {}", format.file_name()))
                .map(|bytes| (*format, bytes))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    let mut paths = Vec::with_capacity(encoded.len());
    for (format, bytes) in encoded {
        let path = dir.join(format.file_name());
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write export {}", path.display()))?;
        log::info!("wrote {} report rows to {}", records.len(), path.display());
        paths.push(path);
    }
    Ok(paths)
}

fn to_csv(rows: &[[&str; 4]]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(REPORT_HEADERS)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush csv export: {}", err.error()))
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        xml_escape(SHEET_NAME)
    )
}

fn sheet_xml(rows: &[[&str; 4]]) -> String {
    const COLUMNS: [char; 4] = ['A', 'B', 'C', 'D'];

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    let all_rows = std::iter::once(&REPORT_HEADERS).chain(rows.iter());
    for (index, row) in all_rows.enumerate() {
        let number = index + 1;
        let _ = write!(xml, r#"<row r="{number}">"#);
        for (column, value) in COLUMNS.iter().zip(row.iter()) {
            let _ = write!(
                xml,
                r#"<c r="{column}{number}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                xml_escape(value)
            );
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn to_xlsx(rows: &[[&str; 4]]) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("xl/workbook.xml", workbook_xml()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts)
            .with_context(|| format!("failed to start workbook entry {name}"))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write workbook entry {name}"))?;
    }

    let cursor = zip.finish().context("failed to finalize workbook")?;
    Ok(cursor.into_inner())
}

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const ROW_HEIGHT: f32 = 18.0;
const FONT_SIZE: f32 = 9.0;
const COLUMN_WIDTHS: [f32; 4] = [170.0, 80.0, 145.0, 120.0];
const CELL_PADDING: f32 = 4.0;

/// Body rows that fit under the header on one page.
fn rows_per_page() -> usize {
    (((PAGE_HEIGHT - 2.0 * MARGIN) / ROW_HEIGHT) as usize).saturating_sub(1)
}

/// Characters WinAnsiEncoding places in 0x80..=0x9F.
const WIN_ANSI_HIGH: [(char, u8); 27] = [
    ('\u{20ac}', 0x80),
    ('\u{201a}', 0x82),
    ('\u{0192}', 0x83),
    ('\u{201e}', 0x84),
    ('\u{2026}', 0x85),
    ('\u{2020}', 0x86),
    ('\u{2021}', 0x87),
    ('\u{02c6}', 0x88),
    ('\u{2030}', 0x89),
    ('\u{0160}', 0x8a),
    ('\u{2039}', 0x8b),
    ('\u{0152}', 0x8c),
    ('\u{017d}', 0x8e),
    ('\u{2018}', 0x91),
    ('\u{2019}', 0x92),
    ('\u{201c}', 0x93),
    ('\u{201d}', 0x94),
    ('\u{2022}', 0x95),
    ('\u{2013}', 0x96),
    ('\u{2014}', 0x97),
    ('\u{02dc}', 0x98),
    ('\u{2122}', 0x99),
    ('\u{0161}', 0x9a),
    ('\u{203a}', 0x9b),
    ('\u{0153}', 0x9c),
    ('\u{017e}', 0x9e),
    ('\u{0178}', 0x9f),
];

fn win_ansi_byte(ch: char) -> Option<u8> {
    match ch {
        ' '..='~' | '\u{a0}'..='\u{ff}' => Some(ch as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(mapped, _)| *mapped == ch)
            .map(|(_, byte)| *byte),
    }
}

/// PDF literal string for the WinAnsi-encoded base fonts.
///
/// Text the base fonts cannot show is an error, never a substitute glyph.
fn pdf_string(value: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('(');
    for ch in value.chars() {
        let byte = win_ansi_byte(ch).ok_or_else(|| {
            anyhow::anyhow!(
                "'{ch}' (U+{:04X}) in \"{value}\" cannot be shown with the PDF base font; \
                 export CSV or XLSX instead",
                ch as u32
            )
        })?;
        match byte {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{byte:03o}");
            }
        }
    }
    out.push(')');
    Ok(out)
}

/// Draws one row; cell text is clipped to its column box.
fn table_row(content: &mut String, top: f32, cells: &[&str; 4], header: bool) -> anyhow::Result<()> {
    let bottom = top - ROW_HEIGHT;
    let mut x = MARGIN;
    if header {
        let width: f32 = COLUMN_WIDTHS.iter().sum();
        let _ = writeln!(content, "0.16 0.5 0.73 rg {x:.1} {bottom:.1} {width:.1} {ROW_HEIGHT:.1} re f");
    }
    for (cell, width) in cells.iter().zip(COLUMN_WIDTHS) {
        let _ = writeln!(content, "{x:.1} {bottom:.1} {width:.1} {ROW_HEIGHT:.1} re S");
        let (font, colour) = if header { ("F2", "1 g") } else { ("F1", "0 g") };
        let _ = writeln!(
            content,
            "q {:.1} {bottom:.1} {:.1} {ROW_HEIGHT:.1} re W n",
            x + CELL_PADDING,
            width - 2.0 * CELL_PADDING
        );
        let _ = writeln!(
            content,
            "BT {colour} /{font} {FONT_SIZE:.1} Tf {:.1} {:.1} Td {} Tj ET",
            x + CELL_PADDING,
            bottom + 5.5,
            pdf_string(cell)?
        );
        content.push_str("Q\n");
        x += width;
    }
    Ok(())
}

fn page_content(rows: &[[&str; 4]]) -> anyhow::Result<String> {
    let mut content = String::from("0.5 w 0.78 G\n");
    let mut top = PAGE_HEIGHT - MARGIN;
    table_row(&mut content, top, &REPORT_HEADERS, true)?;
    for row in rows {
        top -= ROW_HEIGHT;
        table_row(&mut content, top, row, false)?;
    }
    Ok(content)
}

/// Single-table document; the header row repeats on every page.
fn to_pdf(rows: &[[&str; 4]]) -> anyhow::Result<Vec<u8>> {
    let chunks: Vec<&[[&str; 4]]> = if rows.is_empty() {
        vec![rows]
    } else {
        rows.chunks(rows_per_page()).collect()
    };

    // 1 catalog, 2 page tree, 3-4 fonts, then a page and its content per chunk.
    let first_page = 5;
    let kids = (0..chunks.len())
        .map(|index| format!("{} 0 R", first_page + index * 2))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", chunks.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];
    for (index, chunk) in chunks.iter().enumerate() {
        let content_id = first_page + index * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.0} {PAGE_HEIGHT:.0}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = page_content(chunk)?;
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}endstream",
            stream.len()
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let _ = write!(pdf, "{} 0 obj\n{body}\nendobj\n", index + 1);
    }
    let xref = pdf.len();
    let _ = write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(pdf, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    );
    Ok(pdf.into_bytes())
}
