use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use thiserror::Error;

/// Hard ceilings so one upload cannot flood the analyzer: roughly ten pages
/// of PDF text and a bounded number of sheet/CSV rows.
const PDF_CHAR_CAP: usize = 30_000;
const ROW_CAP: usize = 200;

#[derive(Debug, Error)]
pub(crate) enum ExtractError {
    #[error("Please choose a file to upload.")]
    MissingFile,
    #[error("Unsupported file type.")]
    UnsupportedType,
    #[error("File appears to be empty.")]
    EmptyFile,
    #[error("Could not read the document: {0}")]
    Unreadable(String),
}

pub(crate) fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Extract plain text from an uploaded document, dispatching on the file
/// extension. Formats outside the allow-list are rejected up front.
pub(crate) fn extract_text(
    filename: &str,
    data: &[u8],
    allowed_extensions: &[String],
) -> Result<String, ExtractError> {
    if filename.trim().is_empty() {
        return Err(ExtractError::MissingFile);
    }

    let extension = extension_of(filename).ok_or(ExtractError::UnsupportedType)?;
    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ExtractError::UnsupportedType);
    }

    if data.is_empty() {
        return Err(ExtractError::EmptyFile);
    }

    match extension.as_str() {
        "txt" | "md" => Ok(String::from_utf8_lossy(data).into_owned()),
        "pdf" => extract_pdf(data),
        "docx" => extract_docx(data),
        "xlsx" => extract_xlsx(data),
        "csv" => Ok(extract_csv(data)),
        _ => Err(ExtractError::UnsupportedType),
    }
}

fn extract_pdf(data: &[u8]) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|err| ExtractError::Unreadable(err.to_string()))?;
    Ok(text.chars().take(PDF_CHAR_CAP).collect())
}

/// DOCX is a zip; the document body lives in word/document.xml and the
/// visible text sits inside <w:t> runs grouped by <w:p> paragraphs.
fn extract_docx(data: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|err| ExtractError::Unreadable(err.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| ExtractError::Unreadable(err.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|err| ExtractError::Unreadable(err.to_string()))?;

    Ok(docx_text_from_xml(&xml))
}

fn docx_text_from_xml(xml: &str) -> String {
    let mut result = String::new();
    let mut rest = xml;

    while let Some(paragraph_start) = rest.find("<w:p") {
        let after_start = &rest[paragraph_start..];
        let paragraph_end = after_start.find("</w:p>").map(|end| end + 6).unwrap_or(after_start.len());
        let paragraph = &after_start[..paragraph_end];

        let mut paragraph_text = String::new();
        let mut runs = paragraph;
        while let Some(run_start) = runs.find("<w:t") {
            let after_run = &runs[run_start..];
            let Some(tag_close) = after_run.find('>') else {
                break;
            };
            let content = &after_run[tag_close + 1..];
            let Some(run_end) = content.find("</w:t>") else {
                runs = content;
                continue;
            };
            paragraph_text.push_str(&content[..run_end]);
            runs = &content[run_end + 6..];
        }

        if !paragraph_text.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&paragraph_text);
        }

        rest = &after_start[paragraph_end..];
    }

    result
}

fn extract_xlsx(data: &[u8]) -> Result<String, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|err| ExtractError::Unreadable(err.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut lines = Vec::new();

    'sheets: for sheet_name in &sheet_names {
        let Ok(range) = workbook.worksheet_range(sheet_name) else {
            continue;
        };
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(cell_to_string)
                .filter(|cell| !cell.is_empty())
                .collect();
            if cells.is_empty() {
                continue;
            }
            lines.push(cells.join(" "));
            if lines.len() >= ROW_CAP {
                break 'sheets;
            }
        }
    }

    Ok(lines.join("\n"))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.trim().to_string(),
        Data::Float(value) => {
            if value.fract() == 0.0 {
                format!("{}", *value as i64)
            } else {
                format!("{value}")
            }
        }
        Data::Int(value) => format!("{value}"),
        Data::Bool(value) => format!("{value}"),
        other => format!("{other}").trim().to_string(),
    }
}

fn extract_csv(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    text.lines()
        .take(ROW_CAP)
        .map(|line| {
            line.split(',')
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        ["txt", "md", "pdf", "docx", "xlsx", "csv"].iter().map(|ext| ext.to_string()).collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("notes.txt", b"hello world", &allowed()).expect("txt");
        assert_eq!(text, "hello world");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = extract_text("malware.exe", b"MZ", &allowed()).expect_err("exe");
        assert!(matches!(err, ExtractError::UnsupportedType));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = extract_text("notes.txt", b"", &allowed()).expect_err("empty");
        assert!(matches!(err, ExtractError::EmptyFile));
    }

    #[test]
    fn missing_filename_is_rejected() {
        let err = extract_text("", b"data", &allowed()).expect_err("no name");
        assert!(matches!(err, ExtractError::MissingFile));
    }

    #[test]
    fn csv_rows_become_space_joined_lines() {
        let data = b"word,meaning\nserene, calm and peaceful\n\n";
        let text = extract_text("vocab.csv", data, &allowed()).expect("csv");
        assert_eq!(text, "word meaning\nserene calm and peaceful");
    }

    #[test]
    fn docx_xml_text_runs_are_joined_per_paragraph() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(docx_text_from_xml(xml), "Hello world\nSecond paragraph");
    }

    #[test]
    fn extension_parsing_lowercases() {
        assert_eq!(extension_of("Report.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("archive"), None);
    }
}
