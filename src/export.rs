// Export of the displayed document to a downloadable file

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Docx,
    Pdf,
}

impl ExportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Turns final HTML into a file. `Ok(false)` means the exporter declined
/// without an internal failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export_document(
        &self,
        html: &str,
        filename: &str,
        format: ExportFormat,
    ) -> Result<bool, ExportError>;
}

/// Hand the displayed document to an exporter, refusing empty content.
///
/// # Errors
///
/// [`ExportError::EmptyDocument`] when `html` is blank, otherwise whatever the
/// exporter reports.
pub async fn export_displayed(
    exporter: &dyn Exporter,
    html: &str,
    filename: &str,
    format: ExportFormat,
) -> Result<bool, ExportError> {
    if html.trim().is_empty() {
        return Err(ExportError::EmptyDocument);
    }
    exporter.export_document(html, filename, format).await
}

const DOCUMENT_STYLE: &str = r"body {
    font-family: 'Georgia', 'Times New Roman', serif;
    line-height: 1.6;
    max-width: 8.5in;
    margin: 0 auto;
    padding: 1in;
    color: #000;
    background: #fff;
}
h1 { text-align: center; font-size: 24pt; text-transform: uppercase; }
h2 { font-size: 16pt; border-bottom: 1px solid #000; }
h3 { font-size: 14pt; }
p { text-align: justify; }
@media print { body { padding: 0; } }";

/// Wrap an HTML fragment in a standalone, print-ready page.
/// Full documents are returned untouched.
pub fn standalone_document(html: &str, title: &str) -> String {
    let head: String = html.trim_start().chars().take(9).collect::<String>().to_ascii_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return html.to_string();
    }
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>{title}</title>\n<style>\n{DOCUMENT_STYLE}\n</style>\n</head>\n<body>\n{html}\n</body>\n</html>\n"
    )
}

/// Writes `.html` files into a directory. Word and PDF conversion live
/// outside this crate.
#[derive(Debug, Clone)]
pub struct HtmlFileExporter {
    dir: PathBuf,
}

impl HtmlFileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str, format: ExportFormat) -> PathBuf {
        let path = self.dir.join(filename);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension(format.extension())
        }
    }
}

#[async_trait]
impl Exporter for HtmlFileExporter {
    async fn export_document(
        &self,
        html: &str,
        filename: &str,
        format: ExportFormat,
    ) -> Result<bool, ExportError> {
        if format != ExportFormat::Html {
            return Err(ExportError::UnsupportedFormat(format));
        }

        let path = self.path_for(filename, format);
        let write_err = |source| ExportError::Write {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        tokio::fs::write(&path, standalone_document(html, "Legal Contract"))
            .await
            .map_err(write_err)?;

        info!(path = %path.display(), len = html.len(), "document exported");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use tempfile::TempDir;

    #[test]
    fn test_standalone_wraps_fragment() {
        let page = standalone_document("<h1>NDA</h1>", "Legal Contract");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<body>\n<h1>NDA</h1>\n</body>"));
        assert!(page.contains("<title>Legal Contract</title>"));
    }

    #[test]
    fn test_standalone_keeps_full_document() {
        let doc = "<!DOCTYPE html><html><body>x</body></html>";
        assert_eq!(standalone_document(doc, "t"), doc);
        let doc = "  <HTML><body>x</body></HTML>";
        assert_eq!(standalone_document(doc, "t"), doc);
    }

    #[test]
    fn test_path_for_adds_extension() {
        let exporter = HtmlFileExporter::new("/tmp/out");
        assert_eq!(
            exporter.path_for("contract", ExportFormat::Html),
            PathBuf::from("/tmp/out/contract.html")
        );
        assert_eq!(
            exporter.path_for("contract.htm", ExportFormat::Html),
            PathBuf::from("/tmp/out/contract.htm")
        );
    }

    #[tokio::test]
    async fn test_html_export_writes_file() {
        let temp = TempDir::new().unwrap();
        let exporter = HtmlFileExporter::new(temp.path().join("exports"));

        let ok = exporter
            .export_document("<p>Body</p>", "nda", ExportFormat::Html)
            .await
            .unwrap();
        assert!(ok);

        let written = std::fs::read_to_string(temp.path().join("exports/nda.html")).unwrap();
        assert!(written.contains("<p>Body</p>"));
    }

    #[tokio::test]
    async fn test_html_exporter_rejects_other_formats() {
        let temp = TempDir::new().unwrap();
        let exporter = HtmlFileExporter::new(temp.path());
        let result = exporter
            .export_document("<p>Body</p>", "nda", ExportFormat::Pdf)
            .await;
        assert!(matches!(
            result,
            Err(ExportError::UnsupportedFormat(ExportFormat::Pdf))
        ));
    }

    #[tokio::test]
    async fn test_export_displayed_refuses_empty() {
        let mut exporter = MockExporter::new();
        exporter.expect_export_document().never();

        let result = export_displayed(&exporter, "  ", "empty", ExportFormat::Docx).await;
        assert!(matches!(result, Err(ExportError::EmptyDocument)));
    }

    #[tokio::test]
    async fn test_export_displayed_delegates() {
        let mut exporter = MockExporter::new();
        exporter
            .expect_export_document()
            .with(eq("<p>x</p>"), eq("contract"), eq(ExportFormat::Docx))
            .times(1)
            .returning(|_, _, _| Ok(true));

        let ok = export_displayed(&exporter, "<p>x</p>", "contract", ExportFormat::Docx)
            .await
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_format_display() {
        assert_eq!(ExportFormat::Docx.to_string(), "docx");
        assert_eq!(ExportFormat::Pdf.extension(), "pdf");
    }
}
