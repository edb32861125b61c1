//! PDF text extraction via the poppler `pdftotext` tool.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

/// Extracts the text layer of a PDF as one document string. Pages arrive
/// form-feed-separated on stdout and are joined with newlines.
pub fn extract_text(pdf_path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let text = raw.replace('\u{000C}', "\n").replace('\u{0000}', "");
    Ok(text.trim().to_string())
}
