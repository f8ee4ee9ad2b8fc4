//! Plain-text export of materialized results

use crate::search::backend::ResultRecord;
use serde::{Deserialize, Serialize};

/// File name offered for downloads
pub const EXPORT_FILE_NAME: &str = "search_results.txt";

/// Line layout of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Matched line content only
    #[default]
    Plain,
    /// `file_name:line_number → content`
    Annotated,
}

/// Render records as newline-joined text
pub fn render(records: &[ResultRecord], format: ExportFormat) -> String {
    records
        .iter()
        .map(|record| match format {
            ExportFormat::Plain => record.content.clone(),
            ExportFormat::Annotated => format!(
                "{}:{} → {}",
                record.source_file, record.line_number, record.content
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ResultRecord> {
        vec![
            ResultRecord::new("alice@bilkent.edu.tr:hunter2", "combo.txt", 12),
            ResultRecord::new("bob@bilkent.edu.tr:qwerty", "combo.txt", 40),
        ]
    }

    #[test]
    fn test_plain_export() {
        assert_eq!(
            render(&records(), ExportFormat::Plain),
            "alice@bilkent.edu.tr:hunter2\nbob@bilkent.edu.tr:qwerty"
        );
    }

    #[test]
    fn test_annotated_export() {
        let text = render(&records(), ExportFormat::Annotated);
        assert_eq!(text.lines().next(), Some("combo.txt:12 → alice@bilkent.edu.tr:hunter2"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_empty_export() {
        assert_eq!(render(&[], ExportFormat::Plain), "");
    }
}
