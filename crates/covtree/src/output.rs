//! Output formatting for the visible rows of a coverage tree

use eyre::{Result, eyre};
use facet::Facet;
use owo_colors::OwoColorize;

use crate::elements::CoverageElement;
use crate::view::RenderedRow;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One row in JSON output
#[derive(Debug, Clone, Facet)]
pub struct JsonRow {
    pub depth: usize,
    pub kind: String,
    pub label: String,
    pub aria_label: String,
    /// Percentage (0-100), when the row has coverage
    pub coverage: Option<f64>,
    pub collapsed: bool,
    pub collapsible: bool,
}

pub fn render_rows(rows: &[RenderedRow], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(rows)),
        OutputFormat::Json => render_json(rows),
    }
}

fn kind_of(element: &CoverageElement) -> &'static str {
    match element {
        CoverageElement::File(node) if node.is_file() => "file",
        CoverageElement::File(_) => "directory",
        CoverageElement::Declaration(_) => "declaration",
        CoverageElement::Loading(_) => "loading",
        CoverageElement::RevealUncovered(_) => "uncovered",
        CoverageElement::FilteredTo(_) => "filter",
    }
}

fn colored_percent(tpc: f64) -> String {
    let percent = tpc * 100.0;
    let percent_str = format!("{:>6.2}%", percent);
    if percent >= 80.0 {
        percent_str.green().to_string()
    } else if percent >= 50.0 {
        percent_str.yellow().to_string()
    } else {
        percent_str.red().to_string()
    }
}

fn render_text(rows: &[RenderedRow]) -> String {
    let mut output = String::new();
    for row in rows {
        let indent = "  ".repeat(row.depth);
        let twistie = match (row.collapsible, row.collapsed) {
            (false, _) => " ",
            (true, true) => ">",
            (true, false) => "v",
        };
        let percent = row.tpc.map(colored_percent).unwrap_or_else(|| " ".repeat(7));

        let label = match &row.element {
            CoverageElement::File(node) if !node.is_file() => row.label.bold().to_string(),
            CoverageElement::Declaration(_) => row.label.cyan().to_string(),
            CoverageElement::Loading(_) | CoverageElement::RevealUncovered(_) => {
                row.label.dimmed().to_string()
            }
            CoverageElement::FilteredTo(_) => row.label.italic().to_string(),
            CoverageElement::File(_) => row.label.clone(),
        };
        output.push_str(&format!("{percent} {indent}{twistie} {label}\n"));
    }
    output
}

fn render_json(rows: &[RenderedRow]) -> Result<String> {
    let rows: Vec<JsonRow> = rows
        .iter()
        .map(|row| JsonRow {
            depth: row.depth,
            kind: kind_of(&row.element).to_string(),
            label: row.label.clone(),
            aria_label: row.aria_label.clone(),
            coverage: row.tpc.map(|tpc| tpc * 100.0),
            collapsed: row.collapsed,
            collapsible: row.collapsible,
        })
        .collect();
    facet_json::to_string_pretty(&rows).map_err(|e| eyre!("Failed to serialize rows: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_str("html"), None);
    }

    #[test]
    fn percent_keeps_two_decimals() {
        assert!(colored_percent(0.5).contains(" 50.00%"));
        assert!(colored_percent(1.0).contains("100.00%"));
    }
}
