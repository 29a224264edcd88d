//! Debug Report
//!
//! Collects named report sections produced during translation (for example
//! the pretty-printed RAM program with its translation time) and renders
//! them into a single text report for inspection.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

/// One titled section of the report
#[derive(Debug, Clone)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// An ordered collection of report sections
#[derive(Debug, Clone)]
pub struct DebugReport {
    sections: Vec<Section>,
    created_at: DateTime<Utc>,
}

impl Default for DebugReport {
    fn default() -> Self {
        DebugReport {
            sections: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl DebugReport {
    /// Create an empty report
    pub fn new() -> Self {
        DebugReport::default()
    }

    /// Append a section
    pub fn add_section(
        &mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.sections.push(Section {
            id: id.into(),
            title: title.into(),
            body: body.into(),
        });
    }

    /// Check whether any section was recorded
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Access the recorded sections
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Write the rendered report to a file
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# Debug Report ({})",
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "## {} [{}]", section.title, section.id)?;
            writeln!(f)?;
            writeln!(f, "{}", section.body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_render_in_order() {
        let mut report = DebugReport::new();
        assert!(report.is_empty());

        report.add_section("ram-program", "RAM Program (0.01s)", "PROGRAM ...");
        report.add_section("notes", "Notes", "none");

        assert_eq!(report.sections().len(), 2);
        let text = report.to_string();
        let ram = text.find("RAM Program").expect("ram section rendered");
        let notes = text.find("## Notes").expect("notes section rendered");
        assert!(ram < notes);
    }

    #[test]
    fn test_write_to_file() {
        let mut report = DebugReport::new();
        report.add_section("s", "Section", "body text");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        report.write_to(&path).expect("written");

        let contents = std::fs::read_to_string(&path).expect("readable");
        assert!(contents.contains("body text"));
    }
}
