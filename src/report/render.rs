use std::fmt;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::{CensusError, Result};
use crate::report::{CategoryCount, ReportFormat, SizingReport};

const RULE: &str =
    "###################################################################################";

/// Human-readable rendering of a report.
pub struct TextReport<'a>(pub &'a SizingReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let label = report.provider.scope_label();

        writeln!(
            f,
            "cloudcensus {} | {} | {}",
            report.tool_version,
            report.context,
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;

        for census in &report.scopes {
            writeln!(f, "{RULE}")?;
            writeln!(f, "Processing {label}: {}", census.scope)?;
            if census.scope.regions.is_empty() {
                writeln!(f, "Regions: all")?;
            } else {
                writeln!(f, "Regions: {}", census.scope.regions.join(", "))?;
            }
            writeln!(f)?;
            writeln!(f, "--- {label} Resource Census ---")?;
            write_counts(f, "  ", &census.categories)?;
            if census.unclassified > 0 {
                writeln!(f, "  (not categorized: {})", census.unclassified)?;
            }
            writeln!(f, "{RULE}")?;
        }

        writeln!(f)?;
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "--- GRAND TOTALS ACROSS ALL {} {}S ---",
            report.provider.display_name(),
            label.to_uppercase()
        )?;
        write_counts(f, "Grand Total ", &report.totals)?;
        writeln!(f, "{RULE}")?;

        for note in &report.notes {
            writeln!(f, "Note: {note}")?;
        }

        if report.interrupted {
            writeln!(f)?;
            writeln!(f, "Run was interrupted; counts above are partial.")?;
        }

        if !report.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "{RULE}")?;
            writeln!(f, "Skipped (permission denied):")?;
            for skipped in &report.skipped {
                writeln!(
                    f,
                    "{}{} - {}: {} ({})",
                    skipped.scope_id,
                    region_suffix(skipped.region.as_deref()),
                    skipped.query,
                    skipped.categories.join(", "),
                    skipped.reason
                )?;
            }
            writeln!(f, "{RULE}")?;
        }

        if !report.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "{RULE}")?;
            writeln!(f, "Errors Encountered:")?;
            for error in &report.errors {
                writeln!(
                    f,
                    "{}{} - {}: {}",
                    error.scope_id,
                    region_suffix(error.region.as_deref()),
                    error.query,
                    error.message
                )?;
            }
            writeln!(f, "{RULE}")?;
        }

        Ok(())
    }
}

fn write_counts(f: &mut fmt::Formatter<'_>, prefix: &str, counts: &[CategoryCount]) -> fmt::Result {
    for category in counts {
        writeln!(f, "{prefix}{}: {}", category.name, category.count)?;
    }
    Ok(())
}

fn region_suffix(region: Option<&str>) -> String {
    region.map(|r| format!(" [{r}]")).unwrap_or_default()
}

/// Grand totals as `category,count,unit` rows.
pub fn to_csv(report: &SizingReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["category", "count", "unit"])?;
    for category in &report.totals {
        wtr.write_record([
            category.name.as_str(),
            category.count.to_string().as_str(),
            category.unit.as_str(),
        ])?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| CensusError::Io(std::io::Error::other(e.to_string())))?;
    String::from_utf8(data).map_err(|e| CensusError::Parse(e.to_string()))
}

pub fn render(report: &SizingReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(TextReport(report).to_string()),
        ReportFormat::Csv => to_csv(report),
        ReportFormat::Json => {
            let mut json = report.to_json()?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// Print and/or persist a finished report.
///
/// With an `output` path the text rendering goes to `out` first (unless
/// `quiet`), then the requested format is written to the file. Without one,
/// the requested format goes to `out`.
pub fn emit<W: Write>(
    out: &mut W,
    report: &SizingReport,
    format: ReportFormat,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let Some(path) = output else {
        out.write_all(render(report, format)?.as_bytes())?;
        out.flush()?;
        return Ok(());
    };

    if !quiet {
        write!(out, "{}", TextReport(report))?;
        out.flush()?;
    }

    let content = render(report, format)?;
    std::fs::write(path, content).map_err(|err| {
        CensusError::Io(std::io::Error::new(
            err.kind(),
            format!("could not write report to {}: {err}", path.display()),
        ))
    })?;

    info!(path = %path.display(), ?format, "Report written");
    Ok(())
}
