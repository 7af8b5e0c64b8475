//! Plan and run reports, rendered as Markdown, CSV or JSON.

use crate::completion::CompletionVerdict;
use crate::dispatch::worker::{JobRecord, JobStatus};
use crate::plan::Plan;
use crate::transition::ConversionRecord;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Output format of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Csv,
    Json,
}

impl ReportFormat {
    /// Format implied by a file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") | Some("txt") => Some(Self::Markdown),
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Something that renders in every [`ReportFormat`].
pub trait Report: Serialize {
    fn to_markdown(&self) -> String;
    fn to_csv(&self) -> String;

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn render(&self, format: ReportFormat) -> io::Result<String> {
        match format {
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Csv => Ok(self.to_csv()),
            ReportFormat::Json => self.to_json().map_err(io::Error::from),
        }
    }

    /// Saves the report, choosing the format from the file extension.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let format = ReportFormat::from_extension(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Unsupported file extension. Use .md, .csv or .json",
            )
        })?;
        std::fs::write(path, self.render(format)?)
    }
}

/// Job counts for one scenario year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioYearSummary {
    pub scenario_year: String,
    pub total: usize,
    pub complete: usize,
    pub to_run: usize,
    /// Subset of `to_run` whose artifact count could not be interpreted.
    pub unknown: usize,
    pub forced: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub essentials_only: bool,
    pub total: usize,
    pub to_run: usize,
    pub scenario_years: Vec<ScenarioYearSummary>,
    /// Jobs per worker partition.
    pub partition_sizes: Vec<usize>,
}

impl PlanReport {
    pub fn from_plan(plan: &Plan) -> Self {
        let mut rows: Vec<ScenarioYearSummary> = Vec::new();
        for assessment in &plan.assessments {
            let label = assessment.job.key.scenario_year().label();
            let idx = match rows.iter().position(|r| r.scenario_year == label) {
                Some(idx) => idx,
                None => {
                    rows.push(ScenarioYearSummary {
                        scenario_year: label,
                        ..Default::default()
                    });
                    rows.len() - 1
                }
            };
            let row = &mut rows[idx];
            row.total += 1;
            match assessment.verdict {
                CompletionVerdict::Complete => row.complete += 1,
                CompletionVerdict::Incomplete => row.to_run += 1,
                CompletionVerdict::UnknownRunAnyway => {
                    row.to_run += 1;
                    row.unknown += 1;
                }
            }
            if assessment.forced {
                row.forced += 1;
            }
        }

        Self {
            essentials_only: plan.essentials_only,
            total: plan.total_jobs(),
            to_run: plan.pending_jobs(),
            scenario_years: rows,
            partition_sizes: plan.batch.sizes(),
        }
    }

    pub fn print_summary(&self) {
        println!("Plan Summary:");
        println!("  Total Jobs: {}", self.total);
        println!("  Complete: {}", self.total - self.to_run);
        println!("  To Run: {}", self.to_run);
        println!("  Workers: {}", self.partition_sizes.len());
        if self.essentials_only {
            println!("  Mode: essentials only");
        }
    }
}

impl Report for PlanReport {
    fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Simulation Plan\n\n");

        output.push_str("## Summary\n\n");
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| Total Jobs | {} |\n", self.total));
        output.push_str(&format!("| Complete | {} |\n", self.total - self.to_run));
        output.push_str(&format!("| To Run | {} |\n", self.to_run));
        output.push_str(&format!("| Essentials Only | {} |\n", self.essentials_only));
        output.push('\n');

        output.push_str("## Scenario Years\n\n");
        output.push_str("| Scenario Year | Total | Complete | To Run | Unknown | Forced |\n");
        output.push_str("|---------------|-------|----------|--------|---------|--------|\n");
        for row in &self.scenario_years {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                row.scenario_year, row.total, row.complete, row.to_run, row.unknown, row.forced
            ));
        }
        output.push('\n');

        output.push_str("## Partitions\n\n");
        output.push_str("| Worker | Jobs |\n");
        output.push_str("|--------|------|\n");
        for (worker, size) in self.partition_sizes.iter().enumerate() {
            output.push_str(&format!("| {} | {} |\n", worker, size));
        }

        output
    }

    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("Scenario Year,Total,Complete,To Run,Unknown,Forced\n");
        for row in &self.scenario_years {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                row.scenario_year, row.total, row.complete, row.to_run, row.unknown, row.forced
            ));
        }
        csv
    }
}

/// One executed (or planned) unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub worker: usize,
    pub position: usize,
    /// Job code, or the source file of a conversion.
    pub item: String,
    pub label: String,
    pub status: &'static str,
    pub cause: Option<String>,
    pub seconds: f64,
}

fn split_status(status: &JobStatus) -> (&'static str, Option<String>) {
    match status {
        JobStatus::Succeeded => ("succeeded", None),
        JobStatus::Failed { cause } => ("failed", Some(cause.clone())),
        JobStatus::Planned => ("planned", None),
    }
}

impl From<&JobRecord> for RunRow {
    fn from(record: &JobRecord) -> Self {
        let (status, cause) = split_status(&record.status);
        Self {
            worker: record.worker,
            position: record.position,
            item: record.code.clone(),
            label: record.label.clone(),
            status,
            cause,
            seconds: record.seconds,
        }
    }
}

impl From<&ConversionRecord> for RunRow {
    fn from(record: &ConversionRecord) -> Self {
        let (status, cause) = split_status(&record.status);
        Self {
            worker: record.worker,
            position: record.position,
            item: record.source.display().to_string(),
            label: record.destination.display().to_string(),
            status,
            cause,
            seconds: record.seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub title: String,
    pub succeeded: usize,
    pub failed: usize,
    pub planned: usize,
    pub rows: Vec<RunRow>,
}

impl RunReport {
    pub fn new<I>(title: &str, rows: I) -> Self
    where
        I: IntoIterator<Item = RunRow>,
    {
        let rows: Vec<RunRow> = rows.into_iter().collect();
        let count = |status: &str| rows.iter().filter(|r| r.status == status).count();
        Self {
            title: title.to_string(),
            succeeded: count("succeeded"),
            failed: count("failed"),
            planned: count("planned"),
            rows,
        }
    }

    pub fn from_jobs(records: &[JobRecord]) -> Self {
        Self::new("Simulation Run", records.iter().map(RunRow::from))
    }

    pub fn from_conversions(records: &[ConversionRecord]) -> Self {
        Self::new("Version Transition", records.iter().map(RunRow::from))
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunRow> {
        self.rows.iter().filter(|r| r.cause.is_some())
    }

    pub fn print_summary(&self) {
        println!("{} Summary:", self.title);
        println!("  Total: {}", self.rows.len());
        println!("  Succeeded: {}", self.succeeded);
        println!("  Failed: {}", self.failed);
        if self.planned > 0 {
            println!("  Planned (dry run): {}", self.planned);
        }
        for row in self.failures() {
            println!(
                "  - {} ({}): {}",
                row.item,
                row.label,
                row.cause.as_deref().unwrap_or("")
            );
        }
    }
}

impl Report for RunReport {
    fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("# {}\n\n", self.title));

        output.push_str("## Summary\n\n");
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| Total | {} |\n", self.rows.len()));
        output.push_str(&format!("| Succeeded | {} |\n", self.succeeded));
        output.push_str(&format!("| Failed | {} |\n", self.failed));
        output.push_str(&format!("| Planned | {} |\n", self.planned));
        output.push('\n');

        if self.failed > 0 {
            output.push_str("## Failures\n\n");
            output.push_str("| Item | Label | Cause |\n");
            output.push_str("|------|-------|-------|\n");
            for row in self.failures() {
                output.push_str(&format!(
                    "| {} | {} | {} |\n",
                    row.item,
                    row.label,
                    row.cause.as_deref().unwrap_or("").replace('|', "\\|").replace('\n', " ")
                ));
            }
            output.push('\n');
        }

        output.push_str("## Detailed Results\n\n");
        output.push_str("| Worker | # | Item | Label | Status | Seconds |\n");
        output.push_str("|--------|---|------|-------|--------|---------|\n");
        for row in &self.rows {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} | {:.1} |\n",
                row.worker, row.position, row.item, row.label, row.status, row.seconds
            ));
        }

        output
    }

    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("Worker,Position,Item,Label,Status,Seconds,Cause\n");
        for row in &self.rows {
            csv.push_str(&format!(
                "{},{},{},{},{},{:.3},{}\n",
                row.worker,
                row.position,
                quote(&row.item),
                quote(&row.label),
                row.status,
                row.seconds,
                quote(row.cause.as_deref().unwrap_or(""))
            ));
        }
        csv
    }
}

/// Quotes a CSV field, doubling embedded quotes.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(worker: usize, position: usize, status: JobStatus) -> JobRecord {
        JobRecord {
            worker,
            position,
            code: format!("0_0_{}_{}", worker, position),
            label: "pre1980_1a_historical_2020_RefBldgWarehouse".to_string(),
            status,
            seconds: 1.5,
        }
    }

    #[test]
    fn test_run_report_counts() {
        let records = vec![
            record(0, 0, JobStatus::Succeeded),
            record(
                0,
                1,
                JobStatus::Failed {
                    cause: "exit code 1".to_string(),
                },
            ),
            record(1, 0, JobStatus::Succeeded),
        ];
        let report = RunReport::from_jobs(&records);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.planned, 0);
        assert_eq!(report.failures().count(), 1);

        let md = report.to_markdown();
        assert!(md.contains("# Simulation Run"));
        assert!(md.contains("| Failed | 1 |"));
        assert!(md.contains("| 0_0_0_1 |"));

        let csv = report.to_csv();
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.lines().nth(2).unwrap().ends_with("\"exit code 1\""));
    }

    #[test]
    fn test_csv_quotes_paths_with_commas() {
        let rows = vec![RunRow {
            worker: 0,
            position: 0,
            item: "/data/a,b/Ref_\"x\".idf".to_string(),
            label: "/data/out,1/Ref.idf".to_string(),
            status: "succeeded",
            cause: None,
            seconds: 0.25,
        }];
        let csv = RunReport::new("Version Transition", rows).to_csv();
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "0,0,\"/data/a,b/Ref_\"\"x\"\".idf\",\"/data/out,1/Ref.idf\",succeeded,0.250,\"\""
        );
    }

    #[test]
    fn test_run_report_json() {
        let report = RunReport::from_jobs(&[record(0, 0, JobStatus::Planned)]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["planned"], 1);
        assert_eq!(json["rows"][0]["status"], "planned");
        assert!(json["rows"][0]["cause"].is_null());
    }

    #[test]
    fn test_report_format() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("html".parse::<ReportFormat>().is_err());
        assert_eq!(
            ReportFormat::from_extension(Path::new("out/run.csv")),
            Some(ReportFormat::Csv)
        );
        assert_eq!(ReportFormat::from_extension(Path::new("run.html")), None);
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = RunReport::from_jobs(&[record(0, 0, JobStatus::Succeeded)]);
        let path = dir.path().join("run.md");
        report.save_to_file(&path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("| Succeeded | 1 |"));
        assert!(report.save_to_file(dir.path().join("run.pdf")).is_err());
    }
}
