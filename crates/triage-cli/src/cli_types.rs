use clap::ValueEnum;
use triage_runtime::ReportFormat;
use triage_vector::ItemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliVectorBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliTriageMode {
    Item,
    Backlog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliItemType {
    Issue,
    Pr,
}

impl From<CliItemType> for ItemType {
    fn from(value: CliItemType) -> Self {
        match value {
            CliItemType::Issue => ItemType::Issue,
            CliItemType::Pr => ItemType::PullRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliReportFormat {
    Markdown,
    Json,
}

impl From<CliReportFormat> for ReportFormat {
    fn from(value: CliReportFormat) -> Self {
        match value {
            CliReportFormat::Markdown => ReportFormat::Markdown,
            CliReportFormat::Json => ReportFormat::Json,
        }
    }
}
