//! Line-driven sessions that keep one screen alive between commands.
//!
//! Each line is one command. The screen is re-rendered after every command,
//! so filter and page changes behave like the controls they stand in for.

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::api::Backend;
use crate::export::ExportFormat;
use crate::query::VaccinatedFilter;
use crate::screens::{ReportScreen, StudentScreen};

pub const STUDENT_HELP: &str = "Commands: name <text>, class <text>, vaccinated any|yes|no, \
drive <id>|none, search, vaccinate <id>, delete <id>, quit";
pub const REPORT_HELP: &str = "Commands: vaccine <name>|all, limit <n>, page <n>, next, prev, \
export csv|xlsx|pdf|all, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum StudentAction {
    Name(String),
    Class(String),
    Vaccinated(VaccinatedFilter),
    Drive(Option<i64>),
    Search,
    Vaccinate(i64),
    Delete(i64),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReportAction {
    Vaccine(Option<String>),
    Limit(u32),
    Page(u32),
    Next,
    Previous,
    Export(Vec<ExportFormat>),
    Quit,
}

fn split_command(line: &str) -> (String, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word.to_ascii_lowercase(), rest.trim()),
        None => (line.to_ascii_lowercase(), ""),
    }
}

fn number<T: FromStr>(command: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("'{command}' needs a number, got '{value}'"))
}

impl FromStr for StudentAction {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (command, rest) = split_command(line);
        match command.as_str() {
            "name" => Ok(StudentAction::Name(rest.to_string())),
            "class" => Ok(StudentAction::Class(rest.to_string())),
            "vaccinated" => rest.parse().map(StudentAction::Vaccinated),
            "drive" if rest.is_empty() || rest.eq_ignore_ascii_case("none") => {
                Ok(StudentAction::Drive(None))
            }
            "drive" => number(&command, rest).map(|id| StudentAction::Drive(Some(id))),
            "search" => Ok(StudentAction::Search),
            "vaccinate" => number(&command, rest).map(StudentAction::Vaccinate),
            "delete" => number(&command, rest).map(StudentAction::Delete),
            "quit" | "exit" => Ok(StudentAction::Quit),
            other => Err(format!("Unknown command '{other}'. {STUDENT_HELP}")),
        }
    }
}

fn export_formats(value: &str) -> Result<Vec<ExportFormat>, String> {
    match value.to_ascii_lowercase().as_str() {
        "csv" => Ok(vec![ExportFormat::Csv]),
        "xlsx" => Ok(vec![ExportFormat::Xlsx]),
        "pdf" => Ok(vec![ExportFormat::Pdf]),
        "" | "all" => Ok(ExportFormat::ALL.to_vec()),
        other => Err(format!("unknown export format '{other}' (use csv, xlsx, pdf or all)")),
    }
}

impl FromStr for ReportAction {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (command, rest) = split_command(line);
        match command.as_str() {
            "vaccine" if rest.is_empty() || rest.eq_ignore_ascii_case("all") => {
                Ok(ReportAction::Vaccine(None))
            }
            "vaccine" => Ok(ReportAction::Vaccine(Some(rest.to_string()))),
            "limit" => match number(&command, rest)? {
                0 => Err("limit must be at least 1".to_string()),
                limit => Ok(ReportAction::Limit(limit)),
            },
            "page" => number(&command, rest).map(ReportAction::Page),
            "next" => Ok(ReportAction::Next),
            "prev" | "previous" => Ok(ReportAction::Previous),
            "export" => export_formats(rest).map(ReportAction::Export),
            "quit" | "exit" => Ok(ReportAction::Quit),
            other => Err(format!("Unknown command '{other}'. {REPORT_HELP}")),
        }
    }
}

/// Reads student-list commands until `quit` or end of input.
///
/// Failed actions show up as the screen's inline error; they do not end the session.
pub async fn browse_students<B, R, W>(
    screen: &mut StudentScreen<'_, B>,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{STUDENT_HELP}")?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("failed to read command")? {
        if line.trim().is_empty() {
            continue;
        }
        let action = match line.parse::<StudentAction>() {
            Ok(action) => action,
            Err(message) => {
                writeln!(out, "{message}")?;
                continue;
            }
        };
        let outcome = match action {
            StudentAction::Quit => break,
            StudentAction::Name(name) => {
                screen.set_name(&name).await;
                Ok(())
            }
            StudentAction::Class(class) => {
                screen.set_class(&class).await;
                Ok(())
            }
            StudentAction::Vaccinated(vaccinated) => {
                screen.set_vaccinated(vaccinated).await;
                Ok(())
            }
            StudentAction::Drive(drive_id) => screen.select_drive(drive_id).await,
            StudentAction::Search => {
                screen.search().await;
                Ok(())
            }
            StudentAction::Vaccinate(id) => screen.vaccinate(id).await,
            StudentAction::Delete(id) => screen.delete_student(id).await,
        };
        if let Err(err) = outcome {
            log::info!("student command '{}' failed: {err}", line.trim());
        }
        write!(out, "{}", screen.render())?;
    }
    Ok(())
}

/// Reads report commands until `quit` or end of input; exports go to `out_dir`.
pub async fn browse_report<B, R, W>(
    screen: &mut ReportScreen<'_, B>,
    input: R,
    out: &mut W,
    out_dir: &Path,
) -> anyhow::Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{REPORT_HELP}")?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("failed to read command")? {
        if line.trim().is_empty() {
            continue;
        }
        let action = match line.parse::<ReportAction>() {
            Ok(action) => action,
            Err(message) => {
                writeln!(out, "{message}")?;
                continue;
            }
        };
        match action {
            ReportAction::Quit => break,
            ReportAction::Vaccine(name) => {
                if !screen.set_vaccine(name.as_deref()).await {
                    writeln!(out, "Vaccine filter unchanged.")?;
                    continue;
                }
            }
            ReportAction::Limit(limit) => {
                if !screen.set_limit(limit).await {
                    writeln!(out, "Already showing {limit} rows per page.")?;
                    continue;
                }
            }
            ReportAction::Page(page) => {
                if !screen.go_to_page(page).await {
                    writeln!(
                        out,
                        "Page {page} is not available; showing page {} of {}.",
                        screen.page(),
                        screen.total_pages()
                    )?;
                    continue;
                }
            }
            ReportAction::Next => {
                if !screen.next_page().await {
                    writeln!(out, "Already on the last page.")?;
                    continue;
                }
            }
            ReportAction::Previous => {
                if !screen.previous_page().await {
                    writeln!(out, "Already on the first page.")?;
                    continue;
                }
            }
            ReportAction::Export(formats) => {
                match screen.export(out_dir, &formats) {
                    Ok(paths) => {
                        for path in paths {
                            writeln!(out, "Report written to {}.", path.display())?;
                        }
                    }
                    Err(err) => writeln!(out, "Export failed: {err:#}")?,
                }
                continue;
            }
        }
        write!(out, "{}", screen.render())?;
    }
    Ok(())
}
