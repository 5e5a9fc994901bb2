use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand, ValueEnum};

mod api;
mod browse;
mod error;
mod export;
mod models;
mod query;
mod screens;
mod session;
#[cfg(test)]
mod testing;
mod view;

use api::{ApiClient, ApiRequest};
use export::ExportFormat;
use models::{StudentForm, SCHOOL_CLASSES};
use query::{ReportFilters, StudentFilters, VaccinatedFilter, DEFAULT_PAGE_SIZE};
use screens::{DriveScreen, ReportScreen, StudentScreen};
use session::Session;

#[derive(Parser)]
#[command(name = "vax-tracker")]
#[command(about = "School vaccination drive and student record client", long_about = None)]
struct Cli {
    /// Base URL of the vaccination backend
    #[arg(long, env = "VAX_API_URL", default_value = "http://localhost:5000", global = true)]
    api_url: String,
    /// Bearer token; overrides the saved session
    #[arg(long, env = "VAX_TOKEN", global = true)]
    token: Option<String>,
    #[arg(long, env = "VAX_SESSION_FILE", default_value = ".vax-session", global = true)]
    session_file: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the credential
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "VAX_PASSWORD")]
        password: String,
    },
    /// Forget the saved credential
    Logout,
    #[command(flatten)]
    Signed(SignedCommands),
}

/// Commands that need a saved or supplied credential.
#[derive(Subcommand)]
enum SignedCommands {
    /// Vaccination coverage and drive overview
    Dashboard,
    #[command(subcommand)]
    Students(StudentCommands),
    #[command(subcommand)]
    Drives(DriveCommands),
    /// Vaccine names known to the backend
    Vaccines,
    /// One page of the vaccination report, optionally exported
    Report {
        #[arg(long)]
        vaccine: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, value_enum)]
        export: Vec<ExportChoice>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Keep the report open and read paging and export commands from stdin
        #[arg(long, conflicts_with = "export")]
        interactive: bool,
    },
    /// Full report rendered as CSV by the backend
    ReportDownload {
        #[arg(long)]
        vaccine: Option<String>,
        #[arg(long, default_value = "vaccination_report.csv")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum StudentCommands {
    /// List students matching the filters
    List {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        class: String,
        #[arg(long, default_value = "any")]
        vaccinated: VaccinatedFilter,
        /// Drive used for the vaccinated filter and row actions
        #[arg(long)]
        drive: Option<i64>,
        /// Keep the list open and read filter commands from stdin
        #[arg(long)]
        interactive: bool,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        student_id: String,
    },
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        student_id: Option<String>,
    },
    Delete {
        id: i64,
    },
    /// Bulk import from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a vaccination against a drive
    Vaccinate {
        id: i64,
        #[arg(long)]
        drive: i64,
    },
}

#[derive(Subcommand)]
enum DriveCommands {
    List,
    Create {
        #[arg(long)]
        vaccine: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        doses: u32,
        /// Repeat for each applicable class
        #[arg(long = "class", value_parser = PossibleValuesParser::new(SCHOOL_CLASSES))]
        classes: Vec<String>,
    },
    Update {
        id: i64,
        #[arg(long)]
        vaccine: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        doses: Option<u32>,
        /// Replaces the applicable classes when given
        #[arg(long = "class", value_parser = PossibleValuesParser::new(SCHOOL_CLASSES))]
        classes: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportChoice {
    Csv,
    Xlsx,
    Pdf,
    All,
}

impl ExportChoice {
    fn formats(self) -> &'static [ExportFormat] {
        match self {
            ExportChoice::Csv => &[ExportFormat::Csv],
            ExportChoice::Xlsx => &[ExportFormat::Xlsx],
            ExportChoice::Pdf => &[ExportFormat::Pdf],
            ExportChoice::All => &ExportFormat::ALL,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    let mut session = Session::load(&cli.session_file)?;
    if let Some(token) = &cli.token {
        session = Session::with_token(token.clone());
    }

    let command = match cli.command {
        Commands::Login { username, password } => {
            let client = ApiClient::new(&cli.api_url, Session::default());
            let grant = session::login(&client, &username, &password)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message("Login failed.")))?;
            session.init(grant);
            session.save(&cli.session_file)?;
            println!(
                "Signed in as {username} ({}).",
                session.role().unwrap_or("no role")
            );
            return Ok(());
        }
        Commands::Logout => {
            session.teardown();
            session.save(&cli.session_file)?;
            println!("Signed out.");
            return Ok(());
        }
        Commands::Signed(command) => command,
    };

    if !session.is_authenticated() {
        bail!("Please log in first.");
    }
    let client = ApiClient::new(&cli.api_url, session);
    let today = chrono::Local::now().date_naive();

    match command {
        SignedCommands::Dashboard => {
            let summary = screens::load_dashboard(&client)
                .await
                .map_err(anyhow::Error::msg)?;
            print!("{}", view::render_dashboard(&summary));
        }
        SignedCommands::Students(command) => run_students(&client, command).await?,
        SignedCommands::Drives(command) => run_drives(&client, today, command).await?,
        SignedCommands::Vaccines => {
            let vaccines: Vec<String> = api::fetch(&client, &ApiRequest::vaccines())
                .await
                .context("failed to load vaccine names")?;
            if vaccines.is_empty() {
                println!("No vaccines recorded.");
            }
            for vaccine in vaccines {
                println!("- {vaccine}");
            }
        }
        SignedCommands::Report {
            vaccine,
            page,
            limit,
            export,
            out_dir,
            interactive,
        } => {
            let filters = ReportFilters {
                vaccine_name: vaccine.filter(|name| !name.trim().is_empty()),
                page: 1,
                limit: limit.max(1),
            };
            let mut screen = ReportScreen::new(&client, filters);
            screen.mount().await;
            if page != screen.page() && !screen.go_to_page(page).await {
                println!(
                    "Page {page} is out of range; showing page {} of {}.",
                    screen.page(),
                    screen.total_pages()
                );
            }
            print!("{}", screen.render());
            if interactive {
                let input = tokio::io::BufReader::new(tokio::io::stdin());
                browse::browse_report(&mut screen, input, &mut std::io::stdout(), &out_dir).await?;
                return Ok(());
            }
            if let Some(message) = screen.records().load_error() {
                bail!("{message}");
            }
            if let Some(total) = screen.total_items() {
                println!("{total} records in total.");
            }

            let mut formats: Vec<ExportFormat> = Vec::new();
            for format in export.iter().flat_map(|choice| choice.formats()) {
                if !formats.contains(format) {
                    formats.push(*format);
                }
            }
            if !formats.is_empty() {
                for path in screen.export(&out_dir, &formats)? {
                    println!("Report written to {}.", path.display());
                }
            }
        }
        SignedCommands::ReportDownload { vaccine, out } => {
            let bytes = screens::download_report(&client, vaccine.as_deref())
                .await
                .context("failed to download report")?;
            std::fs::write(&out, bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn run_students(client: &ApiClient, command: StudentCommands) -> anyhow::Result<()> {
    let filters = match &command {
        StudentCommands::List {
            name,
            class,
            vaccinated,
            drive,
            ..
        } => StudentFilters {
            name: name.clone(),
            class: class.clone(),
            vaccinated: *vaccinated,
            drive_id: *drive,
        },
        StudentCommands::Vaccinate { drive, .. } => StudentFilters {
            drive_id: Some(*drive),
            ..StudentFilters::default()
        },
        _ => StudentFilters::default(),
    };
    let mut screen = StudentScreen::new(client, filters);
    if let Err(err) = screen.mount().await {
        print!("{}", screen.render());
        return Err(err).context("could not open the student list");
    }
    if let StudentCommands::List {
        interactive: true, ..
    } = command
    {
        print!("{}", screen.render());
        let input = tokio::io::BufReader::new(tokio::io::stdin());
        return browse::browse_students(&mut screen, input, &mut std::io::stdout()).await;
    }

    let outcome = match command {
        StudentCommands::List { .. } => Ok(()),
        StudentCommands::Add {
            name,
            class,
            student_id,
        } => {
            let form = StudentForm {
                name,
                student_class: class,
                student_id,
            };
            screen.add_student(&form).await
        }
        StudentCommands::Edit {
            id,
            name,
            class,
            student_id,
        } => match screen.begin_edit(id) {
            Ok(()) => {
                if let Some(form) = screen.edit_form_mut() {
                    if let Some(name) = name {
                        form.name = name;
                    }
                    if let Some(class) = class {
                        form.student_class = class;
                    }
                    if let Some(student_id) = student_id {
                        form.student_id = student_id;
                    }
                }
                screen.save_edit().await
            }
            Err(err) => Err(err),
        },
        StudentCommands::Delete { id } => screen.delete_student(id).await,
        StudentCommands::Import { csv } => {
            let bytes = std::fs::read(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let file_name = csv
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "students.csv".to_string());
            screen.import_csv(Some((file_name, bytes))).await
        }
        StudentCommands::Vaccinate { id, .. } => screen.vaccinate(id).await,
    };

    print!("{}", screen.render());
    outcome.context("student action failed")?;
    if let Some(message) = screen.students().load_error() {
        bail!("{message}");
    }
    Ok(())
}

async fn run_drives(
    client: &ApiClient,
    today: NaiveDate,
    command: DriveCommands,
) -> anyhow::Result<()> {
    let mut screen = DriveScreen::new(client, today);
    screen.refresh().await;

    let outcome = match command {
        DriveCommands::List => Ok(()),
        DriveCommands::Create {
            vaccine,
            date,
            doses,
            classes,
        } => {
            let form = screen.form_mut();
            form.vaccine_name = vaccine;
            form.date = Some(date);
            form.available_doses = Some(doses);
            for class in &classes {
                form.toggle_class(class, true);
            }
            screen.submit().await
        }
        DriveCommands::Update {
            id,
            vaccine,
            date,
            doses,
            classes,
        } => match screen.begin_edit(id) {
            Ok(()) => {
                let form = screen.form_mut();
                if let Some(vaccine) = vaccine {
                    form.vaccine_name = vaccine;
                }
                if date.is_some() {
                    form.date = date;
                }
                if doses.is_some() {
                    form.available_doses = doses;
                }
                if !classes.is_empty() {
                    form.applicable_classes.clear();
                    for class in &classes {
                        form.toggle_class(class, true);
                    }
                }
                screen.submit().await
            }
            Err(err) => Err(err),
        },
    };

    print!("{}", screen.render());
    outcome.context("drive action failed")?;
    if let Some(message) = screen.drives().load_error() {
        bail!("{message}");
    }
    Ok(())
}
