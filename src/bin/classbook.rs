/// Command-line front end for a classbook on this device.
///
/// Edits are saved locally; `push` and `pull` copy the whole document to or
/// from the sync API and ask before overwriting anything.
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use classbook::config::ClientConfig;
use classbook::models::document::{Document, Semester};
use classbook::models::student::{AttendanceStatus, BehaviorKind, Gender, NewStudent};
use classbook::services::cloud_http::HttpCloudStore;
use classbook::services::local_store::LocalStore;
use classbook::services::reports::{student_summaries, CsvGradeSheet, Renderer};
use classbook::services::session::{
    identity_from_token, load_live_session, save_session_file, AuthSession, SESSION_FILE,
};
use classbook::services::sync::{ConfirmRequest, StatusKind, SyncCoordinator, SyncReport};

type Coordinator = SyncCoordinator<LocalStore, HttpCloudStore>;

#[derive(Parser)]
#[command(name = "classbook", about = "Attendance, behavior and grades for one teacher")]
struct Cli {
    /// Data directory (overrides CLASSBOOK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show what is stored locally and the sign-in state
    Status,
    #[command(subcommand)]
    Student(StudentCommand),
    /// Record attendance for a student
    Attendance {
        student: String,
        status: AttendanceStatus,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        period: Option<u8>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record a behavior note
    Behavior {
        student: String,
        #[arg(long)]
        kind: BehaviorKind,
        description: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        points: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        period: Option<u8>,
    },
    /// Record a score against an assessment tool
    Grade {
        student: String,
        /// Tool id or name
        tool: String,
        score: f64,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Defaults to the document's current semester
        #[arg(long)]
        semester: Option<Semester>,
    },
    #[command(subcommand)]
    Tool(ToolCommand),
    #[command(subcommand)]
    Class(ClassCommand),
    /// Store a bearer token issued for this device
    Login {
        #[arg(long)]
        token: String,
    },
    Logout,
    /// Overwrite the cloud copy with local data
    Push {
        #[arg(long)]
        yes: bool,
    },
    /// Overwrite local data with the cloud copy
    Pull {
        #[arg(long)]
        yes: bool,
    },
    /// Grade sheet for a class as CSV
    Report {
        #[arg(long)]
        class: String,
        #[arg(long)]
        semester: Option<Semester>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Erase all local data
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Set the semester new grades default to
    Semester { semester: Semester },
    /// Update the header printed on reports and certificates
    Teacher {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        school: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        governorate: Option<String>,
    },
    #[command(subcommand)]
    Group(GroupCommand),
}

#[derive(Subcommand)]
enum GroupCommand {
    Add {
        name: String,
        /// Student id or name; repeat for several
        #[arg(long = "member")]
        members: Vec<String>,
    },
    List,
    Delete {
        group: String,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    Add {
        name: String,
        /// Class label; repeat for several
        #[arg(long = "class", required = true)]
        classes: Vec<String>,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        parent_phone: Option<String>,
        #[arg(long)]
        gender: Option<Gender>,
    },
    List {
        #[arg(long)]
        class: Option<String>,
    },
    Delete {
        student: String,
    },
}

#[derive(Subcommand)]
enum ToolCommand {
    Add {
        name: String,
        #[arg(long)]
        max: f64,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
    List,
}

#[derive(Subcommand)]
enum ClassCommand {
    Add { label: String },
    Hide {
        label: String,
        /// Show the class again
        #[arg(long)]
        undo: bool,
    },
    List {
        /// Include hidden classes
        #[arg(long)]
        all: bool,
    },
}

/// Finds a student by id, or by a name that matches exactly one student.
fn resolve_student(doc: &Document, key: &str) -> anyhow::Result<String> {
    if let Some(student) = doc.student(key) {
        return Ok(student.id.clone());
    }
    let matches: Vec<_> = doc
        .students
        .iter()
        .filter(|s| s.name.eq_ignore_ascii_case(key.trim()))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => anyhow::bail!("No student matches '{key}'"),
        _ => anyhow::bail!("'{key}' matches {} students; use the id", matches.len()),
    }
}

fn resolve_tool(doc: &Document, key: &str) -> anyhow::Result<String> {
    doc.assessment_tools
        .iter()
        .find(|t| t.id == key || t.name.eq_ignore_ascii_case(key.trim()))
        .map(|t| t.id.clone())
        .ok_or_else(|| anyhow::anyhow!("No assessment tool matches '{key}'"))
}

fn prompt(request: &ConfirmRequest) -> bool {
    print!("{} [y/N] ", request.prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn confirm_with(yes: bool) -> impl FnOnce(&ConfirmRequest) -> bool {
    move |request| yes || prompt(request)
}

fn print_report(report: &SyncReport) -> anyhow::Result<()> {
    match report.status.kind {
        StatusKind::Error => anyhow::bail!("{}", report.status.text),
        _ => {
            println!("{}", report.status.text);
            Ok(())
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn status(coordinator: &Coordinator) {
    coordinator.read(|doc| {
        println!(
            "{} students, {} classes, semester {}, academic year {}",
            doc.students.len(),
            doc.visible_classes().count(),
            doc.current_semester,
            doc.teacher_info.academic_year
        );
    });
    if let Some(source) = coordinator.loaded_from() {
        println!("Loaded from {source}");
    }
    match coordinator.auth().current() {
        Some(identity) => {
            println!("Signed in as {}", identity.display_name());
            match coordinator.cloud_last_updated().await {
                Ok(Some(at)) => println!("Cloud copy last updated {at}"),
                Ok(None) => println!("No cloud copy yet"),
                Err(e) => println!("Cloud unavailable: {e}"),
            }
        }
        None => println!("Not signed in"),
    }
}

async fn run(cli: Cli, config: ClientConfig) -> anyhow::Result<()> {
    let data_dir = cli.data_dir.unwrap_or(config.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let session_path = data_dir.join(SESSION_FILE);

    let auth = AuthSession::new(load_live_session(&session_path, chrono::Utc::now())?);

    let cloud = HttpCloudStore::new(&config.cloud_url, auth.clone(), config.http_timeout)?;
    let coordinator = SyncCoordinator::open(
        LocalStore::in_dir(&data_dir),
        cloud,
        auth.clone(),
        config.save_debounce,
    );

    match cli.command {
        Command::Status => status(&coordinator).await,
        Command::Student(StudentCommand::Add {
            name,
            classes,
            grade,
            parent_phone,
            gender,
        }) => {
            let id = coordinator.apply(|e| {
                e.add_student(NewStudent {
                    name,
                    classes,
                    grade,
                    parent_phone,
                    gender,
                })
            })?;
            println!("{id}");
        }
        Command::Student(StudentCommand::List { class }) => coordinator.read(|doc| {
            for s in doc
                .students
                .iter()
                .filter(|s| class.as_deref().map_or(true, |c| s.in_class(c)))
            {
                println!("{}\t{}\t{}", s.id, s.name, s.classes.join(","));
            }
        }),
        Command::Student(StudentCommand::Delete { student }) => {
            let id = coordinator.read(|doc| resolve_student(doc, &student))?;
            let removed = coordinator.apply(|e| e.delete_student(&id))?;
            println!("Deleted {}", removed.name);
        }
        Command::Attendance {
            student,
            status,
            date,
            period,
            note,
        } => {
            let id = coordinator.read(|doc| resolve_student(doc, &student))?;
            coordinator.apply(|e| {
                e.record_attendance(&id, date.unwrap_or_else(today), status, period, note)
            })?;
        }
        Command::Behavior {
            student,
            kind,
            description,
            points,
            date,
            period,
        } => {
            let id = coordinator.read(|doc| resolve_student(doc, &student))?;
            coordinator.apply(|e| {
                e.record_behavior(&id, date.unwrap_or_else(today), kind, &description, period, points)
            })?;
        }
        Command::Grade {
            student,
            tool,
            score,
            date,
            semester,
        } => {
            let (id, tool_id, current) = coordinator.read(|doc| {
                anyhow::Ok((
                    resolve_student(doc, &student)?,
                    resolve_tool(doc, &tool)?,
                    doc.current_semester,
                ))
            })?;
            coordinator.apply(|e| {
                e.record_grade(
                    &id,
                    &tool_id,
                    score,
                    date.unwrap_or_else(today),
                    semester.unwrap_or(current),
                )
            })?;
        }
        Command::Tool(ToolCommand::Add { name, max, weight }) => {
            let id = coordinator.apply(|e| e.add_assessment_tool(&name, max, weight))?;
            println!("{id}");
        }
        Command::Tool(ToolCommand::List) => coordinator.read(|doc| {
            for t in &doc.assessment_tools {
                println!("{}\t{}\t/{}\tx{}", t.id, t.name, t.max_score, t.weight);
            }
        }),
        Command::Class(ClassCommand::Add { label }) => {
            coordinator.apply(|e| e.add_class(&label))?;
        }
        Command::Class(ClassCommand::Hide { label, undo }) => {
            coordinator.apply(|e| {
                e.set_class_hidden(&label, !undo);
                Ok(())
            })?;
        }
        Command::Class(ClassCommand::List { all }) => coordinator.read(|doc| {
            for class in &doc.classes {
                let hidden = doc.hidden_classes.contains(class);
                if hidden && !all {
                    continue;
                }
                let count = doc.students_in(class).count();
                let marker = if hidden { " (hidden)" } else { "" };
                println!("{class}\t{count}{marker}");
            }
        }),
        Command::Login { token } => {
            let identity = identity_from_token(token.trim()).context("invalid token")?;
            save_session_file(&session_path, Some(&identity))?;
            println!("Signed in as {}", identity.display_name());
            auth.sign_in(identity);
        }
        Command::Logout => {
            save_session_file(&session_path, None)?;
            auth.sign_out();
            println!("Signed out");
        }
        Command::Push { yes } => {
            // The cloud copy should match what is on disk.
            coordinator.flush().await?;
            print_report(&coordinator.upload(confirm_with(yes)).await)?;
        }
        Command::Pull { yes } => {
            print_report(&coordinator.download(confirm_with(yes)).await)?;
        }
        Command::Report {
            class,
            semester,
            out,
        } => {
            let doc = coordinator.snapshot();
            let semester = semester.unwrap_or(doc.current_semester);
            if student_summaries(&doc, &class, semester).is_empty() {
                tracing::warn!("Class {} has no students", class);
            }
            let bytes = CsvGradeSheet { class, semester }.render(&doc)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => io::stdout().write_all(&bytes)?,
            }
        }
        Command::Reset { yes } => {
            print_report(&coordinator.reset_all(confirm_with(yes)).await)?;
        }
        Command::Semester { semester } => {
            coordinator.apply(|e| {
                e.set_current_semester(semester);
                Ok(())
            })?;
        }
        Command::Teacher {
            name,
            school,
            subject,
            governorate,
        } => {
            let mut profile = coordinator.read(|doc| doc.teacher_info.clone());
            if let Some(name) = name {
                profile.name = name;
            }
            if let Some(school) = school {
                profile.school = school;
            }
            if let Some(subject) = subject {
                profile.subject = subject;
            }
            if let Some(governorate) = governorate {
                profile.governorate = governorate;
            }
            println!("{} ({}, {})", profile.name, profile.school, profile.academic_year);
            coordinator.apply(|e| {
                e.update_teacher_info(profile);
                Ok(())
            })?;
        }
        Command::Group(GroupCommand::Add { name, members }) => {
            let ids = coordinator.read(|doc| {
                members
                    .iter()
                    .map(|m| resolve_student(doc, m))
                    .collect::<anyhow::Result<Vec<_>>>()
            })?;
            let id = coordinator.apply(|e| {
                let id = e.add_group(&name)?;
                e.set_group_members(&id, ids)?;
                Ok(id)
            })?;
            println!("{id}");
        }
        Command::Group(GroupCommand::List) => coordinator.read(|doc| {
            for g in &doc.groups {
                let names: Vec<&str> = g
                    .student_ids
                    .iter()
                    .filter_map(|id| doc.student(id).map(|s| s.name.as_str()))
                    .collect();
                println!("{}\t{}\t{}", g.id, g.name, names.join(", "));
            }
        }),
        Command::Group(GroupCommand::Delete { group }) => {
            let id = coordinator.read(|doc| {
                doc.groups
                    .iter()
                    .find(|g| g.id == group || g.name.eq_ignore_ascii_case(group.trim()))
                    .map(|g| g.id.clone())
                    .ok_or_else(|| anyhow::anyhow!("No group matches '{group}'"))
            })?;
            coordinator.apply(|e| e.delete_group(&id))?;
        }
    }

    coordinator.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    run(cli, config).await
}
