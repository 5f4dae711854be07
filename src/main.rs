use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod attendance;
mod config;
mod dashboard;
mod filters;
mod finance;
mod guard;
mod models;
mod progression;
mod report;
mod session;

use api::resources::{
    ChangePassword, ClassInput, DailyReportQuery, LoginRequest, StudentInput, TeacherAccount,
    TeacherInput, UserUpdate,
};
use api::{ApiClient, ApiError};
use attendance::AttendanceReportView;
use config::Config;
use filters::{AttendanceFilter, StudentFilter};
use finance::TransactionInput;
use guard::SubmissionDraft;
use models::{
    AttendanceStatus, ClassRecord, FinanceTransaction, Part, Purpose, Shift, StudentRecord, Teacher,
};
use progression::ProgressRequest;
use session::{Role, Session, SessionStore};

#[derive(Parser)]
#[command(name = "school-admin")]
#[command(about = "Student, attendance and finance administration for a school backend", long_about = None)]
struct Cli {
    /// Backend base URL (overrides SCHOOL_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Log requests to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = Role::Admin)]
        role: Role,
    },
    /// Forget the stored session
    Logout,
    /// Verify the stored session with the backend
    Whoami,
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Headline numbers for today
    Dashboard,
    Students {
        #[command(subcommand)]
        action: StudentCommand,
    },
    Teachers {
        #[command(subcommand)]
        action: TeacherCommand,
    },
    Classes {
        #[command(subcommand)]
        action: ClassCommand,
    },
    Attendance {
        #[command(subcommand)]
        action: AttendanceCommand,
    },
    Finance {
        #[command(subcommand)]
        action: FinanceCommand,
    },
    Users {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Move English-track students to their next part
    Progress {
        /// Only promote students currently in these parts
        #[arg(long = "from", value_delimiter = ',')]
        from_parts: Vec<Part>,
        /// Show who would move without calling the backend
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a config file with default values
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

#[derive(Subcommand)]
enum StudentCommand {
    List {
        #[arg(long)]
        search: Option<String>,
        /// Use the backend name search instead of filtering locally
        #[arg(long, requires = "search")]
        remote: bool,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        shift: Option<Shift>,
        #[arg(long)]
        part: Option<Part>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        shift: Shift,
        #[arg(long, default_value = "None")]
        part: Part,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        emergency_phone: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        shift: Option<Shift>,
        #[arg(long)]
        part: Option<Part>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        emergency_phone: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum TeacherCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long)]
        class: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Make this teacher the teacher of record for a class
        #[arg(long)]
        class: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum ClassCommand {
    List,
    Add {
        #[arg(long)]
        number: i64,
        #[arg(long)]
        name: String,
    },
    Update {
        id: String,
        #[arg(long)]
        number: i64,
        #[arg(long)]
        name: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum AttendanceCommand {
    /// Record a class session; everyone starts Present unless a session exists
    Mark {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_delimiter = ',')]
        present: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        absent: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        late: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        excused: Vec<String>,
    },
    /// Show the session already recorded for a class and date
    Show {
        #[arg(long)]
        class: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Summarise attendance over a date range
    Report {
        /// Backend-side class scope (class id)
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Local filter on class name
        #[arg(long)]
        class_name: Option<String>,
        #[arg(long)]
        shift: Option<Shift>,
        #[arg(long)]
        part: Option<Part>,
        #[arg(long)]
        status: Option<AttendanceStatus>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also export the filtered records as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FinanceCommand {
    /// All transactions with total, monthly and weekly income
    List,
    Add {
        #[arg(long)]
        student: String,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        month: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "Tuition")]
        purpose: Purpose,
        #[arg(long)]
        date_paid: Option<NaiveDate>,
    },
    Update {
        id: String,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        purpose: Option<Purpose>,
        #[arg(long)]
        date_paid: Option<NaiveDate>,
    },
    Delete {
        id: String,
    },
    /// Purpose breakdown for one month, or the month trend for a year
    Report {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    PaymentStatus {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Payment history of one student
    Student {
        id: String,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    List,
    CreateTeacher {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Update {
        id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        teacher: Option<String>,
    },
    Delete {
        id: String,
    },
    /// Teachers that have no login yet
    Unlinked,
}

struct App {
    store: SessionStore,
    session: Option<Session>,
    client: ApiClient,
}

impl App {
    fn session(&self) -> anyhow::Result<&Session> {
        self.session
            .as_ref()
            .context("Not logged in. Run `school-admin login` first.")
    }

    fn admin(&self) -> anyhow::Result<&Session> {
        let session = self.session()?;
        if !session.user.is_admin() {
            bail!("This command is only available to admins.");
        }
        Ok(session)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "school_admin=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_or_print(out: Option<&PathBuf>, text: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = config::config_path()?;
    if let Commands::Config { action } = &cli.command {
        return run_config(action, &config_path, cli.api_url.clone());
    }

    let config = Config::resolve(&config_path, cli.api_url.clone())?;
    let store = SessionStore::new(config.session_path()?);
    let session = store.load()?;
    let client = ApiClient::new(&config.api, session.as_ref())?;
    let app = App {
        store,
        session,
        client,
    };

    let result = run(&app, cli.command).await;
    if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<ApiError>()) {
        warn!(kind = err.label(), status = ?err.status(), "request failed");
        if matches!(err, ApiError::SessionExpired) {
            app.store.clear()?;
        }
    }
    result
}

fn run_config(
    action: &ConfigCommand,
    path: &std::path::Path,
    api_url: Option<String>,
) -> anyhow::Result<()> {
    match action {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save_to(path)?;
            println!("Config written to {}.", path.display());
        }
        ConfigCommand::Show => {
            let config = Config::resolve(path, api_url)?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config).context("serialize config")?);
            println!("# session file: {}", config.session_path()?.display());
        }
    }
    Ok(())
}

async fn run(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Config { .. } => Ok(()),
        Commands::Login {
            email,
            password,
            role,
        } => {
            let response = app
                .client
                .login(&LoginRequest {
                    email,
                    password,
                    role,
                })
                .await?;
            let session = Session::from(response);
            app.store.save(&session)?;
            info!(user = %session.user.id, path = %app.store.path().display(), "session stored");
            println!(
                "Logged in to {} as {} ({}).",
                app.client.base_url(),
                session.user.name,
                session.user.role
            );
            Ok(())
        }
        Commands::Logout => {
            app.store.clear()?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Whoami => {
            app.session()?;
            match app.client.current_user().await? {
                Some(user) if !user.id.is_empty() => {
                    println!("{} <{}> ({})", user.name, user.email, user.role);
                    if let Some(class_id) = user.class_id() {
                        println!("Class: {class_id}");
                    }
                    Ok(())
                }
                _ => {
                    app.store.clear()?;
                    bail!("Stored session is no longer valid. Please login again.");
                }
            }
        }
        Commands::ChangePassword { current, new } => {
            app.session()?;
            app.client
                .change_password(&ChangePassword {
                    current_password: current,
                    new_password: new,
                })
                .await?;
            println!("Password changed.");
            Ok(())
        }
        Commands::Dashboard => {
            let session = app.session()?;
            let snapshot = dashboard::fetch_snapshot(&app.client)
                .await
                .context("Failed to load dashboard data")?;
            let stats = dashboard::compute(&snapshot, today(), session.user.scoped_class());
            print!("{}", report::format_dashboard(&stats, session.user.is_admin()));
            Ok(())
        }
        Commands::Students { action } => run_students(app, action).await,
        Commands::Teachers { action } => run_teachers(app, action).await,
        Commands::Classes { action } => run_classes(app, action).await,
        Commands::Attendance { action } => run_attendance(app, action).await,
        Commands::Finance { action } => run_finance(app, action).await,
        Commands::Users { action } => run_users(app, action).await,
        Commands::Progress {
            from_parts,
            dry_run,
        } => {
            app.admin()?;
            let students = app.client.list::<StudentRecord>().await?;
            let promotions = progression::preview(&students, &from_parts);
            if promotions.is_empty() {
                println!("No students to promote.");
                return Ok(());
            }
            for (transition, count) in progression::tally(&promotions) {
                println!("- {transition}: {count}");
            }
            if dry_run {
                for promotion in promotions.iter() {
                    println!("  {} ({} -> {})", promotion.name, promotion.from, promotion.to);
                }
                return Ok(());
            }

            let outcome = app
                .client
                .progress_english_parts(&ProgressRequest { from_parts })
                .await?;
            info!(updated = outcome.updated, "english parts progressed");
            println!("{} ({} students updated)", outcome.message, outcome.updated);
            for (transition, count) in outcome.details.iter() {
                println!("- {transition}: {count}");
            }
            Ok(())
        }
    }
}

async fn run_students(app: &App, action: StudentCommand) -> anyhow::Result<()> {
    match action {
        StudentCommand::List {
            search,
            remote,
            class,
            shift,
            part,
        } => {
            let session = app.session()?;
            let students = if remote {
                let name = search.clone().unwrap_or_default();
                app.client.search_students(&name).await?
            } else {
                app.client.list::<StudentRecord>().await?
            };

            let filter = StudentFilter {
                search: if remote { None } else { search },
                class_id: session.user.scoped_class().map(str::to_string).or(class),
                shift,
                part,
            };
            let matching = filter.apply(&students);
            if matching.is_empty() {
                println!("No students found.");
                return Ok(());
            }
            for student in matching {
                let shift = student.shift.map(|s| s.label()).unwrap_or("-");
                let mut line = format!(
                    "{}  {}  {}  {}",
                    student.id,
                    student.full_name,
                    student.class_name().or(student.class_id()).unwrap_or("N/A"),
                    shift
                );
                if student.part != Part::None {
                    line.push_str(&format!("  {}", student.part));
                }
                if !student.phone.is_empty() {
                    line.push_str(&format!("  {}", student.phone));
                }
                println!("{line}");
            }
            Ok(())
        }
        StudentCommand::Add {
            name,
            class,
            shift,
            part,
            phone,
            emergency_phone,
        } => {
            app.admin()?;
            let classes = app.client.list::<ClassRecord>().await?;
            let input = StudentInput {
                full_name: name,
                class_id: class,
                shift,
                part,
                phone,
                emergency_phone,
            };
            let target = classes.iter().find(|c| c.id == input.class_id);
            let input = input.for_class(target);
            app.client.create::<StudentRecord, _>(&input).await?;
            info!(class = %input.class_id, "student created");
            println!("Student {} added.", input.full_name);
            Ok(())
        }
        StudentCommand::Update {
            id,
            name,
            class,
            shift,
            part,
            phone,
            emergency_phone,
        } => {
            app.admin()?;
            let (students, classes) = tokio::try_join!(
                app.client.list::<StudentRecord>(),
                app.client.list::<ClassRecord>(),
            )?;
            let current = students
                .iter()
                .find(|s| s.id == id)
                .with_context(|| format!("No student with id {id}"))?;
            let class_id = class
                .or_else(|| current.class_id().map(str::to_string))
                .context("Student has no class; pass --class")?;
            let input = StudentInput {
                full_name: name.unwrap_or_else(|| current.full_name.clone()),
                class_id,
                shift: shift.or(current.shift).unwrap_or(Shift::Morning),
                part: part.unwrap_or(current.part),
                phone: phone.unwrap_or_else(|| current.phone.clone()),
                emergency_phone: emergency_phone.unwrap_or_else(|| current.emergency_phone.clone()),
            };
            let target = classes.iter().find(|c| c.id == input.class_id);
            let input = input.for_class(target);
            app.client.update::<StudentRecord, _>(&id, &input).await?;
            info!(student = %id, "student updated");
            println!("Student {} updated.", input.full_name);
            Ok(())
        }
        StudentCommand::Delete { id } => {
            app.admin()?;
            app.client.remove::<StudentRecord>(&id).await?;
            println!("Student {id} deleted.");
            Ok(())
        }
    }
}

async fn run_teachers(app: &App, action: TeacherCommand) -> anyhow::Result<()> {
    app.admin()?;
    match action {
        TeacherCommand::List => {
            let teachers = app.client.list::<Teacher>().await?;
            if teachers.is_empty() {
                println!("No teachers found.");
            }
            for teacher in teachers.iter() {
                let class = teacher
                    .class
                    .as_ref()
                    .map(|c| c.populated().map(|c| c.name.as_str()).unwrap_or(c.id()))
                    .unwrap_or("unassigned");
                println!("{}  {}  {}  {}", teacher.id, teacher.full_name, teacher.email, class);
            }
            Ok(())
        }
        TeacherCommand::Add {
            name,
            email,
            phone,
            class,
        } => {
            let input = TeacherInput {
                full_name: Some(name),
                email: Some(email),
                phone: Some(phone),
                class_id: class,
            };
            app.client.create::<Teacher, _>(&input).await?;
            println!("Teacher added.");
            Ok(())
        }
        TeacherCommand::Update {
            id,
            name,
            email,
            phone,
            class,
        } => {
            let input = TeacherInput {
                full_name: name,
                email,
                phone,
                class_id: class,
            };
            app.client.update::<Teacher, _>(&id, &input).await?;
            info!(teacher = %id, "teacher updated");
            println!("Teacher {id} updated.");
            Ok(())
        }
        TeacherCommand::Delete { id } => {
            app.client.remove::<Teacher>(&id).await?;
            println!("Teacher {id} deleted.");
            Ok(())
        }
    }
}

async fn run_classes(app: &App, action: ClassCommand) -> anyhow::Result<()> {
    app.admin()?;
    match action {
        ClassCommand::List => {
            let (classes, students, teachers) = tokio::try_join!(
                app.client.list::<ClassRecord>(),
                app.client.list::<StudentRecord>(),
                app.client.list::<Teacher>(),
            )?;
            if classes.is_empty() {
                println!("No classes found.");
            }
            for class in classes.iter() {
                let enrolled = students.iter().filter(|s| s.in_class(&class.id)).count();
                let teacher = teachers
                    .iter()
                    .find(|t| t.teaches(&class.id))
                    .map(|t| t.full_name.as_str())
                    .unwrap_or("no teacher");
                let number = class.class_number.map(|n| n.to_string()).unwrap_or_default();
                println!(
                    "{}  #{}  {}  {} students  {}",
                    class.id, number, class.name, enrolled, teacher
                );
            }
            Ok(())
        }
        ClassCommand::Add { number, name } => {
            let input = ClassInput {
                class_number: number,
                name,
            };
            app.client.create::<ClassRecord, _>(&input).await?;
            println!("Class {} added.", input.name);
            Ok(())
        }
        ClassCommand::Update { id, number, name } => {
            let input = ClassInput {
                class_number: number,
                name,
            };
            app.client.update::<ClassRecord, _>(&id, &input).await?;
            println!("Class {id} updated.");
            Ok(())
        }
        ClassCommand::Delete { id } => {
            app.client.remove::<ClassRecord>(&id).await?;
            println!("Class {id} deleted.");
            Ok(())
        }
    }
}

async fn run_attendance(app: &App, action: AttendanceCommand) -> anyhow::Result<()> {
    match action {
        AttendanceCommand::Mark {
            class,
            teacher,
            date,
            present,
            absent,
            late,
            excused,
        } => {
            let session = app.session()?;
            let user = &session.user;
            let class_id = class.or_else(|| user.scoped_class().map(str::to_string));
            let teacher_id = teacher.or_else(|| {
                user.teacher_id()
                    .filter(|_| user.is_teacher())
                    .map(str::to_string)
            });
            let date = date.unwrap_or_else(today);
            let (selected_class, _) =
                guard::require_selection(class_id.as_deref(), teacher_id.as_deref())?;

            let (students, teachers) = tokio::try_join!(
                app.client.list::<StudentRecord>(),
                app.client.list::<Teacher>(),
            )?;
            let existing = app.client.attendance_for(selected_class, date).await?;

            let mut marks: HashMap<String, AttendanceStatus> = match &existing {
                Some(recorded) => recorded
                    .students
                    .iter()
                    .filter_map(|entry| entry.student_id().map(|id| (id.to_string(), entry.status)))
                    .collect(),
                None => students
                    .iter()
                    .filter(|s| s.in_class(selected_class))
                    .map(|s| (s.id.clone(), AttendanceStatus::Present))
                    .collect(),
            };
            let overrides = [
                (present, AttendanceStatus::Present),
                (absent, AttendanceStatus::Absent),
                (late, AttendanceStatus::Late),
                (excused, AttendanceStatus::Excused),
            ];
            for (ids, status) in overrides {
                for id in ids {
                    marks.insert(id, status);
                }
            }

            let draft = SubmissionDraft {
                class_id,
                teacher_id,
                date,
                marks,
            };
            let payload = guard::prepare_submission(&draft, user, &teachers, &students)?;
            app.client
                .submit_attendance(&payload, existing.is_some())
                .await
                .context("Failed to save attendance")?;
            info!(class = %payload.class_id, %date, updated = existing.is_some(), "attendance saved");
            println!(
                "Attendance {} for {}: {} present, {} absent, {} late, {} excused.",
                if existing.is_some() { "updated" } else { "recorded" },
                date,
                payload.count(AttendanceStatus::Present),
                payload.count(AttendanceStatus::Absent),
                payload.count(AttendanceStatus::Late),
                payload.count(AttendanceStatus::Excused)
            );
            Ok(())
        }
        AttendanceCommand::Show { class, date } => {
            app.session()?;
            let date = date.unwrap_or_else(today);
            match app.client.attendance_for(&class, date).await? {
                Some(recorded) => {
                    println!("{} on {}", recorded.class_name(), date);
                    for entry in recorded.students.iter() {
                        let name = entry
                            .student
                            .as_ref()
                            .map(|s| s.populated().map(|p| p.full_name.as_str()).unwrap_or(s.id()))
                            .unwrap_or("Unknown");
                        println!("- {name}: {}", entry.status);
                    }
                }
                None => println!("No attendance recorded for this class on {date}."),
            }
            Ok(())
        }
        AttendanceCommand::Report {
            class,
            start,
            end,
            class_name,
            shift,
            part,
            status,
            out,
            csv,
        } => {
            app.admin()?;
            let end = end.unwrap_or_else(today);
            let start = start.unwrap_or(end - Duration::days(30));
            if start > end {
                bail!("Start date {start} is after end date {end}");
            }
            let sessions = app
                .client
                .attendance_daily_report(&DailyReportQuery {
                    class_id: class.clone(),
                    start,
                    end,
                })
                .await
                .context("Failed to load attendance report")?;

            let mut view = AttendanceReportView::new(sessions);
            let part = match part {
                Some(part) if !filters::part_filter_visible(class_name.as_deref(), Some(view.summary())) => {
                    warn!(%part, "no English-class students in this report, ignoring part filter");
                    None
                }
                other => other,
            };
            view.set_filter(AttendanceFilter {
                class_name,
                shift,
                part,
                status,
            });

            let scope = view
                .sessions()
                .first()
                .filter(|_| class.is_some())
                .map(|s| s.class_name().to_string());
            let mut text = report::build_attendance_report(
                scope.as_deref(),
                start,
                end,
                view.filter(),
                view.summary(),
            );
            if !view.filter().is_empty() {
                let filtered_records = view.summary().records.len();
                let export = view.summary().records.clone();
                view.clear_filters();
                text.push_str(&format!(
                    "\n{} of {} records matched the filters; unfiltered average attendance {}%.\n",
                    filtered_records,
                    view.summary().records.len(),
                    view.summary().average_attendance
                ));
                write_csv(csv.as_ref(), &export)?;
            } else {
                write_csv(csv.as_ref(), &view.summary().records)?;
            }
            write_or_print(out.as_ref(), &text)?;
            Ok(())
        }
    }
}

fn write_csv(path: Option<&PathBuf>, records: &[attendance::AttendanceRecord]) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let written = report::write_attendance_csv(file, records)?;
    println!("Exported {written} records to {}.", path.display());
    Ok(())
}

async fn run_finance(app: &App, action: FinanceCommand) -> anyhow::Result<()> {
    app.admin()?;
    match action {
        FinanceCommand::List => {
            let transactions = app.client.list::<FinanceTransaction>().await?;
            let summary = finance::live_summary(&transactions, today());
            print!("{}", report::format_transactions(&transactions, &summary));
            Ok(())
        }
        FinanceCommand::Add {
            student,
            class,
            month,
            year,
            amount,
            purpose,
            date_paid,
        } => {
            let class_id = match class {
                Some(class_id) => Some(class_id),
                None => app
                    .client
                    .list::<StudentRecord>()
                    .await?
                    .iter()
                    .find(|s| s.id == student)
                    .and_then(|s| s.class_id().map(str::to_string)),
            };
            let input = TransactionInput {
                student_id: student,
                class_id,
                month,
                year,
                amount_paid: amount,
                purpose,
                date_paid: date_paid.unwrap_or_else(today),
            }
            .validate()?;
            app.client.create::<FinanceTransaction, _>(&input).await?;
            info!(student = %input.student_id, amount = input.amount_paid, "payment recorded");
            println!("Recorded ${:.2} for {} {}.", input.amount_paid, input.month, input.year);
            Ok(())
        }
        FinanceCommand::Update {
            id,
            month,
            year,
            amount,
            purpose,
            date_paid,
        } => {
            let transactions = app.client.list::<FinanceTransaction>().await?;
            let current = transactions
                .iter()
                .find(|tx| tx.id == id)
                .with_context(|| format!("No transaction with id {id}"))?;
            let input = TransactionInput {
                student_id: current
                    .student
                    .as_ref()
                    .map(|s| s.id().to_string())
                    .unwrap_or_default(),
                class_id: current.class.as_ref().map(|c| c.id().to_string()),
                month: month.unwrap_or_else(|| current.month.clone()),
                year: year
                    .or_else(|| current.year.and_then(|y| i32::try_from(y).ok()))
                    .unwrap_or_else(|| today().year()),
                amount_paid: amount.unwrap_or(current.amount_paid),
                purpose: purpose.unwrap_or(current.purpose),
                date_paid: date_paid
                    .or_else(|| current.date_paid.map(|ts| ts.date_naive()))
                    .unwrap_or_else(today),
            }
            .validate()?;
            app.client.update::<FinanceTransaction, _>(&id, &input).await?;
            println!("Transaction {id} updated.");
            Ok(())
        }
        FinanceCommand::Delete { id } => {
            app.client.remove::<FinanceTransaction>(&id).await?;
            println!("Transaction {id} deleted.");
            Ok(())
        }
        FinanceCommand::Report { month, year, out } => {
            let year = year.unwrap_or_else(|| today().year());
            let (title, summary) = match month {
                Some(month) => {
                    let month = finance::parse_month(&month)
                        .with_context(|| format!("Unknown month '{month}'"))?;
                    let transactions = app.client.finance_month_report(month, year).await?;
                    (format!("{month} {year}"), finance::summarize_by_purpose(&transactions))
                }
                None => {
                    let buckets = app.client.finance_year_report(year).await?;
                    (year.to_string(), finance::summarize_by_month(&buckets, i64::from(year)))
                }
            };
            write_or_print(out.as_ref(), &report::build_finance_report(&title, &summary))
        }
        FinanceCommand::PaymentStatus { month, year } => {
            let month = month
                .map(|m| {
                    finance::parse_month(&m).with_context(|| format!("Unknown month '{m}'"))
                })
                .transpose()?;
            let status = app.client.payment_status(month, year).await?;
            let title = match (month, year) {
                (Some(m), Some(y)) => format!("{m} {y}"),
                (Some(m), None) => m.to_string(),
                (None, Some(y)) => y.to_string(),
                (None, None) => "all time".to_string(),
            };
            print!("{}", report::build_payment_status(&title, &status));
            Ok(())
        }
        FinanceCommand::Student { id } => {
            let transactions = app.client.student_finance_report(&id).await?;
            let summary = finance::summarize_by_purpose(&transactions);
            let name = transactions
                .first()
                .map(|tx| tx.student_name().to_string())
                .unwrap_or(id);
            print!("{}", report::build_finance_report(&name, &summary));
            Ok(())
        }
    }
}

async fn run_users(app: &App, action: UserCommand) -> anyhow::Result<()> {
    app.admin()?;
    match action {
        UserCommand::List => {
            for user in app.client.list_users().await? {
                let link = user.teacher_id().unwrap_or("-");
                println!("{}  {}  {}  {}  {}", user.id, user.name, user.email, user.role, link);
            }
            Ok(())
        }
        UserCommand::CreateTeacher {
            teacher,
            email,
            password,
        } => {
            app.client
                .create_teacher_account(&TeacherAccount {
                    teacher_id: teacher,
                    email,
                    password,
                })
                .await?;
            println!("Teacher account created.");
            Ok(())
        }
        UserCommand::Update {
            id,
            email,
            password,
            teacher,
        } => {
            let update = UserUpdate {
                email,
                password,
                teacher_id: teacher,
            };
            app.client.update_user(&id, &update).await?;
            println!("User {id} updated.");
            Ok(())
        }
        UserCommand::Delete { id } => {
            app.client.delete_user(&id).await?;
            println!("User {id} deleted.");
            Ok(())
        }
        UserCommand::Unlinked => {
            let teachers = app.client.teachers_without_accounts().await?;
            if teachers.is_empty() {
                println!("Every teacher has an account.");
            }
            for teacher in teachers.iter() {
                println!("{}  {}  {}", teacher.id, teacher.full_name, teacher.email);
            }
            Ok(())
        }
    }
}
