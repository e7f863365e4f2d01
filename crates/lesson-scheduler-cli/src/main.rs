//! `lessons` CLI: query availability and book lessons against a JSON
//! schedule snapshot.
//!
//! ## Usage
//!
//! ```sh
//! # Days with explicit slots for a teacher
//! lessons --store schedule.json dates --teacher t1
//!
//! # Slots on given days, with or without booked time removed
//! lessons --store schedule.json slots --teacher t1 --date 2026-03-16
//! lessons --store schedule.json open-slots --teacher t1 --date 2026-03-16
//!
//! # Lessons generated from the weekly template
//! lessons --store schedule.json template-slots --teacher t1 --date 2026-03-16
//!
//! # Free whole hours (9 to 17 by default)
//! lessons --store schedule.json hours --date 2026-03-16
//!
//! # Conflict check, booking and cancellation
//! lessons --store schedule.json check --teacher t1 --date 2026-03-16 --start 10:00 --end 11:00
//! lessons --store schedule.json book --teacher t1 --student s1 --date 2026-03-16 --start 10:00
//! lessons --store schedule.json cancel --id <booking-id>
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use lesson_scheduler::time::parse_day;
use lesson_scheduler::{
    AvailabilityResolver, BookingId, BookingRequest, BookingService, LessonType, MemoryStore,
    SchedulerConfig, SchedulerError, StoreSnapshot, TimeSlot,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "lessons",
    version,
    about = "Lesson availability and booking over a schedule snapshot"
)]
struct Cli {
    /// JSON schedule snapshot (bookings, templates, slot sets)
    #[arg(long, env = "LESSONS_STORE")]
    store: PathBuf,

    /// Scheduler configuration file (TOML); defaults apply when absent
    #[arg(long, env = "LESSONS_CONFIG", default_value = "lessons.toml")]
    config: PathBuf,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LessonKind {
    Individual,
    Group,
    Instant,
}

impl From<LessonKind> for LessonType {
    fn from(kind: LessonKind) -> Self {
        match kind {
            LessonKind::Individual => LessonType::Individual,
            LessonKind::Group => LessonType::Group,
            LessonKind::Instant => LessonType::Instant,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List days holding at least one explicit slot
    Dates {
        #[arg(long)]
        teacher: String,
    },
    /// List explicit slots on the given days
    Slots {
        #[arg(long)]
        teacher: String,
        /// Day in YYYY-MM-DD form (repeatable)
        #[arg(long = "date", required = true)]
        dates: Vec<String>,
    },
    /// List explicit slots on the given days that no booking overlaps
    OpenSlots {
        #[arg(long)]
        teacher: String,
        #[arg(long = "date", required = true)]
        dates: Vec<String>,
    },
    /// List free lessons generated from the weekly template
    TemplateSlots {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        date: String,
    },
    /// List free whole business hours on a day
    Hours {
        #[arg(long)]
        date: String,
        /// Restrict to one teacher's bookings
        #[arg(long)]
        teacher: Option<String>,
    },
    /// Report whether a lesson window would conflict
    Check {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Book a lesson and save the snapshot
    Book {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        student: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        start: String,
        /// Defaults to start plus the configured lesson length
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum, default_value = "individual")]
        lesson_type: LessonKind,
    },
    /// Cancel a booking and save the snapshot
    Cancel {
        #[arg(long)]
        id: String,
    },
}

/// Exit code for a booking rejected because of an overlap.
const EXIT_CONFLICT: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SchedulerConfig::load(&cli.config).context("Failed to load scheduler config")?;
    let store = Arc::new(MemoryStore::from_snapshot(read_snapshot(&cli.store)?));

    match cli.command {
        Commands::Dates { teacher } => {
            let resolver = AvailabilityResolver::new(store, &config)?;
            for date in resolver.available_dates(&teacher).await? {
                println!("{}", date);
            }
        }
        Commands::Slots { teacher, dates } => {
            let resolver = AvailabilityResolver::new(store, &config)?;
            let dates = parse_days(&dates)?;
            print_slots(&resolver.available_slots(&teacher, &dates).await?);
        }
        Commands::OpenSlots { teacher, dates } => {
            let resolver = AvailabilityResolver::new(store, &config)?;
            let dates = parse_days(&dates)?;
            print_slots(&resolver.open_slots(&teacher, &dates).await?);
        }
        Commands::TemplateSlots { teacher, date } => {
            let resolver = AvailabilityResolver::new(store, &config)?;
            let date = parse_day(&date)?;
            print_slots(&resolver.template_slots(&teacher, date).await?);
        }
        Commands::Hours { date, teacher } => {
            let resolver = AvailabilityResolver::new(store, &config)?;
            let date = parse_day(&date)?;
            let hours = match teacher {
                Some(teacher) => resolver.available_hours_for(&teacher, date).await?,
                None => resolver.available_hours(date).await?,
            };
            let hours: Vec<String> = hours.iter().map(u32::to_string).collect();
            println!("{}", hours.join(","));
        }
        Commands::Check {
            teacher,
            date,
            start,
            end,
        } => {
            let service = BookingService::new(store, &config)?;
            let conflict = service.check(&teacher, &date, &start, &end).await?;
            println!("{}", if conflict { "conflict" } else { "free" });
        }
        Commands::Book {
            teacher,
            student,
            date,
            start,
            end,
            title,
            lesson_type,
        } => {
            let service = BookingService::new(store.clone(), &config)?;
            let request = BookingRequest {
                teacher_id: teacher,
                student_id: student,
                date,
                start_time: start,
                end_time: end,
                title,
                lesson_type: lesson_type.into(),
            };
            match service.book(&request).await {
                Ok(booking) => {
                    write_snapshot(&cli.store, &store.snapshot().await)?;
                    println!("{}", serde_json::to_string_pretty(&booking)?);
                }
                Err(e) => fail(&e),
            }
        }
        Commands::Cancel { id } => {
            let service = BookingService::new(store.clone(), &config)?;
            match service.cancel(&BookingId::new(id)).await {
                Ok(booking) => {
                    write_snapshot(&cli.store, &store.snapshot().await)?;
                    println!("{}", serde_json::to_string_pretty(&booking)?);
                }
                Err(e) => fail(&e),
            }
        }
    }

    Ok(())
}

/// Print the user-facing message for a failed write and exit.
fn fail(error: &SchedulerError) -> ! {
    eprintln!("Error: {}", error.user_message());
    eprintln!("  caused by: {}", error);
    let code = match error {
        SchedulerError::Conflict(_) => EXIT_CONFLICT,
        _ => 1,
    };
    process::exit(code);
}

fn parse_days(raw: &[String]) -> Result<Vec<NaiveDate>> {
    raw.iter()
        .map(|d| parse_day(d).with_context(|| format!("Invalid --date '{}'", d)))
        .collect()
}

fn print_slots(slots: &[TimeSlot]) {
    for slot in slots {
        println!("{} {}", slot.start.to_rfc3339(), slot.end.to_rfc3339());
    }
}

/// A missing snapshot file is an empty schedule.
fn read_snapshot(path: &Path) -> Result<StoreSnapshot> {
    if !path.exists() {
        info!("No snapshot at {}, starting empty", path.display());
        return Ok(StoreSnapshot::default());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    StoreSnapshot::from_json(&json)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
}

fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<()> {
    let json = snapshot.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))
}
