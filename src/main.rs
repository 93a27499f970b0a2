//! Tutor Store admin CLI
//!
//! Operator access to the same stores the submission server uses.
//!
//! ## Usage
//!
//! ```bash
//! # Completion status of one student
//! tutor-store status s1234567
//!
//! # Submission history with late allowances
//! tutor-store submissions s1234567
//!
//! # Waive the late penalty for one exercise
//! tutor-store allow-late s1234567 <identity_hash>
//!
//! # Enrolled students matching a query
//! tutor-store users --query lovelace --enrolled
//!
//! # Custom config / base directory
//! tutor-store --config /etc/tutor-store.toml version
//! tutor-store --base-dir /srv/tutor package-timestamp
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tutor_store::catalog::format_due;
use tutor_store::{Account, AnswerKey, Config, EnrollmentState, LogBackendKind, Storage};

#[derive(Parser, Debug)]
#[command(name = "tutor-store")]
#[command(about = "Answer, submission and status storage for the tutorial server")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "TUTOR_STORE_CONFIG")]
    config: Option<PathBuf>,

    /// Base directory (overrides config)
    #[arg(long, env = "TUTOR_STORE_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Keep submission/admin logs in sled instead of text files
    #[arg(long)]
    sled_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Completion status of every active exercise for a user
    Status { user: String },

    /// A user's submissions in log order
    Submissions { user: String },

    /// Record a submission of the code in FILE
    Submit {
        user: String,
        identity_hash: String,
        file: PathBuf,
    },

    /// Allow a user to submit an exercise late without penalty
    AllowLate { user: String, identity_hash: String },

    /// Search the account table
    Users {
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(long, conflicts_with = "not_enrolled")]
        enrolled: bool,
        #[arg(long)]
        not_enrolled: bool,
    },

    /// Add an account unless the id already exists
    AddUser {
        id: String,
        name: String,
        email: String,
        #[arg(long)]
        not_enrolled: bool,
    },

    /// Hash of a user's stored draft
    AnswerHash {
        user: String,
        package: String,
        problem_set: String,
        exercise: String,
    },

    /// Active exercises in catalog order
    Exercises,

    /// Server version marker
    Version,

    /// Build timestamp of the published exercise package
    PackageTimestamp,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tutor_store=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.base_dir {
        config.base_dir = dir;
    }
    if args.sled_logs {
        config.log_backend = LogBackendKind::Sled;
    }

    let storage = Storage::open(config).context("opening storage")?;

    match args.command {
        Command::Status { user } => {
            for (hash, status) in storage.compute_statuses(&user)? {
                println!("{} {}", hash, status);
            }
        }
        Command::Submissions { user } => {
            for record in storage.submissions().read_submission_records(&user)? {
                println!(
                    "{} {}{}",
                    record.event.identity_hash,
                    record.event.submitted_at,
                    if record.allow_late { " allow_late" } else { "" }
                );
            }
        }
        Command::Submit {
            user,
            identity_hash,
            file,
        } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let event = storage
                .submissions()
                .append_submission(&user, &identity_hash, &code)?;
            println!("{} {}", event.identity_hash, event.submitted_at);
        }
        Command::AllowLate {
            user,
            identity_hash,
        } => {
            storage
                .submissions()
                .grant_late_allowance(&user, &identity_hash)?;
        }
        Command::Users {
            query,
            enrolled,
            not_enrolled,
        } => {
            let filter = match (enrolled, not_enrolled) {
                (true, _) => Some(EnrollmentState::Enrolled),
                (_, true) => Some(EnrollmentState::NotEnrolled),
                _ => None,
            };
            for account in storage.users().search(&query, filter, None)? {
                println!(
                    "{},{},{},{}",
                    account.id, account.display_name, account.email, account.enrollment_state
                );
            }
        }
        Command::AddUser {
            id,
            name,
            email,
            not_enrolled,
        } => {
            let state = if not_enrolled {
                EnrollmentState::NotEnrolled
            } else {
                EnrollmentState::Enrolled
            };
            let added = storage.users().add(&Account::new(id, name, email, state))?;
            println!("{}", if added { "added" } else { "exists" });
        }
        Command::AnswerHash {
            user,
            package,
            problem_set,
            exercise,
        } => {
            let key = AnswerKey::new(&user, &package, &problem_set, &exercise);
            match storage.answers().hash(&key)? {
                Some(hash) => println!("{}", hash),
                None => anyhow::bail!("no stored answer"),
            }
        }
        Command::Exercises => {
            let catalog = storage.load_catalog()?;
            for identity in catalog.ordered() {
                println!(
                    "{} {} {} {} {}",
                    identity.identity_hash,
                    format_due(&identity.due_at),
                    identity.package_name,
                    identity.problem_set_name,
                    identity.exercise_name
                );
            }
        }
        Command::Version => println!("{}", storage.version()?),
        Command::PackageTimestamp => println!("{}", storage.package_timestamp()?),
    }

    Ok(())
}
