//! EG Control CLI - Command-line interface for EG Control
//!
//! Sign in, register and search EG and Object records, and manage users

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use egcontrol_applications::{
    ApplicationError, EgControlApplication, EgRecord, NewObjectRecord, NewUser, ObjectRecord,
    Role, SearchOutcome, UserProfile, UserUpdate,
};
use egcontrol_core::{
    default_config_path, init_logging, log_operation_error, log_operation_start,
    log_operation_success, EgControlConfig,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "egcontrol")]
#[command(about = "Register and search EG and Object records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in; the session is kept until logout or expiry
    Login {
        email: String,

        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and forget the saved session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// EG records
    Eg {
        #[command(subcommand)]
        action: EgAction,
    },

    /// Object records
    Object {
        #[command(subcommand)]
        action: ObjectAction,
    },

    /// User management (administrators)
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum EgAction {
    /// Register an 18-digit EG code
    Add { code: String },

    /// Show the most recent EG records
    Recent {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search by code fragment or by who entered the record
    Search { query: String },
}

#[derive(Subcommand)]
enum ObjectAction {
    /// Register an object code with its trip number
    Add {
        object_code: String,
        trip_number: String,
    },

    /// Show the most recent object records
    Recent {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Find records with exactly this object code
    Search { query: String },

    /// Number of objects registered today
    Today,
}

#[derive(Subcommand)]
enum UserAction {
    /// List all users
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a user
    Add {
        name: String,
        email: String,
        shift: String,

        /// admin or user
        #[arg(long, default_value = "user")]
        role: String,

        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Create the first administrator of an empty installation
        #[arg(long)]
        bootstrap: bool,
    },

    /// Update a user; omitted fields keep their current values
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        shift: Option<String>,

        #[arg(long)]
        role: Option<String>,

        /// New password; the current one is kept when omitted
        #[arg(long)]
        password: Option<String>,

        /// Revision the update is based on (defaults to the current one)
        #[arg(long)]
        revision: Option<i64>,
    },

    /// Number of registered users
    Count,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<ApplicationError>() {
                Some(app_error) => app_error.user_message(),
                None => format!("{:#}", e),
            };
            eprintln!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        return handle_config_init(cli.config.as_deref(), *force);
    }

    let mut config = EgControlConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.enable_verbose();
    }

    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    info!("Starting EG Control CLI v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config {
        action: ConfigAction::Show,
    } = &cli.command
    {
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let app = EgControlApplication::new(config).await?;

    match cli.command {
        Commands::Login { email, password } => handle_login(&app, &email, password).await,
        Commands::Logout => {
            app.session().logout().await;
            println!("👋 Signed out");
            Ok(())
        }
        Commands::Whoami => handle_whoami(&app).await,
        Commands::Eg { action } => handle_eg(&app, action).await,
        Commands::Object { action } => handle_object(&app, action).await,
        Commands::Users { action } => handle_users(&app, action).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn handle_config_init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    EgControlConfig::default().save_to_file(&config_path)?;
    println!("✅ Configuration initialized at: {}", config_path.display());
    println!("📝 Change session.signing_secret before sharing this installation.");
    Ok(())
}

/// Read one line from stdin, used for passwords not given on the command line
fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}: ", label);
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn print_eg(records: &[EgRecord]) {
    if records.is_empty() {
        println!("No EG records found");
        return;
    }
    for record in records {
        println!(
            "{}  {}  {}",
            format_time(record.timestamp),
            record.code,
            record.entered_by
        );
    }
}

fn print_objects(records: &[ObjectRecord]) {
    if records.is_empty() {
        println!("No object records found");
        return;
    }
    for record in records {
        println!(
            "{}  {:<18}  trip {:<7}  {}",
            format_time(record.timestamp),
            record.object_code,
            record.trip_number,
            record.entered_by
        );
    }
}

fn print_users(users: &[UserProfile]) {
    for user in users {
        println!(
            "{}  {:<24} {:<28} {:<8} {:<6} rev {}",
            user.id, user.name, user.email, user.shift, user.role, user.revision
        );
    }
}

async fn handle_login(
    app: &EgControlApplication,
    email: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt("Password")?,
    };

    let identity = app.session().login(email, &password).await?;
    println!("✅ Signed in as {}", identity.display_string());
    Ok(())
}

async fn handle_whoami(app: &EgControlApplication) -> anyhow::Result<()> {
    match app.session().current_user().await {
        Some(user) => {
            println!("👤 {}", user.display_string());
            println!("   Shift: {}", user.shift);
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

async fn handle_eg(app: &EgControlApplication, action: EgAction) -> anyhow::Result<()> {
    app.session().require_user().await?;

    match action {
        EgAction::Add { code } => {
            log_operation_start!("register_eg");
            let record = app.register_eg(&code).await.map_err(|e| {
                log_operation_error!("register_eg", e);
                e
            })?;
            log_operation_success!("register_eg", id = %record.id);
            println!("✅ EG {} registered", record.code);
        }
        EgAction::Recent { limit } => {
            let records: Vec<EgRecord> = app.records().list_recent(limit).await?;
            print_eg(&records);
        }
        EgAction::Search { query } => match app.records().search_eg(&query).await? {
            SearchOutcome::Cleared => println!("Enter something to search for"),
            SearchOutcome::Matches(records) => print_eg(&records),
        },
    }
    Ok(())
}

async fn handle_object(app: &EgControlApplication, action: ObjectAction) -> anyhow::Result<()> {
    app.session().require_user().await?;

    match action {
        ObjectAction::Add {
            object_code,
            trip_number,
        } => {
            log_operation_start!("register_object");
            let record = app
                .register_object(&NewObjectRecord::new(object_code, trip_number))
                .await
                .map_err(|e| {
                    log_operation_error!("register_object", e);
                    e
                })?;
            log_operation_success!("register_object", id = %record.id);
            println!(
                "✅ Object {} registered for trip {}",
                record.object_code, record.trip_number
            );
        }
        ObjectAction::Recent { limit } => {
            let records: Vec<ObjectRecord> = app.records().list_recent(limit).await?;
            print_objects(&records);
        }
        ObjectAction::Search { query } => match app.records().search_objects(&query).await? {
            SearchOutcome::Cleared => println!("Enter an object code to search for"),
            SearchOutcome::Matches(records) => print_objects(&records),
        },
        ObjectAction::Today => {
            let count = app.records().count_today::<ObjectRecord>().await?;
            println!("📦 {} objects registered today", count);
        }
    }
    Ok(())
}

fn parse_role(raw: &str) -> anyhow::Result<Role> {
    raw.parse::<Role>().map_err(|e| anyhow!(e))
}

async fn handle_users(app: &EgControlApplication, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::List { json } => {
            let users = app.users().list_users(app.session()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                print_users(&users);
            }
        }
        UserAction::Add {
            name,
            email,
            shift,
            role,
            password,
            bootstrap,
        } => {
            let password = match password {
                Some(password) => password,
                None => prompt("Password for the new user")?,
            };
            let user = NewUser {
                name,
                email,
                shift,
                role: parse_role(&role)?,
                password,
            };

            let profile = if bootstrap {
                app.users().bootstrap_admin(user).await?
            } else {
                app.users().create_user(app.session(), user).await?
            };
            println!("✅ Created {} ({}) with id {}", profile.email, profile.role, profile.id);
        }
        UserAction::Update {
            id,
            name,
            email,
            shift,
            role,
            password,
            revision,
        } => {
            let current = load_user_for_update(app, &id).await?;
            debug!("Updating user {} from revision {}", id, current.revision);

            let update = UserUpdate {
                expected_revision: revision.unwrap_or(current.revision),
                name: name.unwrap_or(current.name),
                email: email.unwrap_or(current.email),
                shift: shift.unwrap_or(current.shift),
                role: match role {
                    Some(raw) => parse_role(&raw)?,
                    None => current.role,
                },
                password,
            };

            let profile = app.users().update_user(app.session(), &id, update).await?;
            println!("✅ Updated {} (revision {})", profile.email, profile.revision);
        }
        UserAction::Count => {
            let count = app.users().count_users().await?;
            println!("👥 {} registered users", count);
        }
    }
    Ok(())
}

/// Only administrators learn whether an account id exists
async fn load_user_for_update(
    app: &EgControlApplication,
    id: &str,
) -> Result<UserProfile, ApplicationError> {
    app.session().authorize_admin().await?;
    app.users()
        .get_user(id)
        .await?
        .ok_or_else(|| ApplicationError::not_found(format!("User {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_with_partial_fields() {
        let cli = Cli::try_parse_from([
            "egcontrol",
            "users",
            "update",
            "abc",
            "--shift",
            "Night",
            "--revision",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Users {
                action:
                    UserAction::Update {
                        id,
                        shift,
                        name,
                        revision,
                        ..
                    },
            } => {
                assert_eq!(id, "abc");
                assert_eq!(shift.as_deref(), Some("Night"));
                assert_eq!(name, None);
                assert_eq!(revision, Some(2));
            }
            _ => panic!("expected users update"),
        }
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("admin").unwrap(), Role::Admin);
        assert!(parse_role("owner").is_err());
    }

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            name: "Tester".to_string(),
            email: email.to_string(),
            shift: "Day".to_string(),
            role,
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_lookup_requires_admin_first() {
        let dir = tempfile::tempdir().unwrap();
        let app = EgControlApplication::new(EgControlConfig::ephemeral(dir.path()))
            .await
            .unwrap();

        let anonymous = load_user_for_update(&app, "missing").await;
        assert!(matches!(anonymous, Err(ApplicationError::Unauthorized { .. })));

        let admin = app
            .users()
            .bootstrap_admin(new_user("root@plant.com", Role::Admin))
            .await
            .unwrap();
        app.session().login("root@plant.com", "pw").await.unwrap();
        app.users()
            .create_user(app.session(), new_user("ana@plant.com", Role::User))
            .await
            .unwrap();

        let missing = load_user_for_update(&app, "missing").await;
        assert!(matches!(missing, Err(ApplicationError::NotFound { .. })));

        // A regular user cannot tell existing ids from unknown ones
        app.session().login("ana@plant.com", "pw").await.unwrap();
        let existing = load_user_for_update(&app, &admin.id).await;
        let unknown = load_user_for_update(&app, "missing").await;
        assert!(matches!(existing, Err(ApplicationError::Unauthorized { .. })));
        assert!(matches!(unknown, Err(ApplicationError::Unauthorized { .. })));
    }
}
