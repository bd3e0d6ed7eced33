mod commands;
mod config;
mod gemini;
mod google;
mod supabase;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_add_food, cmd_add_gym, cmd_add_run, cmd_add_sleep, cmd_add_steps, cmd_advice, cmd_clear,
    cmd_export_csv, cmd_export_json, cmd_history, cmd_list, cmd_login, cmd_login_google,
    cmd_logout, cmd_profile_edit, cmd_profile_show, cmd_register, cmd_summary, cmd_sync,
    cmd_water_add, cmd_water_show, cmd_weight_delete, cmd_weight_history, cmd_weight_log,
    cmd_weight_show, cmd_weight_summary, cmd_whoami,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::supabase::SupabaseClient;
use calori_core::advice::TextGenerator;
use calori_core::models::{ActivityKind, Goal, ProfileUpdate, Registration, Sex};
use calori_core::service::Tracker;

#[derive(Parser)]
#[command(
    name = "calori",
    version,
    about = "Track steps, runs, sleep, workouts, meals, water and weight",
    long_about = "Track steps, runs, sleep, workouts, meals, water and weight.\n\n\
        Everything is stored on this device first. When a Supabase project is configured, \
        changes are pushed in the background and `calori sync` reconciles both sides."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account, log in or out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Record an activity
    Add {
        #[command(subcommand)]
        command: AddCommands,
    },
    /// List recorded activities of one kind, newest first
    List {
        /// Activity kind: steps, running, sleep, gym, food
        kind: ActivityKind,
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track water intake
    Water {
        #[command(subcommand)]
        command: WaterCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Show the dashboard for a day (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily totals of one activity kind for the last N days
    History {
        /// Activity kind: steps, running, sleep, gym, food
        #[arg(default_value = "steps")]
        kind: ActivityKind,
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask for health advice based on your data
    Advice {
        /// Topic: overview, steps, running, sleep, gym, food, water
        #[arg(default_value = "overview")]
        topic: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending changes and reconcile with the remote store
    Sync {
        /// Only push queued changes, skip the download and merge
        #[arg(long)]
        push_only: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export your data
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
    /// Delete all activity stored on this device
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show where data and settings live and which services are configured
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Create a new account and profile
    Register {
        #[arg(long)]
        email: String,
        /// At least 6 characters
        #[arg(long)]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        confirm_password: Option<String>,
        /// Full name
        #[arg(long)]
        name: String,
        /// male or female
        #[arg(long)]
        sex: Sex,
        #[arg(long)]
        birth_place: String,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: NaiveDate,
        /// A, B, AB or O
        #[arg(long)]
        blood_type: String,
        #[arg(long)]
        phone: String,
        /// Height in cm
        #[arg(long)]
        height: f64,
        /// Weight in kg
        #[arg(long)]
        weight: f64,
        /// reduce, gain or maintain
        #[arg(long)]
        goal: Goal,
        /// Target weight in kg (required unless the goal is maintain)
        #[arg(long)]
        target: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log in with a Google ID token
    Google {
        /// ID token issued for the configured Google client
        #[arg(long)]
        id_token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log out and remove this account's data from the device
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the logged in user
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change profile fields
    Edit {
        /// Full name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sex: Option<Sex>,
        #[arg(long)]
        birth_place: Option<String>,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<NaiveDate>,
        #[arg(long)]
        blood_type: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        goal: Option<Goal>,
        /// Target weight in kg
        #[arg(long)]
        target: Option<f64>,
        /// Basal metabolic rate (kcal/day)
        #[arg(long)]
        bmr: Option<f64>,
        /// Total daily energy expenditure (kcal/day)
        #[arg(long)]
        tdee: Option<f64>,
        /// Daily calorie target (kcal)
        #[arg(long)]
        target_calories: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AddCommands {
    /// Record a step count
    Steps {
        steps: i64,
        /// When it happened (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM", default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a run
    #[command(alias = "running")]
    Run {
        /// Distance in km
        km: f64,
        /// When it happened (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM", default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record hours slept
    Sleep {
        hours: f64,
        /// When it happened (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM", default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a gym session
    Gym {
        /// Category (e.g. "chest", "legs", "cardio")
        category: String,
        /// Exercise name
        exercise: String,
        /// Duration in minutes
        minutes: i64,
        /// When it happened (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM", default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a meal or snack
    Food {
        /// Food name
        name: String,
        /// Calories (kcal)
        #[arg(long)]
        calories: f64,
        /// Carbohydrates (g)
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Protein (g)
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Fat (g)
        #[arg(long, default_value = "0")]
        fat: f64,
        /// When it happened (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM", default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Add to the day's water total
    Add {
        amount: f64,
        /// liter or glass (250 ml)
        #[arg(short, long, default_value = "liter")]
        unit: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the water total for a day
    Show {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log your weight (one entry per day, re-logging replaces it)
    Log {
        /// Weight value
        value: f64,
        /// Unit: kg or lbs
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time of the weigh-in (HH:MM)
        #[arg(long)]
        time: Option<String>,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the weight entry for a day
    Show {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history, newest first
    History {
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the weight entry for a day
    Delete {
        /// Date (YYYY-MM-DD)
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show progress toward your target weight
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Export profile and all activity as JSON
    Json {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export weight history as CSV
    Csv {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CALORI_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn open_tracker(config: &Config) -> Result<Tracker> {
    let settings = &config.settings;
    let mut tracker =
        Tracker::new(&config.db_path)?.with_day_boundary(settings.day_boundary()?);

    if let Some((url, anon_key)) = settings.supabase() {
        let client = Arc::new(SupabaseClient::new(url, anon_key)?);
        client.set_access_token(tracker.session()?.map(|s| s.access_token));
        tracker = tracker.with_remote(client.clone(), client);
        tracing::debug!(url, "remote sync enabled");
    }

    Ok(tracker)
}

fn show_config(config: &Config, json: bool) {
    let s = &config.settings;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "database": config.db_path,
                "config_file": config.config_path,
                "remote_sync": s.supabase().is_some(),
                "advice": s.gemini_api_key.is_some(),
                "google_sign_in": s.google_client_id.is_some(),
                "utc_offset_minutes": s.utc_offset_minutes,
            })
        );
        return;
    }
    let on_off = |b: bool| if b { "configured" } else { "not configured" };
    println!("  Database:       {}", config.db_path.display());
    println!("  Config file:    {}", config.config_path.display());
    println!("  Remote sync:    {}", on_off(s.supabase().is_some()));
    println!("  Advice:         {}", on_off(s.gemini_api_key.is_some()));
    println!("  Google sign-in: {}", on_off(s.google_client_id.is_some()));
    match s.utc_offset_minutes {
        Some(m) => println!("  Day boundary:   UTC{:+03}:{:02}", m / 60, (m % 60).abs()),
        None => println!("  Day boundary:   system timezone"),
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut tracker = open_tracker(&config)?;

    match cli.command {
        Commands::Auth { command } => match command {
            AuthCommands::Register {
                email,
                password,
                confirm_password,
                name,
                sex,
                birth_place,
                birth_date,
                blood_type,
                phone,
                height,
                weight,
                goal,
                target,
                json,
            } => {
                let reg = Registration {
                    email,
                    confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                    password,
                    full_name: name,
                    sex: Some(sex),
                    birth_place,
                    birth_date: Some(birth_date),
                    blood_type,
                    phone,
                    height_cm: Some(height),
                    weight_kg: Some(weight),
                    goal: Some(goal),
                    target_weight_kg: target,
                };
                cmd_register(&tracker, reg, json).await
            }
            AuthCommands::Login {
                email,
                password,
                json,
            } => cmd_login(&tracker, &email, &password, json).await,
            AuthCommands::Google { id_token, json } => {
                let client_id = config.settings.google_client_id.as_deref();
                cmd_login_google(&tracker, client_id, &id_token, json).await
            }
            AuthCommands::Logout { json } => cmd_logout(&mut tracker, json).await,
            AuthCommands::Whoami { json } => cmd_whoami(&tracker, json).await,
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&tracker, json).await,
            ProfileCommands::Edit {
                name,
                sex,
                birth_place,
                birth_date,
                blood_type,
                phone,
                height,
                weight,
                goal,
                target,
                bmr,
                tdee,
                target_calories,
                json,
            } => {
                let update = ProfileUpdate {
                    full_name: name,
                    sex,
                    birth_place,
                    birth_date,
                    blood_type,
                    height_cm: height,
                    weight_kg: weight,
                    phone,
                    goal,
                    target_weight_kg: target,
                    bmr,
                    tdee,
                    target_calories,
                };
                cmd_profile_edit(&tracker, update, json).await
            }
        },
        Commands::Add { command } => match command {
            AddCommands::Steps { steps, at, json } => {
                cmd_add_steps(&tracker, steps, at, json).await
            }
            AddCommands::Run { km, at, json } => cmd_add_run(&tracker, km, at, json).await,
            AddCommands::Sleep { hours, at, json } => {
                cmd_add_sleep(&tracker, hours, at, json).await
            }
            AddCommands::Gym {
                category,
                exercise,
                minutes,
                at,
                json,
            } => cmd_add_gym(&tracker, &category, &exercise, minutes, at, json).await,
            AddCommands::Food {
                name,
                calories,
                carbs,
                protein,
                fat,
                at,
                json,
            } => cmd_add_food(&tracker, &name, calories, carbs, protein, fat, at, json).await,
        },
        Commands::List { kind, limit, json } => cmd_list(&tracker, kind, limit, json),
        Commands::Water { command } => match command {
            WaterCommands::Add {
                amount,
                unit,
                date,
                json,
            } => cmd_water_add(&tracker, amount, &unit, date, json).await,
            WaterCommands::Show { date, json } => cmd_water_show(&tracker, date, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                time,
                note,
                json,
            } => cmd_weight_log(&tracker, value, &unit, date, time, note, json).await,
            WeightCommands::Show { date, json } => cmd_weight_show(&tracker, date, json),
            WeightCommands::History { limit, json } => cmd_weight_history(&tracker, limit, json),
            WeightCommands::Delete { date, json } => cmd_weight_delete(&tracker, date, json).await,
            WeightCommands::Summary { json } => cmd_weight_summary(&tracker, json),
        },
        Commands::Summary { date, json } => cmd_summary(&tracker, date, json),
        Commands::History { kind, days, json } => cmd_history(&tracker, kind, days, json),
        Commands::Advice { topic, json } => {
            let generator = config
                .settings
                .gemini_api_key
                .as_deref()
                .map(|key| GeminiClient::new(key, config.settings.gemini_model.as_deref()))
                .transpose()?;
            let generator = generator.as_ref().map(|g| g as &dyn TextGenerator);
            cmd_advice(&tracker, generator, &topic, json).await
        }
        Commands::Sync { push_only, json } => cmd_sync(&mut tracker, push_only, json).await,
        Commands::Export { command } => match command {
            ExportCommands::Json { output } => cmd_export_json(&tracker, output.as_deref()),
            ExportCommands::Csv { output } => cmd_export_csv(&tracker, output.as_deref()),
        },
        Commands::Clear { yes, json } => cmd_clear(&mut tracker, yes, json),
        Commands::Config { json } => {
            show_config(&config, json);
            Ok(())
        }
    }
}
