//! CLI binary for timetable2cal.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PlannerConfig`, drives a `PlannerSession` and prints results.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timetable2cal::calendar::auth::{self, OAuthClient, TokenStore};
use timetable2cal::model::parse_clock_time;
use timetable2cal::progress::ProgressCallback;
use timetable2cal::{
    BookingOutcome, OrganizerForm, PlannerConfig, PlannerSession, SyncProgressCallback,
    SyncReport, Timetable,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

/// How long `tt2cal auth` waits for the browser before asking for a paste.
const AUTH_REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a progress bar and one log line per timetable entry.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} entries  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Syncing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl SyncProgressCallback for CliProgressCallback {
    fn on_sync_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Booking {total} weekly classes…"))
        ));
    }

    fn on_entry_start(&self, _index: usize, _total: usize, course: &str) {
        self.bar.set_message(course.to_string());
    }

    fn on_entry_booked(&self, index: usize, total: usize, course: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            course
        ));
        self.bar.inc(1);
    }

    fn on_entry_failed(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_sync_complete(&self, total: usize, booked: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(booked);
        if failed == 0 {
            eprintln!("{} {} classes booked", green("✔"), bold(&booked.to_string()));
        } else {
            eprintln!(
                "{} {}/{} classes booked  ({} failed)",
                if booked == 0 { red("✘") } else { cyan("⚠") },
                bold(&booked.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One-time calendar authorization (writes token.json)
  tt2cal auth

  # Preview a timetable, then book it for the semester
  tt2cal import timetable.pdf --from 2026-01-05 --to 2026-04-30

  # Book without the confirmation prompt
  tt2cal import timetable.pdf --from 2026-01-05 --to 2026-04-30 --yes

  # Book a club event (checked against classes first)
  tt2cal book --date 2026-01-30 --time 14:00 --title "Coding Workshop" --target "Sem 4"

  # Only check, and suggest alternatives on Mondays or Wednesdays
  tt2cal book --date 2026-01-30 --time 2pm --title "Quiz" --check-only --suggest-on mon --suggest-on wed

  # Let the model fill the form from a sentence
  tt2cal book --ai "robotics meetup next friday at 2pm for sem 3"

  # Remove what the last import created
  tt2cal undo

  # Remove every class tagged with a semester label
  tt2cal purge-semester "4th Semester"

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Model API key (GOOGLE_API_KEY is accepted too)
  GOOGLE_CLIENT_ID        OAuth client id (else read from credentials.json)
  GOOGLE_CLIENT_SECRET    OAuth client secret
  TT2CAL_*                Every flag below has a TT2CAL_ fallback
"#;

/// Sync PDF timetables and club events to Google Calendar.
#[derive(Parser, Debug)]
#[command(
    name = "tt2cal",
    version,
    about = "Sync PDF timetables and club events to Google Calendar",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// LLM model ID (default: gemini-2.0-flash).
    #[arg(long, global = true, env = "TT2CAL_MODEL")]
    model: Option<String>,

    /// LLM provider (default: gemini).
    #[arg(long, global = true, env = "TT2CAL_PROVIDER")]
    provider: Option<String>,

    /// Retries on model failure. Each retry spends quota.
    #[arg(long, global = true, env = "TT2CAL_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// IANA time zone for every event.
    #[arg(long, global = true, env = "TT2CAL_TIMEZONE", default_value = "Asia/Kolkata",
          value_parser = parse_tz)]
    timezone: Tz,

    /// Name of the class timetable calendar.
    #[arg(long, global = true, env = "TT2CAL_STATIC_CALENDAR")]
    static_calendar: Option<String>,

    /// Name of the club events calendar.
    #[arg(long, global = true, env = "TT2CAL_CLUB_CALENDAR")]
    club_calendar: Option<String>,

    /// OAuth token file.
    #[arg(long, global = true, env = "TT2CAL_TOKEN_PATH", default_value = "token.json")]
    token: PathBuf,

    /// OAuth client file (installed-app JSON).
    #[arg(long, global = true, env = "TT2CAL_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Per-request timeout for calendar calls, in seconds.
    #[arg(long, global = true, env = "TT2CAL_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "TT2CAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TT2CAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TT2CAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize calendar access and save the token.
    Auth,

    /// Extract a timetable PDF and book it as weekly classes.
    Import {
        /// Timetable PDF.
        pdf: PathBuf,

        /// Semester start date (YYYY-MM-DD).
        #[arg(long = "from")]
        semester_start: NaiveDate,

        /// Semester end date (YYYY-MM-DD).
        #[arg(long = "to")]
        semester_end: NaiveDate,

        /// Book without asking.
        #[arg(short, long)]
        yes: bool,

        /// Print the extracted timetable as JSON. Books only with --yes.
        #[arg(long)]
        json: bool,

        /// Text file with a custom extraction prompt.
        #[arg(long, env = "TT2CAL_PROMPT")]
        prompt_file: Option<PathBuf>,

        /// Where to record created event ids for `undo`.
        #[arg(long, env = "TT2CAL_SYNC_LOG", default_value = "last_sync.json")]
        sync_log: PathBuf,
    },

    /// Check a club slot and book it if free.
    Book {
        #[command(flatten)]
        form: FormArgs,

        /// Only check; print conflicts and suggestions without booking.
        #[arg(long)]
        check_only: bool,

        /// Only suggest alternatives on this weekday (mon, tue, …); repeatable.
        #[arg(long = "suggest-on", value_parser = parse_weekday)]
        suggest_on: Vec<Weekday>,
    },

    /// Delete the events created by the last import.
    Undo {
        #[arg(long, env = "TT2CAL_SYNC_LOG", default_value = "last_sync.json")]
        sync_log: PathBuf,
    },

    /// Cancel a club event (only within the cancellation window).
    Cancel { event_id: String },

    /// Delete club events that already ended.
    Cleanup,

    /// Delete every class tagged with this semester label.
    PurgeSemester { tag: String },
}

#[derive(Args, Debug)]
struct FormArgs {
    /// Event date (YYYY-MM-DD).
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Start time (HH:MM, 9:30am, 2pm).
    #[arg(long, value_parser = parse_time)]
    time: Option<NaiveTime>,

    #[arg(long)]
    title: Option<String>,

    /// Target semester; repeatable.
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Natural-language request; flags above override what the model fills.
    #[arg(long)]
    ai: Option<String>,
}

fn parse_tz(s: &str) -> std::result::Result<Tz, String> {
    s.parse::<Tz>().map_err(|e| e.to_string())
}

fn parse_weekday(s: &str) -> std::result::Result<Weekday, String> {
    s.parse::<Weekday>()
        .map_err(|_| format!("'{s}' is not a weekday"))
}

fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    parse_clock_time(s).map_err(|e| e.to_string())
}

/// Load `.env` (or `file`) into the process environment.
fn load_env(file: Option<&Path>) {
    let _ = match file {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };

    // The Gemini provider reads GEMINI_API_KEY; accept the older name too.
    if std::env::var_os("GEMINI_API_KEY").is_none() {
        if let Some(key) = std::env::var_os("GOOGLE_API_KEY") {
            std::env::set_var("GEMINI_API_KEY", key);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be in the environment before clap reads TT2CAL_* values.
    load_env(None);
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs are suppressed while a progress bar is drawn.
    let g = &cli.global;
    let show_progress = !g.quiet && !g.no_progress;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let prompt = match &cli.command {
        Command::Import {
            prompt_file: Some(path),
            ..
        } => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        _ => None,
    };
    let config = build_config(g, prompt)?;

    match cli.command {
        Command::Auth => run_auth(&config).await,
        Command::Import {
            pdf,
            semester_start,
            semester_end,
            yes,
            json,
            sync_log,
            ..
        } => {
            let session = PlannerSession::google(config)?;
            run_import(
                &session,
                &pdf,
                semester_start,
                semester_end,
                yes,
                json,
                &sync_log,
                show_progress,
            )
            .await
        }
        Command::Book {
            form,
            check_only,
            suggest_on,
        } => {
            let session = PlannerSession::google(config)?;
            run_book(&session, form, check_only, &suggest_on, g.quiet).await
        }
        Command::Undo { sync_log } => {
            let session = PlannerSession::google(config)?;
            let raw = tokio::fs::read_to_string(&sync_log)
                .await
                .with_context(|| format!("No sync log at {:?}", sync_log))?;
            let ids: Vec<String> =
                serde_json::from_str(&raw).context("Sync log is not a JSON list of ids")?;
            let undo = session.undo_sync(&ids).await.context("Undo failed")?;
            save_event_ids(&sync_log, &undo.failed).await?;
            report(
                g.quiet,
                &format!("{} Removed {}/{} events", green("✔"), undo.deleted, ids.len()),
            );
            if !undo.is_complete() {
                bail!(
                    "{} event(s) could not be deleted; their ids stay in {:?} for another `tt2cal undo`",
                    undo.failed.len(),
                    sync_log
                );
            }
            Ok(())
        }
        Command::Cancel { event_id } => {
            let session = PlannerSession::google(config)?;
            session
                .cancel_club_event(&event_id, Utc::now())
                .await
                .context("Cancellation failed")?;
            report(g.quiet, &format!("{} Cancelled {event_id}", green("✔")));
            Ok(())
        }
        Command::Cleanup => {
            let session = PlannerSession::google(config)?;
            let n = session
                .cleanup_past_club_events(Utc::now())
                .await
                .context("Cleanup failed")?;
            report(g.quiet, &format!("{} Removed {n} past club events", green("✔")));
            Ok(())
        }
        Command::PurgeSemester { tag } => {
            let session = PlannerSession::google(config)?;
            let n = session
                .purge_semester(&tag)
                .await
                .context("Purge failed")?;
            report(g.quiet, &format!("{} Removed {n} classes tagged '{tag}'", green("✔")));
            Ok(())
        }
    }
}

fn report(quiet: bool, line: &str) {
    if !quiet {
        eprintln!("{line}");
    }
}

/// Map CLI args to `PlannerConfig`.
fn build_config(g: &GlobalArgs, prompt: Option<String>) -> Result<PlannerConfig> {
    let mut builder = PlannerConfig::builder()
        .max_retries(g.max_retries)
        .timezone(g.timezone)
        .token_path(g.token.clone())
        .credentials_path(g.credentials.clone())
        .api_timeout_secs(g.api_timeout);

    if let Some(ref m) = g.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = g.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref name) = g.static_calendar {
        builder = builder.static_calendar_name(name.clone());
    }
    if let Some(ref name) = g.club_calendar {
        builder = builder.club_calendar_name(name.clone());
    }
    if let Some(p) = prompt {
        builder = builder.extraction_prompt(p);
    }

    builder.build().context("Invalid configuration")
}

fn read_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn confirm(prompt: &str) -> Result<bool> {
    let answer = read_line(&format!("{prompt} [y/N] "))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn run_auth(config: &PlannerConfig) -> Result<()> {
    let client = OAuthClient::from_env_or_file(
        &config.credentials_path,
        &config.token_endpoint,
        config.api_timeout_secs,
    )?;
    eprintln!(
        "\nOpen the following URL in your browser and authorize calendar access:\n\n{}\n",
        client.authorize_url()
    );

    let mut code = None;
    if let Some(port) = client.loopback_port() {
        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                let waiting = format!("Waiting for the browser redirect on {} ...", client.redirect_uri());
                eprintln!("{}", dim(&waiting));
                let received = tokio::time::timeout(AUTH_REDIRECT_TIMEOUT, auth::receive_code(&listener));
                match received.await {
                    Ok(result) => code = Some(result.context("Authorization failed")?),
                    Err(_) => eprintln!("{} No redirect received", yellow("⚠")),
                }
            }
            Err(e) => eprintln!("{} Cannot listen on port {port}: {e}", yellow("⚠")),
        }
    }
    let code = match code {
        Some(code) => code,
        None => {
            let pasted = read_line("Paste the redirect URL (or the code) here: ")?;
            auth::code_from_redirect(&pasted).context("No authorization code entered")?
        }
    };

    let token = client
        .exchange_code(&code)
        .await
        .context("Authorization failed")?;
    let store = TokenStore::new(&config.token_path);
    store.save(&token)?;
    eprintln!("{} Token saved to {}", green("✔"), bold(&store.path().display().to_string()));
    Ok(())
}

fn print_timetable(timetable: &Timetable) {
    let meta = &timetable.metadata;
    println!(
        "{}  {}  {}",
        bold(&meta.branch),
        dim("|"),
        bold(&meta.semester_label)
    );
    println!("{:<10} {:<13} {}", "Day", "Time", "Course");
    println!("{}", dim(&"─".repeat(48)));
    for e in &timetable.entries {
        println!(
            "{:<10} {}–{}   {}",
            e.day().to_string(),
            e.start().format("%H:%M"),
            e.end().format("%H:%M"),
            e.course()
        );
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_import(
    session: &PlannerSession,
    pdf: &Path,
    semester_start: NaiveDate,
    semester_end: NaiveDate,
    yes: bool,
    json: bool,
    sync_log: &Path,
    show_progress: bool,
) -> Result<()> {
    let spinner = if show_progress && !json {
        let s = ProgressBar::new_spinner();
        s.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        s.set_prefix("Extracting");
        s.set_message(pdf.display().to_string());
        s.enable_steady_tick(Duration::from_millis(80));
        Some(s)
    } else {
        None
    };

    let extracted = session.extract_timetable_file(pdf).await;
    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    let timetable = extracted.context("Extraction failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&timetable).context("Failed to serialise timetable")?
        );
    } else {
        print_timetable(&timetable);
    }

    if timetable.entries.is_empty() {
        bail!("No timetable entries were found in {:?}", pdf);
    }
    if !yes && (json || !confirm(&format!("Book {} weekly classes?", timetable.entries.len()))?) {
        eprintln!("{}", dim("Nothing booked."));
        return Ok(());
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SyncProgressCallback>)
    } else {
        None
    };
    let report = session
        .sync_timetable(&timetable, semester_start, semester_end, progress)
        .await
        .context("Sync failed")?;

    write_sync_log(sync_log, &report).await?;
    if !show_progress {
        eprintln!("Booked {}/{} classes", report.booked(), report.results.len());
        for r in report.results.iter().filter_map(|r| r.error.as_ref()) {
            eprintln!("  {}", red(&r.to_string()));
        }
    }
    Ok(())
}

async fn write_sync_log(path: &Path, report: &SyncReport) -> Result<()> {
    let ids = report.event_ids();
    save_event_ids(path, &ids).await?;
    if !ids.is_empty() {
        eprintln!("{}", dim(&format!("Event ids saved to {} (for `tt2cal undo`)", path.display())));
    }
    Ok(())
}

/// Replace the sync log with `ids`, or remove it when there are none.
async fn save_event_ids(path: &Path, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to remove sync log {:?}", path))
            }
            _ => Ok(()),
        };
    }
    let json = serde_json::to_string_pretty(ids).context("Failed to serialise event ids")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write sync log {:?}", path))
}

async fn run_book(
    session: &PlannerSession,
    args: FormArgs,
    check_only: bool,
    suggest_on: &[Weekday],
    quiet: bool,
) -> Result<()> {
    let (mut date, mut time, mut title) = (args.date, args.time, args.title);

    if let Some(ref text) = args.ai {
        let today = Local::now().date_naive();
        let draft = session
            .assist(text, today)
            .await
            .context("The model could not understand the request")?;
        if !quiet {
            eprintln!(
                "{} {} {} {}",
                cyan("◆"),
                draft.date,
                draft.time.format("%H:%M"),
                bold(&draft.title)
            );
        }
        date = date.or(Some(draft.date));
        time = time.or(Some(draft.time));
        title = title.or(Some(draft.title));
    }

    let form = OrganizerForm {
        date: date.context("--date is required (or use --ai)")?,
        time: time.context("--time is required (or use --ai)")?,
        title: title.context("--title is required (or use --ai)")?,
        targets: if args.targets.is_empty() {
            vec!["All".to_string()]
        } else {
            args.targets
        },
    };

    let tz = session.config().timezone;
    let weekdays = (!suggest_on.is_empty()).then_some(suggest_on);
    let request = session.request_from_form(&form)?;
    if check_only {
        let availability = session
            .check_availability(request.calendar, request.start, request.end)
            .await
            .context("Availability check failed")?;
        if availability.is_free() {
            println!("{} {} is free", green("✔"), request.start.format("%A, %d %b | %I:%M %p"));
            return Ok(());
        }
        print_conflicts(availability.conflicts(), tz);
        let suggestions = session.suggest_alternatives(&request, weekdays).await?;
        print_suggestions(&suggestions);
        return Ok(());
    }

    match session
        .book_request(&request, weekdays)
        .await
        .context("Booking failed")?
    {
        BookingOutcome::Booked(event) => {
            println!(
                "{} Booked '{}' {} ({})",
                green("✔"),
                form.title,
                event.start.format("%A, %d %b | %I:%M %p"),
                dim(&event.id)
            );
            if let Some(link) = event.html_link {
                println!("  {link}");
            }
        }
        BookingOutcome::Blocked {
            conflicts,
            suggestions,
        } => {
            print_conflicts(&conflicts, tz);
            print_suggestions(&suggestions);
            std::process::exit(2);
        }
    }
    Ok(())
}

fn print_conflicts(conflicts: &[timetable2cal::model::Conflict], tz: Tz) {
    println!("{} This time clashes with existing events:", red("✘"));
    for c in conflicts {
        println!(
            "  {} {} – {}",
            dim(&format!("[{}]", c.calendar)),
            c.interval.start.with_timezone(&tz).format("%a %d %b %I:%M %p"),
            c.interval.end.with_timezone(&tz).format("%I:%M %p"),
        );
    }
}

fn print_suggestions(suggestions: &[timetable2cal::SlotSuggestion]) {
    if suggestions.is_empty() {
        println!("{}", dim("No free alternative slots in the next few days."));
        return;
    }
    println!("{} Free alternatives:", cyan("◆"));
    for s in suggestions {
        println!("  {s}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_values_reach_the_parser() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "TT2CAL_STATIC_CALENDAR=Fall Classes\n").unwrap();

        load_env(Some(&env_file));
        let cli = Cli::try_parse_from(["tt2cal", "cleanup"]).unwrap();

        assert_eq!(cli.global.static_calendar.as_deref(), Some("Fall Classes"));
    }

    #[test]
    fn weekday_names_parse() {
        assert_eq!(parse_weekday("mon"), Ok(Weekday::Mon));
        assert_eq!(parse_weekday("Wednesday"), Ok(Weekday::Wed));
        assert!(parse_weekday("someday").is_err());
    }

    #[tokio::test]
    async fn remaining_ids_replace_the_sync_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("last_sync.json");
        std::fs::write(&log, r#"["a","b","c"]"#).unwrap();

        save_event_ids(&log, &["c".to_string()]).await.unwrap();
        let ids: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&log).unwrap()).unwrap();
        assert_eq!(ids, vec!["c"]);

        save_event_ids(&log, &[]).await.unwrap();
        assert!(!log.exists());
        // Removing an absent log is not an error.
        save_event_ids(&log, &[]).await.unwrap();
    }
}
