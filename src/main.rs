use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use optocom::{
    AppConfig, AppState, ClientError, Credentials, FileTokenStore, ForecastView, Granularity,
    NavCommand, OptoComClient, Paginator, PatientInput, RecordKind, Registration, RequestToken,
    Route, Session, StatusMessage, SystemClock, WindowAggregate,
    navigation::{default_anchor, parse_command},
    patients::load_day,
    traits::TokenStore,
    validator::validate_csv,
    widgets::{
        format_money, forecast_chart::ForecastChart, patient_table::PatientTable,
        validation_panel::ValidationPanel,
    },
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinSet,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "optocom")]
#[command(about = "OptoCom client - validate and upload patient CSVs, view spend forecasts")]
#[command(version)]
struct Args {
    /// Backend base URL (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a practice account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        practice_name: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Log in and store the session token
    Login {
        #[arg(long)]
        username: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session token
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Check a CSV file without uploading it
    Validate {
        file: PathBuf,
        #[arg(long, value_enum)]
        kind: RecordKind,
    },
    /// Validate and upload a CSV file
    Upload {
        file: PathBuf,
        #[arg(long, value_enum)]
        kind: RecordKind,
    },
    /// Download a demo CSV
    DemoCsv {
        #[arg(long, value_enum)]
        kind: RecordKind,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Patient table for one day
    Patients {
        /// Day to show (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Predicted vs actual spend chart
    Forecast {
        #[arg(long, value_enum)]
        view: Option<Granularity>,
        /// Anchor date (YYYY-MM-DD; YYYY-MM for the monthly view)
        #[arg(long)]
        date: Option<String>,
        /// Navigate with n/p/d/w/m/q commands read from stdin
        #[arg(short, long)]
        interactive: bool,
    },
    /// Predict spend for a single patient
    Predict {
        #[arg(long)]
        age: u32,
        /// Days since last purchase
        #[arg(long, default_value_t = 700)]
        days_lps: u32,
        #[arg(long)]
        employed: bool,
        #[arg(long)]
        benefits: bool,
        #[arg(long)]
        driver: bool,
        #[arg(long)]
        vdu: bool,
        #[arg(long)]
        varifocal: bool,
        #[arg(long)]
        high_rx: bool,
    },
    /// Delete all uploaded data
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

impl Command {
    /// View this command belongs to, if it is subject to routing.
    fn route(&self) -> Option<Route> {
        match self {
            Command::Register { .. } => Some(Route::Register),
            Command::Login { .. } => Some(Route::Login),
            Command::Predict { .. } => Some(Route::LegacyPredictor),
            Command::Whoami
            | Command::Upload { .. }
            | Command::Patients { .. }
            | Command::Forecast { .. }
            | Command::Clear { .. } => Some(Route::Dashboard),
            Command::Logout | Command::Validate { .. } | Command::DemoCsv { .. } => None,
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let directive = if args.verbose {
        "optocom=debug"
    } else {
        "optocom=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
            .parse_lossy(directive)
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    // Validation is local; no config, runtime or session needed
    if let Command::Validate { file, kind } = &args.command {
        return validate_file(file, *kind);
    }

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(url) = args.api_url {
        config.api.base_url = url;
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let code = rt.block_on(run(args.command, Arc::new(config)));
    // A pending stdin read would otherwise hold up shutdown
    rt.shutdown_background();
    code
}

async fn run(command: Command, config: Arc<AppConfig>) -> Result<ExitCode> {
    let client = OptoComClient::new(&config.api.base_url, &config.network)
        .context("Failed to create API client")?;
    let store = FileTokenStore::new(
        config
            .storage
            .token_file
            .clone()
            .unwrap_or_else(FileTokenStore::default_path),
    );
    let mut session = Session::new(client, store);
    let mut state = AppState::default();

    if let Some(route) = command.route() {
        let user = session
            .restore()
            .await
            .context("Could not reach the OptoCom backend")?;
        if let Some(user) = user {
            state.sign_in(user);
        }

        let landed = state.navigate(route);
        if landed != route {
            return Ok(match landed {
                Route::Login => {
                    eprintln!("Not logged in. Run `optocom login` first.");
                    ExitCode::FAILURE
                }
                _ => {
                    let name = state.user().map(|u| u.username.as_str()).unwrap_or("");
                    println!("Already logged in as {}.", name);
                    ExitCode::SUCCESS
                }
            });
        }
    }

    match command {
        Command::Register {
            username,
            email,
            practice_name,
            password,
        } => {
            let registration = Registration {
                username,
                email,
                practice_name,
                password: read_password(password)?,
            };
            match session.client().register(&registration).await {
                Ok(()) => state.set_message(StatusMessage::success(
                    "Registration successful. You can now log in.",
                )),
                Err(e) => state.report_error(&e, "Registration failed"),
            }
        }
        Command::Login { username, password } => {
            let credentials = Credentials {
                username,
                password: read_password(password)?,
            };
            state.set_loading(true);
            match session.login(&credentials).await {
                Ok(user) => {
                    let text = match &user.practice_name {
                        Some(practice) => format!("Logged in as {} ({})", user.username, practice),
                        None => format!("Logged in as {}", user.username),
                    };
                    state.sign_in(user);
                    state.set_message(StatusMessage::success(text));
                }
                Err(e) => state.report_error(&e, "Login failed"),
            }
            state.set_loading(false);
        }
        Command::Logout => {
            session.logout().context("Failed to remove stored token")?;
            state.sign_out();
            tracing::info!("Logged out");
            state.set_message(StatusMessage::success("Logged out"));
        }
        Command::Whoami => {
            if let Some(user) = state.user() {
                println!("{}", user.username);
                if let Some(email) = &user.email {
                    println!("Email:    {}", email);
                }
                if let Some(practice) = &user.practice_name {
                    println!("Practice: {}", practice);
                }
            }
        }
        Command::Validate { .. } => {}
        Command::Upload { file, kind } => {
            let (name, bytes) = read_csv_file(&file)?;
            let report = validate_csv(&String::from_utf8_lossy(&bytes), kind);
            if !report.valid {
                print!(
                    "{}",
                    ValidationPanel {
                        file_name: &name,
                        report: &report
                    }
                    .render()
                );
                state.set_message(StatusMessage::error(
                    "Upload blocked: fix the errors above and try again",
                ));
            } else {
                state.set_uploading(true);
                let result = session.client().upload_csv(kind, &name, bytes).await;
                match session.check(&mut state, result) {
                    Ok(response) => state.set_message(StatusMessage::success(response.message)),
                    Err(e) => state.report_error(&e, "Upload failed"),
                }
                state.set_uploading(false);
            }
        }
        Command::DemoCsv { kind, output } => {
            let bytes = match session.client().demo_csv(kind).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    state.report_error(&e, "Failed to download demo CSV");
                    return Ok(finish(&state));
                }
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    state.set_message(StatusMessage::success(format!(
                        "Saved demo {} CSV to {}",
                        kind,
                        path.display()
                    )));
                }
                None => io::stdout()
                    .write_all(&bytes)
                    .context("Failed to write to stdout")?,
            }
        }
        Command::Patients { date, page } => {
            let date = default_anchor(&SystemClock, Granularity::Daily, date.as_deref())?;
            state.set_loading(true);
            let result = load_day(session.client(), date).await;
            state.set_loading(false);
            match session.check(&mut state, result) {
                Ok(rows) => {
                    let mut pager =
                        Paginator::new(rows.len(), config.table.page_size, config.table.page_window);
                    pager.go_to(page);
                    print!(
                        "{}",
                        PatientTable {
                            date,
                            rows: &rows,
                            pager: &pager
                        }
                        .render()
                    );
                }
                Err(e) => state.report_error(&e, "Failed to load patients"),
            }
        }
        Command::Forecast {
            view,
            date,
            interactive,
        } => {
            let granularity = view.unwrap_or(config.forecast.default_view);
            let anchor = default_anchor(&SystemClock, granularity, date.as_deref())?;
            let chart_width = config.forecast.chart_width;
            let source = Arc::new(session.client().clone());
            let mut forecast = ForecastView::new(granularity, anchor);

            let (token, result) = forecast.request().run(Arc::clone(&source)).await;
            let mut signed_in = show_window(
                &mut session,
                &mut state,
                &mut forecast,
                token,
                result,
                chart_width,
            );

            if interactive && signed_in {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                let mut in_flight = JoinSet::new();
                prompt()?;
                while signed_in {
                    tokio::select! {
                        line = lines.next_line() => {
                            let Some(line) = line.context("Failed to read command")? else {
                                break;
                            };
                            match parse_command(&line) {
                                Some(NavCommand::Quit) => break,
                                Some(command) => {
                                    if let Some(request) = forecast.apply(command) {
                                        in_flight.spawn(request.run(Arc::clone(&source)));
                                    }
                                }
                                None => eprintln!(
                                    "Commands: n(ext), p(revious), d(aily), w(eekly), m(onthly), g YYYY-MM-DD, q(uit)"
                                ),
                            }
                            prompt()?;
                        }
                        Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                            let (token, result) = joined.context("Forecast fetch task failed")?;
                            signed_in = show_window(
                                &mut session,
                                &mut state,
                                &mut forecast,
                                token,
                                result,
                                chart_width,
                            );
                        }
                    }
                }
                in_flight.abort_all();
            }
        }
        Command::Predict {
            age,
            days_lps,
            employed,
            benefits,
            driver,
            vdu,
            varifocal,
            high_rx,
        } => {
            let input = PatientInput {
                age,
                days_lps,
                employed,
                benefits,
                driver,
                vdu,
                varifocal,
                high_rx,
            };
            match session.client().predict(&input).await {
                Ok(output) => {
                    println!("Purchase probability: {:.1}%", output.probability_percent());
                    println!("Predicted spend:      {}", format_money(output.predicted_spend));
                }
                Err(e) => state.report_error(&e, "Prediction failed. Please try again."),
            }
        }
        Command::Clear { yes } => {
            if !yes {
                state.set_message(StatusMessage::error(
                    "This deletes all uploaded data. Re-run with --yes to confirm.",
                ));
            } else {
                state.set_clearing(true);
                let result = session.client().clear_data().await;
                match session.check(&mut state, result) {
                    Ok(response) => {
                        tracing::info!("Cleared user data");
                        state.set_message(StatusMessage::success(response.message));
                    }
                    Err(e) => state.report_error(&e, "Failed to clear data"),
                }
                state.set_clearing(false);
            }
        }
    }

    Ok(finish(&state))
}

/// Print the status banner and map it to an exit code.
fn finish(state: &AppState) -> ExitCode {
    match state.message() {
        Some(message) if message.is_error() => {
            eprintln!("{}", message.text);
            ExitCode::FAILURE
        }
        Some(message) => {
            println!("{}", message.text);
            ExitCode::SUCCESS
        }
        None => ExitCode::SUCCESS,
    }
}

fn validate_file(file: &Path, kind: RecordKind) -> Result<ExitCode> {
    let (name, bytes) = read_csv_file(file)?;
    let report = validate_csv(&String::from_utf8_lossy(&bytes), kind);
    print!(
        "{}",
        ValidationPanel {
            file_name: &name,
            report: &report
        }
        .render()
    );
    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_csv_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());
    Ok((name, bytes))
}

fn read_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    eprint!("Password: ");
    io::stderr().flush().context("Failed to flush prompt")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

fn prompt() -> Result<()> {
    eprint!("> ");
    io::stderr().flush().context("Failed to flush prompt")
}

/// Render a finished window fetch if it is still the latest one.
///
/// Returns `false` once the backend has rejected the session.
fn show_window<T: TokenStore>(
    session: &mut Session<T>,
    state: &mut AppState,
    forecast: &mut ForecastView,
    token: RequestToken,
    result: Result<WindowAggregate, ClientError>,
    chart_width: usize,
) -> bool {
    let aggregate = match session.check(state, result) {
        Ok(aggregate) => aggregate,
        Err(e) if e.is_unauthorized() => {
            state.set_message(StatusMessage::error(
                "Session expired. Run `optocom login` to sign in again.",
            ));
            return false;
        }
        Err(e) => {
            state.report_error(&e, "Failed to load forecast");
            return true;
        }
    };
    if !forecast.accept(token, aggregate) {
        return true;
    }
    if let (Some(series), Some(current)) = (forecast.series(), forecast.current()) {
        print!(
            "{}",
            ForecastChart::new(&series, chart_width)
                .with_failed_dates(&current.failed_dates)
                .render()
        );
    }
    true
}
