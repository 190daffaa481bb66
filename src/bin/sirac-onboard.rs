//! CLI binary for sirac-onboarding.
//!
//! A thin shim over the library crate: flags map onto `ClientConfig`, the
//! session lives in the platform data directory, and a headless onboarding
//! runs from a JSON record.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use sirac_onboarding::{
    Alert, AlertSink, ClientConfig, NormalizedDocument, Normalizer, Onboarding, OnboardingRecord,
    PageSize, Session, SharedAlertSink, SubmissionReceipt,
};
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

// ── Terminal alert sink using indicatif ──────────────────────────────────────

/// Spinner while documents are converted and the registration is sent;
/// alerts are printed above it.
struct CliAlertSink {
    bar: ProgressBar,
}

impl CliAlertSink {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AlertSink for CliAlertSink {
    fn on_alert(&self, alert: &Alert) {
        self.bar.println(format!(
            "  {} {}: {}",
            red("✗"),
            bold(&alert.title),
            alert.message
        ));
    }

    fn on_normalize_start(&self, uri: &str) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(uri.to_string());
    }

    fn on_normalize_complete(&self, doc: &NormalizedDocument) {
        let note = if doc.converted { "PDF" } else { "as picked" };
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            doc.path.display(),
            dim(note)
        ));
    }

    fn on_submission_start(&self, file_parts: usize) {
        self.bar.set_prefix("Submitting");
        self.bar.set_message(format!("{file_parts} document(s)…"));
    }

    fn on_submission_complete(&self, _receipt: &SubmissionReceipt) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Point the client at a backend (remembered for later runs)
  sirac-onboard set-base-url https://sirac.example.org

  # Log in (password read from stdin when not given)
  sirac-onboard login --email ana@sirac.co.mz

  # Convert a photo into the PDF that would be uploaded
  sirac-onboard normalize ~/DCIM/bi.jpg

  # Run a whole onboarding from a JSON record
  sirac-onboard submit merchant.json

RECORD FORMAT:
  {
    "profile": "merchant",                      // or "agent"
    "personal": {"nome": "...", "telefone": "841234567", "bi_numero": "110100123456B"},
    "password": "segredo123",
    "commercial": {"nome_comercial": "Loja X", "nuit": "123456789", "alvara": "45/2024"},
    "documents": {"bi_front": "/path/bi.jpg", "nuit": "/path/nuit.pdf"},
    "signature": "data:image/png;base64,...",
    "submitted_at": "2024-05-01T10:00:00Z"      // optional, defaults to now
  }

ENVIRONMENT VARIABLES:
  SIRAC_BASE_URL          Backend URL used when none is stored
  SIRAC_TIMEOUT           HTTP timeout in seconds (default 15)
  SIRAC_STORE_DIR         Directory holding the session file
  SIRAC_OUTPUT_DIR        Directory for rendered PDFs
  RUST_LOG                tracing filter, overrides -v/-q
"#;

/// Register SIRAC agents and merchants from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "sirac-onboard",
    version,
    about = "Register SIRAC agents and merchants from the command line",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Backend URL; a URL saved with `set-base-url` takes precedence.
    #[arg(long, global = true, env = "SIRAC_BASE_URL")]
    base_url: Option<String>,

    /// HTTP timeout in seconds.
    #[arg(long, global = true, env = "SIRAC_TIMEOUT", default_value_t = 15)]
    timeout: u64,

    /// Device label sent on login.
    #[arg(long, global = true, env = "SIRAC_DEVICE_NAME")]
    device_name: Option<String>,

    /// Directory for rendered PDFs.
    #[arg(long, global = true, env = "SIRAC_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Page geometry for rendered images.
    #[arg(long, global = true, env = "SIRAC_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Longest image edge before embedding.
    #[arg(long, global = true, env = "SIRAC_MAX_IMAGE_PIXELS", default_value_t = 2000)]
    max_image_pixels: u32,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "SIRAC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SIRAC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SIRAC_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session token.
    Login {
        #[arg(long, env = "SIRAC_EMAIL")]
        email: String,
        /// Read from stdin when omitted.
        #[arg(long, env = "SIRAC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored token and user.
    Logout,
    /// Show the stored user and effective backend URL.
    Whoami,
    /// Store the backend URL for later runs.
    SetBaseUrl {
        url: Option<String>,
        /// Remove the stored URL instead.
        #[arg(long, conflicts_with = "url")]
        reset: bool,
    },
    /// Convert one picked document the way the upload screen does.
    Normalize {
        /// Path, file:// URI or data: URI.
        uri: String,
        /// Fail instead of keeping the original when conversion fails.
        #[arg(long)]
        strict: bool,
    },
    /// Run a complete onboarding from a JSON record and submit it.
    Submit { record: PathBuf },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PageSizeArg {
    A4,
    Letter,
    Fit,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::Fit => PageSize::FitImage,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let config = build_config(&cli)?;
    let session = Session::open_default().context("Failed to open the session store")?;

    match cli.command {
        Command::Login {
            ref email,
            ref password,
        } => {
            let password = match password {
                Some(p) => SecretString::from(p.as_str()),
                None => read_password()?,
            };
            let mut flow = Onboarding::new(config, session).context("Invalid configuration")?;
            flow.login(email, &password).await.context("Login failed")?;
            flow.verify_token().context("Login did not produce a token")?;

            let user = &flow.state().user;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(user)?);
            } else if !cli.quiet {
                let name = user.as_ref().map(|u| u.name.as_str()).unwrap_or("");
                eprintln!("{} Logged in as {}", green("✔"), bold(name));
            }
        }

        Command::Logout => {
            session.logout().context("Failed to clear the session")?;
            if !cli.quiet {
                eprintln!("{} Logged out", green("✔"));
            }
        }

        Command::Whoami => {
            let user = session.user().context("Failed to read the session")?;
            let base_url = session.base_url(&config)?;
            if cli.json {
                let out = serde_json::json!({
                    "base_url": base_url,
                    "authenticated": session.is_authenticated(),
                    "user": user,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Backend:  {base_url}");
                match user {
                    Some(u) if session.is_authenticated() => {
                        println!("User:     {} <{}>", u.name, u.email);
                        if let Some(id) = u.id_string() {
                            println!("Id:       {id}");
                        }
                    }
                    _ => println!("User:     {}", dim("not logged in")),
                }
            }
        }

        Command::SetBaseUrl { ref url, reset } => {
            if reset {
                session.clear_base_url()?;
            } else {
                let url = url
                    .as_deref()
                    .context("Give a URL or use --reset")?;
                session.set_base_url(url).context("Failed to store base URL")?;
            }
            if !cli.quiet {
                eprintln!("{} Backend: {}", green("✔"), session.base_url(&config)?);
            }
        }

        Command::Normalize { ref uri, strict } => {
            let (sink, bar) = alert_sink(show_progress);
            let normalizer = Normalizer::new(&config, sink);
            let result = if strict {
                normalizer.try_normalize(uri).await
            } else {
                normalizer.normalize(uri).await
            };
            if let Some(bar) = bar {
                bar.finish();
            }
            let doc = result.with_context(|| format!("Failed to normalize '{uri}'"))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("{}", doc.path.display());
            }
        }

        Command::Submit { ref record } => {
            let text = tokio::fs::read_to_string(record)
                .await
                .with_context(|| format!("Failed to read record {:?}", record))?;
            let record = OnboardingRecord::from_json(&text)?;

            let (sink, bar) = alert_sink(show_progress);
            let mut flow = Onboarding::with_alerts(config, session, sink)
                .context("Invalid configuration")?;
            flow.resume()
                .context("Not logged in; run `sirac-onboard login` first")?;
            flow.verify_token()?;

            let outcome = flow.complete(record).await;
            if let Some(bar) = bar {
                bar.finish();
            }
            let receipt = match outcome {
                Ok(receipt) => receipt,
                Err(e) => {
                    let step = flow.step();
                    flow.abandon();
                    return Err(e).with_context(|| format!("Onboarding stopped at the {step} step"));
                }
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else if !cli.quiet {
                eprintln!(
                    "{} Registered  id {}  {}",
                    green("✔"),
                    bold(&receipt.registration_id),
                    dim(&format!("HTTP {}", receipt.status))
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .timeout_secs(cli.timeout)
        .page_size(cli.page_size.clone().into())
        .max_image_pixels(cli.max_image_pixels);

    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.as_str());
    }
    if let Some(ref name) = cli.device_name {
        builder = builder.device_name(name.as_str());
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir.clone());
    }

    builder.build().context("Invalid configuration")
}

fn alert_sink(show_progress: bool) -> (SharedAlertSink, Option<Arc<CliAlertSink>>) {
    if show_progress {
        let sink = CliAlertSink::new();
        (sink.clone(), Some(sink))
    } else {
        (Arc::new(sirac_onboarding::LogAlertSink), None)
    }
}

fn read_password() -> Result<SecretString> {
    if io::stdin().is_terminal() {
        eprint!("Password: ");
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(SecretString::from(line.trim_end_matches(['\r', '\n'])))
}
