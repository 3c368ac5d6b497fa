//! CLI binary for pdfunlock.
//!
//! A thin shim over the library crate that maps CLI flags to `UnlockConfig`,
//! answers password prompts on the terminal and writes results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use indicatif::{ProgressBar, ProgressStyle};
use pdfium_locate::LocateOptions;
use pdfunlock::api::{
    export_source_images, flatten_source, inspect_source, intake_batch, split_source,
};
use pdfunlock::output::write_atomic;
use pdfunlock::pipeline::assemble::merge;
use pdfunlock::pipeline::input::read_source_file;
use pdfunlock::pipeline::split::write_zip;
use pdfunlock::{
    output_filename, IntakeCoordinator, IntakeOutcome, IntakeReport, Operation, PageSelection,
    PdfiumEngine, ProgressCallback, ProgressTracker, SourceFile, SplitMode, UnlockAttempt,
    UnlockConfig, UnlockProgressCallback, Workspace,
};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one percentage bar per operation.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        Arc::new(Self { bar })
    }

    /// Run `f` with the bar hidden, for terminal prompts.
    fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.bar.suspend(f)
    }
}

impl UnlockProgressCallback for CliProgressCallback {
    fn on_operation_start(&self, operation: Operation) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.reset();
        self.bar.set_length(100);
        self.bar.set_prefix(operation.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_progress(&self, percent: u8, message: &str) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_operation_complete(&self, operation: Operation) {
        self.bar.finish_and_clear();
        self.bar.println(format!("{} {} done", green("✔"), operation));
    }

    fn on_operation_failed(&self, operation: Operation, error: &str) {
        self.bar.finish_and_clear();
        self.bar.println(format!("{} {} failed: {}", red("✘"), operation, error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Unlock a protected statement (prompts for the password if needed)
  pdfunlock unlock statement.pdf

  # Unlock with a known password, no prompt
  pdfunlock unlock --password hunter2 --no-prompt statement.pdf -o out/

  # Rasterise every page even when the password is known
  pdfunlock unlock --force --password hunter2 statement.pdf

  # Unlock several files and merge them into one
  pdfunlock merge a.pdf b.pdf c.pdf -o merged.pdf

  # One PDF per page, packed into a ZIP
  pdfunlock split report.pdf

  # Ranges and extraction
  pdfunlock split report.pdf --ranges 1-3,4-9
  pdfunlock split report.pdf --extract 2,5,7

  # Every page as a PNG
  pdfunlock images --scale 3 report.pdf

  # Page count, sizes and protection
  pdfunlock inspect --json report.pdf

UNLOCK STRATEGY:
  1. Open without a password; unprotected files are kept byte-for-byte.
  2. Owner-only protection: copy the pages into a new, unrestricted PDF.
  3. Otherwise flatten with an empty password: render every page to an
     image and rebuild the PDF.
  4. Otherwise ask for the password, copy the pages out losslessly, and
     flatten as a fallback. --force skips straight to a 4x flatten.

ENVIRONMENT VARIABLES:
  PDFUNLOCK_PASSWORD        Password for protected files
  PDFIUM_LIB_PATH           Path to an existing libpdfium (skips auto-download)
  PDFIUM_LOCATE_CACHE_DIR   Override the default pdfium cache directory

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdfunlock/pdfium-7690/.
"#;

/// Unlock, flatten, merge and split PDF files.
#[derive(Parser, Debug)]
#[command(
    name = "pdfunlock",
    version,
    about = "Unlock, flatten, merge and split PDF files",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Password for protected files.
    #[arg(long, global = true, env = "PDFUNLOCK_PASSWORD")]
    password: Option<String>,

    /// Never prompt; skip files whose password is unknown or wrong.
    #[arg(long, global = true, env = "PDFUNLOCK_NO_PROMPT")]
    no_prompt: bool,

    /// Flatten at the force scale instead of copying pages losslessly.
    #[arg(long, global = true, env = "PDFUNLOCK_FORCE")]
    force: bool,

    /// Render scale for automatic flattening (1.0–5.0).
    #[arg(long, global = true, env = "PDFUNLOCK_FLATTEN_SCALE", default_value_t = 2.0)]
    flatten_scale: f32,

    /// Render scale for forced flattening (1.0–5.0).
    #[arg(long, global = true, env = "PDFUNLOCK_FORCE_SCALE", default_value_t = 4.0)]
    force_scale: f32,

    /// Longest rendered edge in pixels.
    #[arg(long, global = true, env = "PDFUNLOCK_MAX_PIXELS", default_value_t = 10_000)]
    max_pixels: u32,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFUNLOCK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFUNLOCK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFUNLOCK_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove protection from one or more PDFs.
    Unlock {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (single input) or directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Always flatten, even unprotected files.
        #[arg(long)]
        flatten: bool,
    },

    /// Unlock and merge PDFs, in argument order.
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Split a PDF into parts, packed into a ZIP.
    Split {
        input: PathBuf,

        /// Comma-separated 1-based ranges, e.g. 1-3,4-9.
        #[arg(long, conflicts_with = "extract")]
        ranges: Option<String>,

        /// Pages to extract into one document: 5, 3-15 or 1,3,5.
        #[arg(long)]
        extract: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render every page to PNG, packed into a ZIP.
    Images {
        input: PathBuf,

        /// Render scale (0.1–5.0).
        #[arg(long, default_value_t = 2.0)]
        scale: f32,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print page count, page sizes and protection.
    Inspect {
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // On the very first run the library (~30 MB) is downloaded to the cache;
    // later runs only check the path.
    let engine = tokio::task::block_in_place(|| bind_engine(cli.quiet))?;

    let progress = CliProgressCallback::new();
    let config = build_config(&cli, show_progress.then(|| progress.clone() as ProgressCallback))?;
    let tracker = ProgressTracker::new(config.progress_callback.clone());

    let session = Session {
        engine: &engine,
        tracker: &tracker,
        config: &config,
        progress: &progress,
        prompt: !cli.no_prompt,
        quiet: cli.quiet,
    };
    tokio::task::block_in_place(|| session.run(cli.command))
}

fn bind_engine(quiet: bool) -> Result<PdfiumEngine> {
    if quiet || pdfium_locate::find_local().is_some() {
        return PdfiumEngine::bind().context("Failed to load the PDFium engine");
    }
    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    let on_progress = move |downloaded: u64, total: Option<u64>| {
        if let Some(t) = total {
            if bar.length().unwrap_or(0) != t {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    };
    let options = LocateOptions {
        allow_download: true,
        on_progress: Some(&on_progress),
    };
    let pdfium = pdfium_locate::bind(&options).context("Failed to download PDFium engine")?;
    dl_bar.finish_with_message("ready ✓");
    Ok(PdfiumEngine::new(pdfium))
}

/// Map CLI args to `UnlockConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<UnlockConfig> {
    let mut builder = UnlockConfig::builder()
        .flatten_scale(cli.flatten_scale)
        .force_flatten_scale(cli.force_scale)
        .max_rendered_pixels(cli.max_pixels)
        .thumbnail_scale(0.1)
        .force_unlock(cli.force);
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

struct Session<'a> {
    engine: &'a PdfiumEngine,
    tracker: &'a ProgressTracker,
    config: &'a UnlockConfig,
    progress: &'a CliProgressCallback,
    prompt: bool,
    quiet: bool,
}

impl Session<'_> {
    fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Unlock {
                inputs,
                output,
                flatten,
            } => self.unlock(&inputs, output.as_deref(), flatten),
            Command::Merge { inputs, output } => self.merge(&inputs, output.as_deref()),
            Command::Split {
                input,
                ranges,
                extract,
                output,
            } => {
                let mode = match (ranges, extract) {
                    (Some(r), _) => SplitMode::Ranges(parse_ranges(&r)?),
                    (None, Some(e)) => SplitMode::Extract(parse_pages(&e)?),
                    (None, None) => SplitMode::EveryPage,
                };
                self.split(&input, &mode, output.as_deref())
            }
            Command::Images { input, scale, output } => self.images(&input, scale, output.as_deref()),
            Command::Inspect { input, json } => self.inspect(&input, json),
        }
    }

    fn read_all(&self, inputs: &[PathBuf]) -> Result<Vec<SourceFile>> {
        inputs
            .iter()
            .map(|p| read_source_file(p).with_context(|| format!("Failed to read {}", p.display())))
            .collect()
    }

    /// Run intake, answering prompts on the terminal.
    fn intake(&self, files: Vec<SourceFile>) -> Result<(Workspace, IntakeReport)> {
        let mut workspace = Workspace::new();
        if !self.prompt {
            let report = intake_batch(self.engine, self.tracker, &mut workspace, files, self.config)?;
            return Ok((workspace, report));
        }

        let mut coordinator = IntakeCoordinator::new(self.engine, self.tracker, self.config.clone());
        let mut outcome = coordinator.ingest(&mut workspace, files)?;
        loop {
            match outcome {
                IntakeOutcome::Completed(report) => return Ok((workspace, report)),
                IntakeOutcome::AwaitingPassword(attempt) => {
                    let answer = match (&self.config.password, &attempt.password_guess) {
                        (Some(pwd), None) => Some(pwd.clone()),
                        _ => self.progress.suspend(|| ask_password(&attempt))?,
                    };
                    let force = self.config.force_unlock;
                    outcome = match answer {
                        Some(pwd) => coordinator.submit_password(&mut workspace, &pwd, force)?,
                        None => coordinator.cancel(&mut workspace)?,
                    };
                }
            }
        }
    }

    fn print_report(&self, report: &IntakeReport) {
        if self.quiet {
            return;
        }
        for c in &report.committed {
            eprintln!(
                "  {} {:<32} {:>4} pages  {}",
                green("✓"),
                c.file_name,
                c.page_count,
                dim(&format!("{:?}", c.method).to_lowercase())
            );
        }
        for s in &report.skipped {
            eprintln!("  {} {:<32} {}", red("✗"), s.file_name, red(&s.reason));
        }
    }

    fn unlock(&self, inputs: &[PathBuf], output: Option<&Path>, flatten: bool) -> Result<()> {
        let start = Instant::now();
        let files = self.read_all(inputs)?;
        let single_file_output = output.filter(|p| files.len() == 1 && !p.is_dir());

        let results: Vec<(String, Vec<u8>, Operation)> = if flatten {
            files
                .into_iter()
                .map(|f| -> Result<(String, Vec<u8>, Operation)> {
                    let out = flatten_source(self.engine, self.tracker, f, self.config)?;
                    Ok((out.file_name, out.bytes, Operation::Flatten))
                })
                .collect::<Result<_>>()?
        } else {
            let (workspace, report) = self.intake(files)?;
            self.print_report(&report);
            report
                .committed
                .iter()
                .map(|c| {
                    let bytes = workspace.files()[c.file_index].bytes.clone();
                    (c.file_name.clone(), bytes, c.method.operation())
                })
                .collect()
        };

        for (name, bytes, operation) in &results {
            let path = match single_file_output {
                Some(path) => path.to_path_buf(),
                None => output
                    .unwrap_or_else(|| Path::new("."))
                    .join(output_filename(*operation, Some(name), "pdf")),
            };
            write_atomic(&path, bytes)?;
            if !self.quiet {
                eprintln!("{}  {}  →  {}", green("✔"), name, bold(&path.display().to_string()));
            }
        }
        if !self.quiet {
            eprintln!("{}", dim(&format!("{} files in {}ms", results.len(), start.elapsed().as_millis())));
        }
        if results.len() < inputs.len() {
            anyhow::bail!("{} of {} files were not unlocked", inputs.len() - results.len(), inputs.len());
        }
        Ok(())
    }

    fn merge(&self, inputs: &[PathBuf], output: Option<&Path>) -> Result<()> {
        let files = self.read_all(inputs)?;
        let first_name = files.first().map(|f| f.name.clone());
        let (workspace, report) = self.intake(files)?;
        self.print_report(&report);

        let op = self.tracker.begin(Operation::Merge)?;
        let on_progress = |pct: u8, msg: &str| op.report(pct, msg);
        let merged = merge(self.engine, &workspace.snapshot(), &on_progress);
        let bytes = match merged {
            Ok(bytes) => {
                op.complete();
                bytes
            }
            Err(e) => {
                op.fail(&e.to_string());
                return Err(e).context("Merge failed");
            }
        };

        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(output_filename(Operation::Merge, first_name.as_deref(), "pdf")));
        write_atomic(&path, &bytes)?;
        if !self.quiet {
            eprintln!(
                "{}  {} pages from {} files  →  {}",
                green("✔"),
                workspace.pages().len(),
                workspace.files().len(),
                bold(&path.display().to_string())
            );
        }
        Ok(())
    }

    fn split(&self, input: &Path, mode: &SplitMode, output: Option<&Path>) -> Result<()> {
        let file = read_source_file(input)?;
        let parts = split_source(self.engine, self.tracker, &file, mode, self.config)?;
        let zip = write_zip(&parts)?;
        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(output_filename(Operation::Split, Some(&file.name), "zip")));
        write_atomic(&path, &zip)?;
        if !self.quiet {
            eprintln!("{}  {} parts  →  {}", green("✔"), parts.len(), bold(&path.display().to_string()));
        }
        Ok(())
    }

    fn images(&self, input: &Path, scale: f32, output: Option<&Path>) -> Result<()> {
        let file = read_source_file(input)?;
        let scale = scale.clamp(0.1, 5.0);
        let parts = export_source_images(self.engine, self.tracker, &file, scale, self.config)?;
        let zip = write_zip(&parts)?;
        let path = output.map(Path::to_path_buf).unwrap_or_else(|| {
            PathBuf::from(output_filename(Operation::ExportImages, Some(&file.name), "zip"))
        });
        write_atomic(&path, &zip)?;
        if !self.quiet {
            eprintln!("{}  {} images  →  {}", green("✔"), parts.len(), bold(&path.display().to_string()));
        }
        Ok(())
    }

    fn inspect(&self, input: &Path, json: bool) -> Result<()> {
        let file = read_source_file(input)?;
        let info = inspect_source(self.engine, &file, self.config.password.as_deref())
            .context("Failed to inspect PDF")?;
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
            );
            return Ok(());
        }
        println!("File:         {}", input.display());
        println!("Pages:        {}", info.page_count);
        println!("Encrypted:    {}", info.encrypted);
        println!("Opened with:  {:?}", info.opened_with);
        for (i, size) in info.page_sizes.iter().enumerate() {
            println!("  {:>4}  {:.0} × {:.0} pt", i + 1, size.width, size.height);
        }
        Ok(())
    }
}

/// Ask for a password without echo. `None` (empty input, Esc or EOF) skips the file.
fn ask_password(attempt: &UnlockAttempt) -> Result<Option<String>> {
    let mut stderr = io::stderr();
    if let Some(ref err) = attempt.last_error {
        writeln!(stderr, "  {} {}", red("✗"), err)?;
    }
    write!(
        stderr,
        "{} Password for {} {}: ",
        cyan("◆"),
        bold(&attempt.file_name),
        dim("(empty to skip)")
    )?;
    stderr.flush()?;

    let pwd = if io::stdin().is_terminal() {
        let pwd = read_hidden_line();
        writeln!(stderr)?;
        pwd?
    } else {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).context("Failed to read password")?;
        (read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_string())
    };
    Ok(pwd.filter(|p| !p.is_empty()))
}

/// Restores cooked mode when dropped, even on early return.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to switch the terminal to raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Read one line from the terminal without echoing it.
fn read_hidden_line() -> Result<Option<String>> {
    let _raw = RawModeGuard::enable()?;
    let mut pwd = String::new();
    loop {
        if let Event::Key(key) = event::read().context("Failed to read password")? {
            if let Some(done) = apply_key(&mut pwd, key) {
                return Ok(done);
            }
        }
    }
}

/// Feed one key press into a hidden line. `Some(..)` ends the prompt:
/// `Some(Some(pwd))` on Enter, `Some(None)` on Esc, Ctrl-C or Ctrl-D.
fn apply_key(pwd: &mut String, key: KeyEvent) -> Option<Option<String>> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Enter => return Some(Some(std::mem::take(pwd))),
        KeyCode::Esc => return Some(None),
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => return Some(None),
        KeyCode::Backspace => {
            pwd.pop();
        }
        KeyCode::Char(c) => pwd.push(c),
        _ => {}
    }
    None
}

/// Parse `--ranges` ("1-3,4-9,12") into 1-based inclusive ranges.
fn parse_ranges(s: &str) -> Result<Vec<(usize, usize)>> {
    s.split(',')
        .map(|part| match parse_pages(part)? {
            PageSelection::Single(p) => Ok((p, p)),
            PageSelection::Range(a, b) => Ok((a, b)),
            _ => anyhow::bail!("Invalid range: '{}'", part.trim()),
        })
        .collect()
}

/// Parse a page selection string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1");
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
