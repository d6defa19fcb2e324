use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use autotype::answer::openai::{OpenAiAnswerClient, DEFAULT_API_BASE, DEFAULT_MODEL};
use autotype::answer::{answer_all, answer_and_type_all, Credentials, OPENAI_API_KEY_ENV};
use autotype::dom::Document;
use autotype::protocol::{ContentAgent, DEFAULT_ANSWER_SPEED_WPM};
use autotype::questions::detect_questions;
use autotype::settings::TypingSettings;
use autotype::text_locator::TextLocator;
use autotype::trace::{event_console_trace, print_trace_line, progress_lines, summary_lines};
use autotype::typing::{countdown, start_typing, type_answer, Interrupt, SessionOutcome, StopFlag};

#[derive(Debug, Parser)]
#[command(name = "autotype")]
#[command(about = "Find typing-test text on a page snapshot and type it at a human pace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args, Clone)]
struct PageArgs {
    /// Page snapshot (JSON), or '-' for stdin
    #[arg(long, value_name = "PATH")]
    page: PathBuf,
}

#[derive(Debug, Args, Clone)]
struct AnswerModelArgs {
    /// Chat model used to answer questions.
    #[arg(long, default_value_t = DEFAULT_MODEL.to_string())]
    model: String,

    /// OpenAI-compatible API base URL.
    #[arg(long, default_value_t = DEFAULT_API_BASE.to_string())]
    api_base: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the text a typing test on the page wants typed
    Detect {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Dump every text candidate with its measurements (JSON)
    Debug {
        #[command(flatten)]
        page: PageArgs,
    },

    /// List questions that have an answer field nearby (JSON)
    Questions {
        #[command(flatten)]
        page: PageArgs,

        /// Also ask the model for an answer to each question.
        ///
        /// Reads the key from OPENAI_API_KEY. Requires `--features llm`.
        #[arg(long)]
        answer: bool,

        /// Type each answer into its field
        #[arg(long = "type", requires = "answer")]
        type_answers: bool,

        /// Answer typing speed in words per minute
        #[arg(long, default_value_t = DEFAULT_ANSWER_SPEED_WPM)]
        speed: u32,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Write the resulting page snapshot here
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        #[command(flatten)]
        model: AnswerModelArgs,
    },

    /// Type text into the page's input field
    Type {
        #[command(flatten)]
        page: PageArgs,

        /// Text to type (defaults to the text detected on the page)
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,

        /// File holding the text to type, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Typing settings (JSON); flags below override it
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,

        /// Target words per minute (10-200)
        #[arg(long)]
        wpm: Option<u32>,

        /// Divides the per-character delay; above 1.0 types faster
        #[arg(long)]
        speed_adjustment: Option<f64>,

        /// Countdown seconds before typing starts
        #[arg(long)]
        start_delay: Option<u32>,

        /// Type with fixed delays
        #[arg(long)]
        no_randomness: bool,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Write the resulting page snapshot here
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Disable console typing trace output
        #[arg(long)]
        no_trace: bool,
    },

    /// Type an answer into the field matching a selector
    Answer {
        #[command(flatten)]
        page: PageArgs,

        /// Selector of the answer field
        #[arg(long)]
        selector: String,

        /// Answer text
        #[arg(long)]
        text: String,

        /// Typing speed in words per minute
        #[arg(long, default_value_t = DEFAULT_ANSWER_SPEED_WPM)]
        speed: u32,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Write the resulting page snapshot here
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Answer JSON requests, one per line on stdin, with one JSON response per line
    Serve {
        #[command(flatten)]
        page: PageArgs,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Write the final page snapshot here on exit
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        #[command(flatten)]
        model: AnswerModelArgs,
    },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn load_page(page: &PageArgs) -> Result<Document> {
    let json = read_input(&page.page)?;
    Document::from_json(&json).with_context(|| format!("invalid page {}", page.page.display()))
}

fn write_snapshot(path: &Path, doc: &Document) -> Result<()> {
    let json =
        serde_json::to_string_pretty(&doc.to_snapshot()).context("failed to serialize page")?;
    write_output(path, &json)
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn install_stop_handler() -> Result<StopFlag> {
    let stop = StopFlag::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.stop()).context("failed to install Ctrl+C handler")?;
    }
    Ok(stop)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start tokio runtime")
}

fn build_settings(
    path: Option<&Path>,
    wpm: Option<u32>,
    speed_adjustment: Option<f64>,
    start_delay: Option<u32>,
    no_randomness: bool,
) -> Result<TypingSettings> {
    let mut settings = match path {
        Some(path) => {
            let json = read_input(path)?;
            serde_json::from_str::<TypingSettings>(&json)
                .with_context(|| format!("invalid settings {}", path.display()))?
        }
        None => TypingSettings::default(),
    };

    if let Some(wpm) = wpm {
        settings.set_target_wpm(wpm);
    }
    if let Some(speed_adjustment) = speed_adjustment {
        settings.set_speed_adjustment(speed_adjustment);
    }
    if let Some(start_delay) = start_delay {
        settings = settings.with_start_delay(start_delay);
    }
    if no_randomness {
        settings = settings.with_randomness(false);
    }

    settings.validate().context("invalid typing settings")?;
    Ok(settings)
}

#[cfg(feature = "llm")]
fn credentials_from_env() -> Result<Credentials> {
    dotenvy::dotenv().ok();
    let api_key = std::env::var(OPENAI_API_KEY_ENV)
        .with_context(|| format!("{OPENAI_API_KEY_ENV} is not set"))?;
    Ok(Credentials::new(api_key))
}

#[cfg(not(feature = "llm"))]
fn credentials_from_env() -> Result<Credentials> {
    Err(anyhow!(
        "LLM support is disabled (build with --features llm to use {OPENAI_API_KEY_ENV})"
    ))
}

fn answer_client(model: &AnswerModelArgs) -> OpenAiAnswerClient {
    OpenAiAnswerClient::default()
        .with_model(model.model.clone())
        .with_api_base(model.api_base.clone())
}

fn run_type(
    mut doc: Document,
    text: String,
    settings: TypingSettings,
    seed: Option<u64>,
    trace: bool,
) -> Result<Document> {
    let stop = install_stop_handler()?;
    let mut rng = rng_from_seed(seed);

    eprintln!(
        "Typing {} chars at {} WPM ({}ms/char, {}ms/word)",
        text.chars().count(),
        settings.target_wpm(),
        settings.char_delay_ms(),
        settings.word_delay_ms()
    );

    let summary = runtime()?.block_on(async {
        let delay = settings.start_delay_seconds();
        if delay > 0 {
            eprintln!("Starting in {delay}s...");
            if !countdown(delay, &stop, |remaining| eprintln!("{remaining}...")).await {
                return Err(anyhow!("aborted"));
            }
        }
        start_typing(&mut doc, &text, &settings, &mut rng, &stop)
            .await
            .context("typing failed")
    })?;

    if trace {
        for line in event_console_trace(&doc)
            .iter()
            .chain(progress_lines(&summary).iter())
            .chain(summary_lines(&summary).iter())
        {
            print_trace_line(line);
        }
    }

    Ok(doc)
}

/// Ctrl+C cancels the request in progress; while waiting for input it exits.
fn install_serve_interrupt() -> Result<Interrupt> {
    let interrupt = Interrupt::new(StopFlag::new());
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || {
            if interrupt.trigger() {
                std::process::exit(130);
            }
        })
        .context("failed to install Ctrl+C handler")?;
    }
    Ok(interrupt)
}

fn serve(mut agent: ContentAgent<OpenAiAnswerClient>, interrupt: &Interrupt) -> Result<Document> {
    let rt = runtime()?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = {
            let _running = interrupt.begin();
            rt.block_on(agent.handle_json(&line))
        };
        writeln!(stdout, "{response}").context("failed to write response")?;
        stdout.flush().context("failed to flush stdout")?;
    }

    Ok(agent.into_document())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Detect { page } => {
            let doc = load_page(&page)?;
            match TextLocator::default().locate(&doc) {
                Some(text) => println!("{text}"),
                None => bail!("no typing text found on the page"),
            }
        }
        Command::Debug { page } => {
            let doc = load_page(&page)?;
            let debug = TextLocator::default().debug_detection(&doc);
            let json =
                serde_json::to_string_pretty(&debug).context("failed to serialize report")?;
            println!("{json}");
        }
        Command::Questions {
            page,
            answer,
            type_answers,
            speed,
            seed,
            output,
            model,
        } => {
            let mut doc = load_page(&page)?;
            let mut questions = detect_questions(&doc);
            eprintln!("Detected {} questions with input fields", questions.len());

            if answer && !questions.is_empty() {
                let credentials = credentials_from_env()?;
                let client = answer_client(&model);
                if type_answers {
                    let stop = install_stop_handler()?;
                    let mut rng = rng_from_seed(seed);
                    let report = runtime()?.block_on(answer_and_type_all(
                        &mut doc,
                        &mut questions,
                        &client,
                        &credentials,
                        speed,
                        &mut rng,
                        &stop,
                    ));
                    eprintln!(
                        "Typed {}/{} answers ({} failed){}",
                        report.typed,
                        questions.len(),
                        report.failed,
                        if report.cancelled { ", cancelled" } else { "" }
                    );
                } else {
                    let answered =
                        runtime()?.block_on(answer_all(&mut questions, &client, &credentials));
                    eprintln!("Answered {answered}/{} questions", questions.len());
                }
            }

            let json =
                serde_json::to_string_pretty(&questions).context("failed to serialize questions")?;
            println!("{json}");

            if let Some(out) = output {
                write_snapshot(&out, &doc)?;
            }
        }
        Command::Type {
            page,
            text,
            input,
            settings,
            wpm,
            speed_adjustment,
            start_delay,
            no_randomness,
            seed,
            output,
            no_trace,
        } => {
            let doc = load_page(&page)?;
            let settings = build_settings(
                settings.as_deref(),
                wpm,
                speed_adjustment,
                start_delay,
                no_randomness,
            )?;

            let text = match (text, input) {
                (Some(text), _) => text,
                (None, Some(path)) => read_input(&path)?,
                (None, None) => TextLocator::default()
                    .locate(&doc)
                    .context("no typing text found on the page; pass --text or --input")?,
            };

            let doc = run_type(doc, text, settings, seed, !no_trace)?;
            if let Some(out) = output {
                write_snapshot(&out, &doc)?;
            }
        }
        Command::Answer {
            page,
            selector,
            text,
            speed,
            seed,
            output,
        } => {
            let mut doc = load_page(&page)?;
            let stop = install_stop_handler()?;
            let mut rng = rng_from_seed(seed);

            let typed = runtime()?
                .block_on(type_answer(&mut doc, &selector, &text, speed, &mut rng, &stop))
                .context("typing answer failed")?;
            match typed.outcome {
                SessionOutcome::Completed => {
                    eprintln!("Typed {} chars into {selector}", typed.chars_typed)
                }
                SessionOutcome::Cancelled => eprintln!(
                    "Cancelled after {} chars into {selector}",
                    typed.chars_typed
                ),
            }

            if let Some(out) = output {
                write_snapshot(&out, &doc)?;
            }
        }
        Command::Serve {
            page,
            seed,
            output,
            model,
        } => {
            let doc = load_page(&page)?;
            let interrupt = install_serve_interrupt()?;
            let mut agent =
                ContentAgent::new(doc, answer_client(&model)).with_stop_flag(interrupt.stop_flag());
            if let Some(seed) = seed {
                agent = agent.with_seed(seed);
            }

            let doc = serve(agent, &interrupt)?;
            if let Some(out) = output {
                write_snapshot(&out, &doc)?;
            }
        }
    }

    Ok(())
}
