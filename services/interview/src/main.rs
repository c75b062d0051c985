use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use interview_core::evaluator_client::{EvaluatorClient, EvaluatorConfig};
use interview_core::question::{DifficultyFilter, SessionPlan};
use interview_core::session::{SessionRunner, SessionSettings};
use interview_core::speech::SpeechOutput;
use interview_service::command_tts::CommandSpeechOutput;
use interview_service::config::Config;
use interview_service::console::{self, ConsoleSpeechInput, ConsoleSpeechOutput, DEFAULT_WORDS_PER_MINUTE};
use interview_service::question_loader;
use interview_service::report::{self, ProgressNarrator};
use interview_service::summary_store::JsonFileSummaryStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice-driven mock technical interview")]
struct Cli {
    /// The role to interview for, e.g. "DevOps Engineer"
    role: String,

    /// Easy, Medium, Hard or All
    #[arg(long, default_value = "Medium")]
    difficulty: DifficultyFilter,

    /// Maximum number of questions in the session
    #[arg(long, default_value_t = SessionPlan::MAX_QUESTIONS)]
    count: usize,

    /// Seed for a reproducible question order
    #[arg(long)]
    seed: Option<u64>,

    /// Pause after each scored answer before the next question
    #[arg(long, default_value_t = 2000)]
    advance_delay_ms: u64,

    /// Reading speed used to pace printed questions
    #[arg(long, default_value_t = DEFAULT_WORDS_PER_MINUTE)]
    words_per_minute: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr so they do not interleave with the interview itself.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Build the Session Plan ---
    let bank = question_loader::load_question_bank(&config.questions_dir)
        .context("Failed to load the question bank")?;
    let pool = bank.questions_for(&args.role, args.difficulty).with_context(|| {
        format!(
            "No questions for '{}'. Known roles: {}",
            args.role,
            bank.roles().collect::<Vec<_>>().join(", ")
        )
    })?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let plan = SessionPlan::select(pool, args.count, &mut rng);
    tracing::info!("Selected {} questions for {}.", plan.len(), args.role);

    // --- 5. Initialize Collaborators ---
    let evaluator = Arc::new(EvaluatorClient::new(
        EvaluatorConfig::builder()
            .with_endpoint(&config.evaluator_url)
            .with_api_key(config.evaluator_api_key.clone())
            .with_model(&config.evaluator_model)
            .with_timeout(config.evaluator_timeout)
            .build(),
    ));
    let output: Arc<dyn SpeechOutput> = match &config.tts_command {
        Some(command) => Arc::new(
            CommandSpeechOutput::parse(command).context("TTS_COMMAND does not name a program")?,
        ),
        None => Arc::new(ConsoleSpeechOutput::new(args.words_per_minute)),
    };
    let input = Arc::new(ConsoleSpeechInput::new());
    let store = Arc::new(JsonFileSummaryStore::new(config.sessions_file.clone()));

    let settings = SessionSettings::new(args.role.clone())
        .with_difficulty(args.difficulty)
        .with_advance_delay(Duration::from_millis(args.advance_delay_ms));

    // --- 6. Start the Session ---
    let handle = SessionRunner::new(plan, settings, output, input.clone(), evaluator, store)
        .start()
        .context("Failed to start the interview")?;
    let controller = handle.controller();

    println!("Commands: :replay  :stop (submit now)  :end (finish early)");

    // Stdin is read on a plain thread; a blocked read would otherwise stall runtime shutdown.
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if lines_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read from stdin: {:?}", e);
                    break;
                }
            }
        }
    });
    let router = tokio::spawn(console::route_console(lines_rx, controller.clone(), input));

    let mut snapshots = controller.subscribe();
    let printer = tokio::spawn(async move {
        let mut narrator = ProgressNarrator::default();
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            for line in narrator.observe(&snapshot) {
                println!("{line}");
            }
        }
    });

    let finished = handle.wait();
    tokio::pin!(finished);
    let summary = tokio::select! {
        summary = &mut finished => summary?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, ending the interview...");
            if let Err(e) = controller.end_interview().await {
                tracing::warn!("Failed to end the interview: {}", e);
            }
            finished.await?
        }
    };

    router.abort();
    printer.abort();
    println!("\n{}", report::render_summary(&summary));
    tracing::info!("Shutting down...");
    Ok(())
}
