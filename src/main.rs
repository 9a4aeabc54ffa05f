//! Tanyadata command-line entry point.
//!
//! With a question argument, answers it once and exits. Without one, reads
//! questions from stdin until `keluar`, `exit` or `quit`.

use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tanyadata_lib::config::{self, AppConfig};
use tanyadata_lib::pipeline::processor::Pipeline;
use tanyadata_lib::pipeline::router::AnswerResult;

/// Ask questions about the research warehouse in natural language
#[derive(Parser, Debug)]
#[command(name = "tanyadata")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Question to answer; starts an interactive session when omitted
    question: Option<String>,

    /// Print the full result as JSON instead of display text
    #[arg(long)]
    json: bool,
}

const EXIT_WORDS: [&str; 3] = ["keluar", "exit", "quit"];

fn print_answer(answer: &AnswerResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(answer) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Failed to serialize answer: {e}"),
        }
    } else {
        println!("{}", answer.user_text());
    }
}

fn interactive(pipeline: &Pipeline, json: bool) -> io::Result<()> {
    println!("{} v{}. Ketik 'keluar' untuk berhenti.", config::APP_NAME, config::APP_VERSION);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nPertanyaan: ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let question = line?;
        let question = question.trim();
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            return Ok(());
        }
        if question.is_empty() {
            continue;
        }
        print_answer(&pipeline.answer_question(question), json);
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let pipeline = match AppConfig::from_env()
        .map_err(|e| e.to_string())
        .and_then(|cfg| Pipeline::from_config(&cfg).map_err(|e| e.to_string()))
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match cli.question {
        Some(question) => {
            let answer = pipeline.answer_question(&question);
            print_answer(&answer, cli.json);
            if answer.is_aborted() {
                std::process::exit(2);
            }
        }
        None => {
            if let Err(e) = interactive(&pipeline, cli.json) {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
}
