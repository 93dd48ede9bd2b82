//! Diagnose CLI
//!
//! Reads a diagnosis request (failed concept, answers, mastery) and prints a
//! learning prescription.
//!
//! ```text
//! diagnose --request request.json [--bank bank.json] [--catalog catalog.json]
//!          [--resources resources.json] [--config config.json] [--markdown]
//! ```
//!
//! Request format:
//!
//! ```json
//! {
//!   "failed_concept": "eigenvalues",
//!   "answers": [{ "question": "eig_1", "chosen": 0 }],
//!   "mastery": { "determinants": 0.45 }
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use diagnostic_engine::{
    AnswerEvidence, ConceptGraph, DiagnosticError, DiagnosticResult, EngineConfig, MasteryScores,
    MisconceptionCatalog, PrescriptionPlanner, StaticResourceCurator,
};

const LOG_ENV: &str = "DIAGNOSTIC_LOG";

#[derive(Default)]
struct Args {
    request: Option<PathBuf>,
    bank: Option<PathBuf>,
    catalog: Option<PathBuf>,
    resources: Option<PathBuf>,
    config: Option<PathBuf>,
    markdown: bool,
}

#[derive(Debug, Deserialize)]
struct Request {
    failed_concept: String,
    #[serde(default)]
    answers: Vec<RequestAnswer>,
    #[serde(default)]
    mastery: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct RequestAnswer {
    question: String,
    chosen: usize,
}

fn init_tracing() {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn print_help() {
    println!("diagnose - adaptive learning diagnosis");
    println!();
    println!("USAGE:");
    println!("    diagnose --request <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -r, --request <FILE>      Diagnosis request (JSON)");
    println!("    -b, --bank <FILE>         Question bank [default: built-in linear algebra]");
    println!("    -c, --catalog <FILE>      Misconception catalog [default: built-in]");
    println!("        --resources <FILE>    Resource list [default: built-in]");
    println!("        --config <FILE>       Engine configuration");
    println!("        --markdown            Print Markdown instead of JSON");
    println!("    -h, --help                Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    {LOG_ENV}    Log filter [default: info]");
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .map(PathBuf::from)
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--request" | "-r" => args.request = Some(value("--request")?),
            "--bank" | "-b" => args.bank = Some(value("--bank")?),
            "--catalog" | "-c" => args.catalog = Some(value("--catalog")?),
            "--resources" => args.resources = Some(value("--resources")?),
            "--config" => args.config = Some(value("--config")?),
            "--markdown" => args.markdown = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn run(args: &Args) -> DiagnosticResult<String> {
    let request_path = args
        .request
        .as_ref()
        .ok_or_else(|| DiagnosticError::internal("--request is required"))?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;
    let graph = match &args.bank {
        Some(path) => ConceptGraph::from_path(path)?,
        None => ConceptGraph::linear_algebra()?,
    };
    let catalog = match &args.catalog {
        Some(path) => MisconceptionCatalog::from_path(path)?,
        None => MisconceptionCatalog::builtin()?,
    };
    let curator = match &args.resources {
        Some(path) => StaticResourceCurator::from_path(path)?,
        None => StaticResourceCurator::builtin()?,
    };

    let raw = std::fs::read_to_string(request_path).map_err(|e| {
        DiagnosticError::internal(format!("cannot read {}: {e}", request_path.display()))
    })?;
    let request: Request = serde_json::from_str(&raw)
        .map_err(|e| DiagnosticError::internal(format!("invalid request: {e}")))?;

    let mut answers = Vec::with_capacity(request.answers.len());
    for answer in &request.answers {
        let question = graph.question(&answer.question)?;
        answers.push(AnswerEvidence {
            question: question.id.clone(),
            concept: question.concept.clone(),
            chosen: answer.chosen,
            correct: question.correct,
        });
    }
    let mut mastery = MasteryScores::new();
    for (concept, score) in request.mastery {
        let id = graph.concept(&concept)?.id.clone();
        mastery.insert(id, score);
    }

    info!(
        concept = %request.failed_concept,
        answers = answers.len(),
        "Generating prescription"
    );
    let prescription = PrescriptionPlanner::new(&graph, &catalog, &curator)
        .with_config(config.planner.clone())
        .with_checkpoint(
            config.assessment.checkpoint_pass,
            config.assessment.checkpoint_questions,
        )
        .generate(&request.failed_concept, &answers, &mastery)?;

    if args.markdown {
        Ok(prescription.render_markdown())
    } else {
        serde_json::to_string_pretty(&prescription)
            .map_err(|e| DiagnosticError::internal(format!("cannot encode prescription: {e}")))
    }
}

fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
