//! mcr CLI: a reasoning session persisted to a JSON snapshot between runs.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use mcr::agent::ReasonOptions;
use mcr::config::McrConfig;
use mcr::engine::Mcr;
use mcr::ontology::Ontology;
use mcr::session::{
    AssertResult, KnowledgeGraphFormat, QueryOptions, QueryResult, Session, SessionSnapshot,
};

#[derive(Parser)]
#[command(name = "mcr", version, about = "Neuro-symbolic reasoning over a Prolog knowledge base")]
struct Cli {
    /// Session snapshot file, created on first write.
    #[arg(long, global = true, default_value = "mcr-state.json")]
    state: PathBuf,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print this invocation's language-model usage to stderr when done.
    /// Counters are not persisted between runs.
    #[arg(long, global = true)]
    usage: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add knowledge. Natural language is translated; use --prolog for a clause.
    Assert {
        text: String,
        /// Treat the text as a Prolog clause and skip translation.
        #[arg(long)]
        prolog: bool,
    },

    /// Remove a clause (exact text).
    Retract { clause: String },

    /// Run a Prolog goal.
    Query {
        goal: String,
        /// Let the language model answer when no proof is found.
        #[arg(long)]
        fallback: bool,
    },

    /// Ask a natural-language question.
    Ask {
        question: String,
        #[arg(long)]
        fallback: bool,
    },

    /// Work through a task with the agentic reasoning loop.
    Reason {
        task: String,
        /// Step budget (defaults to the configured value).
        #[arg(long)]
        max_steps: Option<usize>,
        #[arg(long)]
        fallback: bool,
    },

    /// Print the knowledge base.
    Graph {
        /// "prolog" or "json".
        #[arg(long, default_value = "prolog")]
        format: KnowledgeGraphFormat,
    },

    /// Inspect or change the ontology.
    Ontology {
        #[command(subcommand)]
        action: OntologyAction,
    },

    /// Empty the knowledge base and restore the configured ontology.
    Clear,
}

#[derive(Subcommand)]
enum OntologyAction {
    /// Print the ontology as JSON.
    Show,
    /// Declare an entity type (unary predicate).
    AddType { name: String },
    /// Declare a relationship type (predicate of arity two or more).
    AddRelationship { name: String },
    /// Declare a named constraint.
    AddConstraint { name: String },
    /// Map an alias onto a canonical term.
    AddSynonym { alias: String, canonical: String },
    /// Replace the ontology from a JSON file and revalidate the program.
    Reload { file: PathBuf },
}

fn print_assert(result: &AssertResult) {
    match (&result.success, &result.clause, &result.error) {
        (true, Some(clause), _) => match &result.strategy {
            Some(strategy) => println!("asserted: {clause} (via {strategy})"),
            None => println!("ok: {clause}"),
        },
        (_, _, Some(error)) => eprintln!("rejected: {error}"),
        _ => eprintln!("rejected"),
    }
}

fn print_query(result: &QueryResult) {
    if let Some(error) = &result.error {
        eprintln!("error: {error}");
        return;
    }
    if !result.success {
        println!("false.");
        return;
    }
    if let Some(answer) = &result.answer {
        println!("{answer}  (sub-symbolic, confidence {:.2})", result.confidence);
        return;
    }
    if result.bindings.is_empty() {
        println!("true.");
    }
    for binding in &result.bindings {
        println!("{binding}");
    }
}

fn open_session(mcr: &Mcr, state: &Path) -> Result<Session> {
    let mut session = mcr.session();
    if state.exists() {
        let snapshot = SessionSnapshot::load_from(state)?;
        for clause in session.load_state(snapshot) {
            eprintln!("warning: skipped clause that no longer validates: {clause}");
        }
    }
    Ok(session)
}

fn save_session(session: &Session, state: &Path) -> Result<()> {
    Ok(session.save_state().save_to(state)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => McrConfig::load(path)?,
        None => McrConfig::default(),
    };
    let mcr = Mcr::new(config)?;
    let mut session = open_session(&mcr, &cli.state)?;

    match cli.command {
        Commands::Assert { text, prolog } => {
            let result = if prolog {
                session.assert_prolog(&text)
            } else {
                session.assert(&text).await
            };
            print_assert(&result);
            if result.success {
                save_session(&session, &cli.state)?;
            }
        }

        Commands::Retract { clause } => {
            let result = session.retract_prolog(&clause);
            print_assert(&result);
            if result.success {
                save_session(&session, &cli.state)?;
            }
        }

        Commands::Query { goal, fallback } => {
            let options = QueryOptions {
                allow_sub_symbolic_fallback: fallback,
            };
            print_query(&session.query(&goal, options).await);
        }

        Commands::Ask { question, fallback } => {
            let options = QueryOptions {
                allow_sub_symbolic_fallback: fallback,
            };
            let result = session.nquery(&question, options).await;
            if !result.query.is_empty() {
                println!("?- {}", result.query);
            }
            print_query(&result);
        }

        Commands::Reason {
            task,
            max_steps,
            fallback,
        } => {
            let defaults = session.reason_options();
            let options = ReasonOptions {
                max_steps: max_steps.unwrap_or(defaults.max_steps),
                allow_sub_symbolic_fallback: fallback,
            };
            let result = session.reason(&task, options).await;
            for (i, step) in result.steps.iter().enumerate() {
                println!("{:>3}. {step}", i + 1);
            }
            println!("answer: {}", result.answer);
            if let Some(explanation) = &result.explanation {
                println!("because: {explanation}");
            }
            println!("confidence: {:.2}", result.confidence);
            save_session(&session, &cli.state)?;
        }

        Commands::Graph { format } => {
            println!("{}", session.export(format));
        }

        Commands::Ontology { action } => {
            match action {
                OntologyAction::Show => {
                    let json = serde_json::to_string_pretty(session.ontology()).into_diagnostic()?;
                    println!("{json}");
                    return Ok(());
                }
                OntologyAction::AddType { name } => session.add_type(&name),
                OntologyAction::AddRelationship { name } => session.add_relationship_type(&name),
                OntologyAction::AddConstraint { name } => session.add_constraint(&name),
                OntologyAction::AddSynonym { alias, canonical } => {
                    session.add_synonym(&alias, &canonical)
                }
                OntologyAction::Reload { file } => {
                    let content = std::fs::read_to_string(&file).into_diagnostic()?;
                    let ontology: Ontology = serde_json::from_str(&content).into_diagnostic()?;
                    let dropped = session.reload_ontology(ontology);
                    println!(
                        "ontology reloaded: {} clause(s) kept, {} dropped",
                        session.program().len(),
                        dropped.len()
                    );
                    for clause in dropped {
                        println!("  dropped: {clause}");
                    }
                }
            }
            save_session(&session, &cli.state)?;
        }

        Commands::Clear => {
            session.clear();
            save_session(&session, &cli.state)?;
            println!("cleared session {}", session.id());
        }
    }

    if cli.usage {
        eprintln!("llm usage: {}", mcr.llm_metrics());
    }
    Ok(())
}
