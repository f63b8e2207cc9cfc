//! wppl CLI - compile ESTree programs to CPS and run them

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wppl::codegen::free_identifiers;
use wppl::errors::{format_compile_error, format_eval_error, ErrorConfig};
use wppl::prelude;
use wppl::{compile, CompileOptions, Interpreter, Node, RuntimeConfig, Value};

#[derive(Parser)]
#[command(name = "wppl")]
#[command(about = "Continuation-passing compiler and inference runtime for probabilistic programs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an ESTree JSON program into continuation-passing style
    Compile {
        /// ESTree JSON produced by an external parser
        input: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave out the flip/condition header program
        #[arg(long)]
        no_header: bool,

        /// Emit JSON on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Compile and evaluate a program
    Run {
        input: PathBuf,

        /// Seed for the random source
        #[arg(long)]
        seed: Option<u64>,

        /// Abort after this many function applications
        #[arg(long)]
        step_budget: Option<u64>,

        /// Default particle count for ParticleFilter
        #[arg(long)]
        particles: Option<usize>,

        /// Print the transformed program before running it
        #[arg(long)]
        show_cps: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            no_header,
            compact,
        } => cmd_compile(&input, output.as_deref(), no_header, compact),
        Commands::Run {
            input,
            seed,
            step_budget,
            particles,
            show_cps,
        } => {
            let mut config = RuntimeConfig::new();
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            if let Some(budget) = step_budget {
                config = config.with_step_budget(budget);
            }
            if let Some(particles) = particles {
                config = config.with_default_particles(particles);
            }
            cmd_run(&input, config, show_cps)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn error_config(path: &Path) -> ErrorConfig {
    ErrorConfig::new(std::io::stderr().is_terminal()).with_filename(path.display().to_string())
}

fn load(path: &Path) -> Result<Node, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
    Node::from_json(&source).map_err(|e| format!("Error parsing {}: {}", path.display(), e))
}

fn cmd_compile(input: &Path, output: Option<&Path>, no_header: bool, compact: bool) -> Result<(), String> {
    let program = load(input)?;
    let mut options = CompileOptions::new();
    if no_header {
        options = options.without_header();
    }
    let cps = compile(&program, &options).map_err(|e| format_compile_error(&e, &error_config(input)))?;
    let json = cps.to_json(!compact).map_err(|e| format!("Error serializing output: {}", e))?;

    match output {
        Some(path) => {
            fs::write(path, json).map_err(|e| format!("Error writing {}: {}", path.display(), e))?;
            info!(output = %path.display(), "wrote CPS program");
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_run(input: &Path, config: RuntimeConfig, show_cps: bool) -> Result<(), String> {
    let program = load(input)?;
    let cps = compile(&program, &CompileOptions::new())
        .map_err(|e| format_compile_error(&e, &error_config(input)))?;
    if show_cps {
        let json = cps.to_json(true).map_err(|e| format!("Error serializing CPS: {}", e))?;
        println!("=== CPS ===\n{}\n", json);
    }

    let mut interpreter = Interpreter::with_config(config);
    match interpreter.run(&cps) {
        Ok(value) => {
            debug!(steps = interpreter.steps(), "run finished");
            print_value(&value);
            Ok(())
        }
        Err(e) => {
            let mut names = interpreter.global_names();
            names.extend(prelude::header_names().unwrap_or_default());
            names.extend(free_identifiers(&program));
            let candidates = names.iter().map(String::as_str);
            Err(format_eval_error(&e, candidates, &error_config(input)))
        }
    }
}

fn print_value(value: &Value) {
    let Value::Erp(erp) = value else {
        println!("{}", value);
        return;
    };
    match erp.support(&[]) {
        Ok(Some(values)) => {
            println!("{}:", erp.name());
            for v in values {
                let p = erp.score(&[], &v).map(f64::exp).unwrap_or(f64::NAN);
                println!("  {:<24} {:.6}", v.to_string(), p);
            }
        }
        _ => println!("{}", value),
    }
}
