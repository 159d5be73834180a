use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use tcg_lower::{samples, Diagnostic, LoweringConfig, TcgWidth};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "tcg-lower",
    version,
    about = "Lower instruction behavior to TCG micro-ops"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the instructions of the bundled sample ISA
    List {
        /// Register width of the sample ISA (32 or 64)
        #[arg(long, default_value_t = 64)]
        xlen: u32,
    },
    /// Lower instructions and print their micro-op listings
    Lower {
        /// Instructions to lower (default: all)
        names: Vec<String>,
        /// Register width of the sample ISA (32 or 64)
        #[arg(long, default_value_t = 64)]
        xlen: u32,
        /// Lowering configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Lower instructions in parallel
        #[arg(long)]
        parallel: bool,
        /// Print a BLAKE3 fingerprint per listing
        #[arg(long)]
        fingerprint: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::List { xlen } => cmd_list(xlen),
        Command::Lower {
            names,
            xlen,
            config,
            parallel,
            fingerprint,
        } => cmd_lower(names, xlen, config, parallel, fingerprint),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(diagnostic: &Diagnostic) -> ! {
    diagnostic.render(samples::FILENAME, samples::SOURCE);
    process::exit(1);
}

// --- tcg-lower list ---

fn cmd_list(xlen: u32) {
    let isa = samples::rv_isa(xlen).unwrap_or_else(|d| fail(&d));
    println!("{} ({} instructions)", isa.name, isa.instructions.len());
    for instruction in &isa.instructions {
        let span = instruction.span;
        let text = samples::SOURCE
            .get(span.start as usize..span.end as usize)
            .unwrap_or("");
        let behavior = text.split_once('=').map(|(_, b)| b.trim()).unwrap_or(text);
        println!("  {:<6} {}", instruction.name, behavior);
    }
}

// --- tcg-lower lower ---

fn cmd_lower(
    names: Vec<String>,
    xlen: u32,
    config_path: Option<PathBuf>,
    parallel: bool,
    fingerprint: bool,
) {
    let mut config = match &config_path {
        Some(path) => LoweringConfig::load(path).unwrap_or_else(|d| fail(&d)),
        None => LoweringConfig::default(),
    };
    if config_path.is_none() {
        let width = TcgWidth::from_bits(xlen).unwrap_or_else(|| {
            fail(&Diagnostic::config(format!(
                "xlen must be 32 or 64, got {}",
                xlen
            )))
        });
        config = config.with_word_width(width);
    }
    if parallel {
        config = config.with_parallel(true);
    }

    let mut isa = samples::rv_isa(config.word_width.bits()).unwrap_or_else(|d| fail(&d));
    isa.retain_named(&names);
    if isa.instructions.is_empty() {
        eprintln!("error: no instruction matches {}", names.join(", "));
        process::exit(1);
    }

    let report = tcg_lower::lower_isa(&mut isa, &config).unwrap_or_else(|d| fail(&d));

    for (instruction, row) in isa.instructions.iter().zip(&report.rows) {
        println!("{}:", instruction.name);
        for line in instruction.listing() {
            println!("    {}", line);
        }
        if fingerprint {
            println!("    ; blake3 {}", &row.fingerprint[..16]);
        }
        println!();
    }

    eprintln!("{}: {} instructions, {} ops", report.isa, report.rows.len(), report.total_ops());
    for row in &report.rows {
        eprintln!("  {}", row);
    }
}
