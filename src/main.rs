//! cellsolve CLI
//!
//! Usage:
//!   cellsolve [OPTIONS] [FILE]
//!
//! Options:
//!   -c, --config <FILE>     Engine configuration (TOML format)
//!   -b, --backend <NAME>    Solver backend: cassowary or difference
//!   -o, --gds <FILE>        Export the built library as GDSII
//!   -i, --import <FILE>     Import a GDSII file and print its cells
//!   -v, --verbose           Debug logging on stderr
//!   -g, --grammar           Show language grammar reference
//!   -h, --help              Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cellsolve::{
    build_with_config, describe, describe_library, gds, BackendKind, EngineConfig,
};

#[derive(Parser)]
#[command(name = "cellsolve")]
#[command(about = "Hierarchical cell layout from rectangle constraints")]
struct Cli {
    /// Input script (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Engine configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Solver backend, overriding the configuration file
    #[arg(short, long, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Write the built library to this GDSII file
    #[arg(short = 'o', long)]
    gds: Option<PathBuf>,

    /// Import a GDSII file and print a summary instead of running a script
    #[arg(short, long)]
    import: Option<PathBuf>,

    /// Log solver progress at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Show language grammar reference
    #[arg(short, long)]
    grammar: bool,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    BackendKind::from_str(s)
        .ok_or_else(|| format!("unknown backend '{}'; expected cassowary or difference", s))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cellsolve=debug" } else { "cellsolve=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn fail(message: String) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.grammar {
        print_grammar();
        return;
    }

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).unwrap_or_else(|e| {
            fail(format!("loading config '{}': {}", path.display(), e))
        }),
        None => EngineConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.solve = config.solve.with_backend(backend);
    }

    if let Some(path) = &cli.import {
        let layers = config.layer_map(std::iter::empty());
        match gds::read(path, &layers) {
            Ok(library) => print!("{}", describe_library(&library)),
            Err(e) => fail(format!("importing '{}': {}", path.display(), e)),
        }
        return;
    }

    // If no input file and stdin is a terminal (interactive), show intro help
    if cli.input.is_none() && io::stdin().is_terminal() {
        print_intro();
        return;
    }

    // Read input
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("reading file '{}': {}", path.display(), e))),
        None => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                fail(format!("reading from stdin: {}", e));
            }
            buffer
        }
    };

    let built = match build_with_config(&source, &config) {
        Ok(built) => built,
        Err(cellsolve::BuildError::Parse(errors)) => {
            let name = cli
                .input
                .as_ref()
                .map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
            for e in &errors {
                eprint!("{}", e.format(&source, &name));
            }
            std::process::exit(1);
        }
        Err(e) => fail(e.to_string()),
    };
    print!("{}", describe(&built));

    if let Some(path) = &cli.gds {
        let used = gds::used_layers(&built.library);
        let layers = config.layer_map(used.iter().map(String::as_str));
        if let Err(e) = gds::write(&built.library, &layers, path) {
            fail(format!("writing '{}': {}", path.display(), e));
        }
    }
}

fn print_intro() {
    println!(
        r#"cellsolve - hierarchical cell layout from rectangle constraints

USAGE:
    cellsolve [OPTIONS] [FILE]
    echo '<script>' | cellsolve

OPTIONS:
    -c, --config     Engine configuration (TOML file)
    -b, --backend    cassowary (default) or difference
    -o, --gds        Export the result as GDSII
    -i, --import     Summarize a GDSII file
    -v, --verbose    Debug logging on stderr
    -g, --grammar    Show language grammar reference
    -h, --help       Print help

QUICK START:
    echo 'cell c {{ rect a on m1 [x1: 0, y1: 0, x2: 4, y2: 2] }} solve c' | cellsolve

Run --grammar for the syntax reference."#
    );
}

fn print_grammar() {
    println!(
        r#"CELLSOLVE GRAMMAR
=================

STATEMENTS
----------
cell NAME {{ ITEMS }}      Declare a cell (a second declaration reopens it)
solve NAME               Solve every free slot reachable from NAME
freeze NAME              Lock NAME as a fixed-size template (its templates must be frozen)
unfreeze NAME            Make NAME editable again (its parents must not be frozen)
copy NAME as NEW         Duplicate a cell

CELL ITEMS
----------
rect A on LAYER [x1: 0, y1: 0]    Rectangle on a layer, optional fixed coordinates
inst U of TEMPLATE [at X, Y]      Place a cell; 'at' fixes the lower-left corner
constrain CONSTRAINT              Attach a constraint

ELEMENT PATHS
-------------
self        The cell's own boundary
a           A rectangle or instance of this cell
u1.a        Rectangle 'a' inside instance 'u1' (template must not be frozen)

PROPERTIES
----------
x1, y1, x2, y2    Edges (lower-left, upper-right)
width, height     x2 - x1, y2 - y1
cx, cy            Centers

CONSTRAINTS
-----------
a.x2 + 5 = b.x1                Linear (=, <=, >=) with * by constants
2 * a.cx <= self.x2 - 1
b right_of a [gap: 3]          Also left_of, above, below
a inside self [margin: 1]      Containment with margin
a same_size b                  Equal width and height
c = a - b [side: right]        c is what remains of a when b is cut from one side

COMMENTS
--------
// to end of line"#
    );
}
