//! treegen: compile a decision tree into hybrid inline/table C code.

use bumpalo::Bump;
use clap::Parser;
use log::info;
use mixtree::codegen::{GeneratorConfig, HybridCompiler, DEFAULT_BUDGET};
use mixtree::core::CompilationSession;
use mixtree::tree::Tree;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Compile a decision tree into C for arm or intel cores.
///
/// Hot paths are emitted as inline branches until the instruction-size
/// budget runs out; the whole tree is also packed into a table that the
/// generated function falls back to.
#[derive(Parser, Debug)]
#[command(name = "treegen")]
#[command(version = "0.1.0")]
#[command(about = "Hybrid inline/table decision tree code generator")]
struct Cli {
    /// Tree file to compile, or '-' for stdin
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Target architecture: arm or intel
    #[arg(long, value_name = "ARCH", default_value = "arm")]
    arch: String,

    /// Instruction-size budget for inline code
    #[arg(long, value_name = "UNITS", default_value_t = DEFAULT_BUDGET)]
    budget: u32,

    /// Override the architecture's packing kernel size
    #[arg(long, value_name = "N")]
    kernel_size: Option<usize>,

    /// Tree id used in generated symbol names
    #[arg(long, value_name = "ID", default_value_t = 0)]
    tree_id: u32,

    /// Write the declaration here instead of stdout
    #[arg(long, value_name = "FILE")]
    header: Option<PathBuf>,

    /// Write the definition here instead of stdout
    #[arg(long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Print session statistics to stderr
    #[arg(long)]
    stats: bool,
}

fn read_input(path: &Path) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Reject the configuration before reading any input.
    let mut config = GeneratorConfig::for_target(&cli.arch)?.with_budget(cli.budget);
    if let Some(kernel_size) = cli.kernel_size {
        config = config.with_kernel_size(kernel_size)?;
    }

    let tree = Tree::parse(&read_input(&cli.input)?)?;
    info!(
        "Loaded tree {} ({} nodes, depth {})",
        tree.namespace(),
        tree.node_count(),
        tree.depth()
    );

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiler = HybridCompiler::new(config);
    let code = compiler.compile_in(&session, &tree, cli.tree_id)?;

    match &cli.header {
        Some(path) => fs::write(path, &code.declaration)?,
        None => print!("{}", code.declaration),
    }
    match &cli.source {
        Some(path) => fs::write(path, &code.definition)?,
        None => {
            if cli.header.is_none() {
                println!();
            }
            print!("{}", code.definition);
        }
    }

    if cli.stats {
        eprint!("{}", session.stats());
    }

    Ok(())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
