//! FileCheck-style golden tests for tree files.
//!
//! A `.tree` file carries the tree text plus `; RUN:` and `; CHECK` directives.
//! Each RUN line compiles the tree with the given options and the output is
//! matched against the CHECK directives, similar to LLVM's FileCheck tool but
//! implemented in a Rust-native way. A RUN line starting with `not` expects
//! compilation to fail and checks the error message instead.

use crate::codegen::{GeneratorConfig, HybridCompiler};
use crate::core::CompilationSession;
use crate::tree::Tree;
use bumpalo::Bump;
use log::trace;

/// A CHECK directive extracted from a tree file
#[derive(Debug, Clone)]
pub enum CheckDirective {
    /// CHECK: pattern - Match exact pattern
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

impl CheckDirective {
    /// Directive keyword as written in the file.
    pub fn name(&self) -> &'static str {
        match self {
            CheckDirective::Check(_) => "CHECK",
            CheckDirective::CheckLabel(_) => "CHECK-LABEL",
            CheckDirective::CheckNext(_) => "CHECK-NEXT",
            CheckDirective::CheckEmpty => "CHECK-EMPTY",
            CheckDirective::Comment(_) => "COM",
        }
    }
}

/// A RUN directive specifying how to compile the tree
#[derive(Debug, Clone)]
pub struct RunDirective {
    /// Compilation is expected to fail.
    pub expect_failure: bool,
    pub command: String,
    pub args: Vec<String>,
}

/// Test specification extracted from a tree file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub tree_content: String,
}

impl TestSpec {
    /// Parse a tree file to extract test specifications
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut tree_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let mut parts: Vec<&str> = run_cmd.split_whitespace().collect();
                let expect_failure = parts.first() == Some(&"not");
                if expect_failure {
                    parts.remove(0);
                }
                if parts.is_empty() {
                    return Err(format!("RUN directive without a command: '{}'", trimmed));
                }
                run_directives.push(RunDirective {
                    expect_failure,
                    command: parts[0].to_string(),
                    args: parts[1..].iter().map(|s| s.to_string()).collect(),
                });
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                // Regular tree content
                tree_lines.push(line);
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            tree_content: tree_lines.join("\n"),
        })
    }
}

/// What a RUN line prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    Both,
    Declaration,
    Definition,
    Table,
    Stats,
}

/// Options of one RUN line.
#[derive(Debug, Clone)]
struct RunOptions {
    arch: String,
    budget: Option<u32>,
    kernel_size: Option<usize>,
    tree_id: u32,
    emit: Emit,
}

impl RunOptions {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = RunOptions {
            arch: "arm".to_string(),
            budget: None,
            kernel_size: None,
            tree_id: 0,
            emit: Emit::Both,
        };

        for arg in args {
            if let Some(value) = arg.strip_prefix("--arch=") {
                options.arch = value.to_string();
            } else if let Some(value) = arg.strip_prefix("--budget=") {
                options.budget = Some(value.parse().map_err(|_| format!("bad budget '{}'", value))?);
            } else if let Some(value) = arg.strip_prefix("--kernel-size=") {
                options.kernel_size =
                    Some(value.parse().map_err(|_| format!("bad kernel size '{}'", value))?);
            } else if let Some(value) = arg.strip_prefix("--tree-id=") {
                options.tree_id = value.parse().map_err(|_| format!("bad tree id '{}'", value))?;
            } else if let Some(value) = arg.strip_prefix("--emit=") {
                options.emit = match value {
                    "declaration" => Emit::Declaration,
                    "definition" => Emit::Definition,
                    "table" => Emit::Table,
                    "stats" => Emit::Stats,
                    other => return Err(format!("unknown --emit value '{}'", other)),
                };
            } else if arg != "%s" {
                return Err(format!("unknown RUN argument '{}'", arg));
            }
        }

        Ok(options)
    }
}

/// Test runner that executes tree file tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a tree file test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("no RUN directive".to_string());
        }

        for run_dir in &spec.run_directives {
            let output = match (self.execute_command(&spec.tree_content, run_dir), run_dir.expect_failure) {
                (Ok(output), false) => output,
                (Err(message), true) => message,
                (Ok(_), true) => return Err("expected compilation to fail but it succeeded".to_string()),
                (Err(message), false) => return Err(format!("compilation failed: {}", message)),
            };
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Compile the tree as a RUN line asks and return the output
    fn execute_command(&self, tree_content: &str, run_dir: &RunDirective) -> Result<String, String> {
        if run_dir.command != "%treegen" {
            return Err(format!("unknown RUN command '{}'", run_dir.command));
        }
        let options = RunOptions::parse(&run_dir.args)?;

        let mut config = GeneratorConfig::for_target(&options.arch).map_err(|e| e.to_string())?;
        if let Some(budget) = options.budget {
            config = config.with_budget(budget);
        }
        if let Some(kernel_size) = options.kernel_size {
            config = config.with_kernel_size(kernel_size).map_err(|e| e.to_string())?;
        }

        let tree = Tree::parse(tree_content).map_err(|e| e.to_string())?;

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let compiler = HybridCompiler::new(config);
        let program = compiler
            .lower(&session, &tree, options.tree_id)
            .map_err(|e| e.to_string())?;

        let output = match options.emit {
            Emit::Both => {
                let code = program.assemble();
                format!("{}\n{}", code.declaration, code.definition)
            }
            Emit::Declaration => program.assemble().declaration,
            Emit::Definition => program.assemble().definition,
            Emit::Table => program.table().to_string(),
            Emit::Stats => session.stats().to_string(),
        };

        if self.verbose {
            println!("{}", output);
        }

        Ok(output)
    }

    /// Validate output against CHECK directives.
    ///
    /// A cursor moves down the output: CHECK and CHECK-LABEL search forward
    /// from it, CHECK-NEXT and CHECK-EMPTY look only at the line under it.
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let lines: Vec<&str> = output.lines().collect();
        let mut cursor = 0;

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => {}
                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let idx = lines[cursor.min(lines.len())..]
                        .iter()
                        .position(|line| line.contains(pattern.as_str()))
                        .ok_or_else(|| format!("{}: '{}' not found after line {}", directive.name(), pattern, cursor))?;
                    cursor += idx + 1;
                }
                CheckDirective::CheckNext(pattern) => {
                    match lines.get(cursor) {
                        Some(line) if line.contains(pattern.as_str()) => {}
                        Some(line) => return Err(format!("CHECK-NEXT: expected '{}' but got '{}'", pattern, line)),
                        None => return Err(format!("CHECK-NEXT: output ended before '{}'", pattern)),
                    }
                    cursor += 1;
                }
                // End of output counts as an empty line.
                CheckDirective::CheckEmpty => {
                    if let Some(line) = lines.get(cursor) {
                        if !line.trim().is_empty() {
                            return Err(format!("CHECK-EMPTY: expected empty line but got '{}'", line));
                        }
                    }
                    cursor += 1;
                }
            }
            trace!("{} matched, cursor at line {}", directive.name(), cursor);
        }

        Ok(())
    }
}
