use clap::{Parser, ValueEnum};
use minisvelte_compiler::{analyze, build, compile, CompileError, CompileOptions, RewritePolicy};
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minisvelte", about = "Compile a single-file reactive component")]
struct Cli {
    /// Component source file.
    input: PathBuf,

    /// Print the structured AST as JSON instead of compiling.
    #[arg(long, conflicts_with = "semantic")]
    ast: bool,

    /// Print the semantic facts as JSON instead of compiling.
    #[arg(long)]
    semantic: bool,

    /// Where to write the generated program.
    #[arg(short, long, default_value = "a.js")]
    output: PathBuf,

    /// Print the generated program instead of writing it.
    #[arg(long)]
    stdout: bool,

    /// Name of the emitted component function.
    #[arg(long)]
    name: Option<String>,

    /// Which mutations notify `refresh`.
    #[arg(long, value_enum, default_value_t = PolicyArg::Reactive)]
    policy: PolicyArg,

    /// Log compiler phases to stderr. `RUST_LOG` overrides the level.
    #[arg(long)]
    trace: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Reactive,
    Referred,
}

impl From<PolicyArg> for RewritePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Reactive => RewritePolicy::Reactive,
            PolicyArg::Referred => RewritePolicy::Referred,
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn report(file: &str, err: &CompileError) -> ! {
    fail(format!("{}: [{}] {}", file, err.code(), err))
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| fail(format!("serialization failed: {}", e)))
}

fn main() {
    let cli = Cli::parse();

    if cli.trace {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let file = cli.input.display().to_string();
    let source = fs::read_to_string(&cli.input)
        .unwrap_or_else(|e| fail(format!("failed to read {}: {}", file, e)));

    if cli.ast || cli.semantic {
        let component = build(&source, &file).unwrap_or_else(|e| report(&file, &e));
        let json = if cli.ast {
            to_json(&component)
        } else {
            to_json(&analyze(&component))
        };
        println!("{}", json);
        return;
    }

    let mut options = CompileOptions::new(file.clone()).with_rewrite_policy(cli.policy.into());
    if let Some(name) = cli.name {
        options = options.with_component_name(name);
    }

    let result = compile(&source, &options).unwrap_or_else(|e| report(&file, &e));
    if cli.stdout {
        print!("{}", result.code);
    } else if let Err(e) = fs::write(&cli.output, &result.code) {
        fail(format!("failed to write {}: {}", cli.output.display(), e));
    }
}
