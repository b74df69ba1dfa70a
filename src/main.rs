//! modelight - highlight source code as HTML from the command line

use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use modelight::error::{HighlightError, Result};
use modelight::{GrammarDef, HighlightConfig, HighlightOptions, HighlightResult, Highlighter};

/// Environment variable holding the log filter
const LOG_ENV: &str = "MODELIGHT_LOG";

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// What to print for the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Output {
    #[default]
    Html,
    Tree,
    Detect,
}

#[derive(Debug, Default)]
struct Options {
    language: Option<String>,
    grammars: Vec<PathBuf>,
    strict: bool,
    output: Output,
    list: bool,
    file: Option<PathBuf>,
}

enum Command {
    Run(Options),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut options = Options::default();
    let mut args = args.iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            "--lang" | "-l" => options.language = Some(value(arg, args.next())?),
            "--grammar" | "-g" => options.grammars.push(PathBuf::from(value(arg, args.next())?)),
            "--strict" => options.strict = true,
            "--tree" => options.output = Output::Tree,
            "--detect" => options.output = Output::Detect,
            "--list" => options.list = true,
            "-" => options.file = None,
            flag if flag.starts_with('-') => {
                return Err(HighlightError::Usage(format!("unknown option `{}`", flag)));
            }
            path => {
                if options.file.is_some() {
                    return Err(HighlightError::Usage("only one input file is allowed".to_string()));
                }
                options.file = Some(PathBuf::from(path));
            }
        }
    }

    Ok(Command::Run(options))
}

fn value(flag: &str, next: Option<&String>) -> Result<String> {
    next.cloned()
        .ok_or_else(|| HighlightError::Usage(format!("`{}` expects a value", flag)))
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args)? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Version => {
            print_version();
            return Ok(());
        }
        Command::Run(options) => options,
    };

    let mut config = HighlightConfig::load();
    if options.strict {
        config.safe_mode = false;
        config.ignore_illegals = false;
    }
    let ignore_illegals = config.ignore_illegals;
    let mut highlighter = Highlighter::with_config(config);

    for path in &options.grammars {
        register_grammar(&mut highlighter, path)?;
    }

    if options.list {
        for name in highlighter.list_languages() {
            if highlighter.auto_detection(name) {
                println!("{}", name);
            } else {
                println!("{} (no auto-detection)", name);
            }
        }
        return Ok(());
    }

    let code = read_input(options.file.as_deref())?;
    let result = match &options.language {
        Some(language) => highlighter.highlight(
            &code,
            &HighlightOptions::new(language).ignore_illegals(ignore_illegals),
        )?,
        None => highlighter.highlight_auto(&code, None)?,
    };

    match options.output {
        Output::Html => println!("{}", result.value),
        Output::Tree => println!("{}", result.tree.to_json()?),
        Output::Detect => print_detection(&result),
    }
    Ok(())
}

/// Register a grammar file under its file stem
fn register_grammar(highlighter: &mut Highlighter, path: &Path) -> Result<()> {
    let def = GrammarDef::load(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .or_else(|| def.name.clone())
        .ok_or_else(|| HighlightError::Usage(format!("cannot name grammar {}", path.display())))?;
    debug!(path = %path.display(), language = %name, "loading grammar file");
    highlighter.register_language(&name, &def)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => {
            let mut code = String::new();
            io::stdin().read_to_string(&mut code)?;
            Ok(code)
        }
    }
}

fn print_detection(result: &HighlightResult) {
    println!("language: {}", result.language.as_deref().unwrap_or("none"));
    println!("relevance: {}", result.relevance);
    if let Some(second) = &result.second_best {
        println!(
            "second best: {} ({})",
            second.language.as_deref().unwrap_or("none"),
            second.relevance
        );
    }
    if let Some(report) = &result.illegal_by {
        println!("illegal: {} at offset {} in {}", report.message, report.index, report.mode);
    }
}

fn print_usage() {
    println!("modelight {} - grammar-driven syntax highlighter", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: modelight [OPTIONS] [FILE]");
    println!();
    println!("Reads FILE (or standard input) and prints it as HTML.");
    println!();
    println!("Options:");
    println!("  -l, --lang NAME       Highlight as NAME instead of auto-detecting");
    println!("  -g, --grammar PATH    Register a TOML or JSON grammar (repeatable)");
    println!("      --strict          Fail on grammar errors and illegal input");
    println!("      --tree            Print the token tree as JSON");
    println!("      --detect          Print the detected language and relevance");
    println!("      --list            List registered languages");
    println!("  -h, --help            Show this help message");
    println!("  -V, --version         Show version information");
    println!();
    println!("Settings are read from ~/.modelight.toml; set {} to adjust logging.", LOG_ENV);
}

fn print_version() {
    println!("modelight {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let Command::Run(options) =
            parse_args(&args(&["-l", "rust", "-g", "a.toml", "--grammar", "b.json", "--tree", "in.rs"]))
                .unwrap()
        else {
            panic!("expected run");
        };
        assert_eq!(options.language.as_deref(), Some("rust"));
        assert_eq!(options.grammars.len(), 2);
        assert_eq!(options.output, Output::Tree);
        assert_eq!(options.file, Some(PathBuf::from("in.rs")));
        assert!(!options.strict);
    }

    #[test]
    fn test_help_and_version() {
        assert!(matches!(parse_args(&args(&["--list", "-h"])), Ok(Command::Help)));
        assert!(matches!(parse_args(&args(&["-V"])), Ok(Command::Version)));
    }

    #[test]
    fn test_bad_arguments() {
        assert!(matches!(parse_args(&args(&["--lang"])), Err(HighlightError::Usage(_))));
        assert!(matches!(parse_args(&args(&["--colour"])), Err(HighlightError::Usage(_))));
        assert!(matches!(parse_args(&args(&["a", "b"])), Err(HighlightError::Usage(_))));
    }
}
