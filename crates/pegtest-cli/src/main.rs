use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use linemap::LineMap;
use pegtest::{AstId, Grammar, InterpretOptions, LocatedError, SyntaxTree};
use serde::Serialize;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    }
}

struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        use std::io::Write as _;
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| std::fmt::Error)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorReporting {
    On,
    Off,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Options {
    grammar: PathBuf,
    input: Option<PathBuf>,
    print: bool,
    ast: bool,
    memo: bool,
    trail: bool,
    json: bool,
    loop_limit: Option<u32>,
    errors: ErrorReporting,
}

impl Options {
    fn parse<'a>(args: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Options> {
        let mut print = false;
        let mut ast = false;
        let mut memo = false;
        let mut trail = false;
        let mut json = false;
        let mut loop_limit = None;
        let mut errors = ErrorReporting::On;

        let mut files = Vec::new();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            match arg {
                "--print" => print = true,
                "--ast" => ast = true,
                "--memo" => memo = true,
                "--trail" => trail = true,
                "--json" => json = true,
                "--loop-limit" => {
                    let next = iter.next().context("Expected argument to --loop-limit")?;
                    let limit = next
                        .parse::<u32>()
                        .with_context(|| format!("Expected number, got `{next}`"))?;
                    loop_limit = Some(limit);
                }
                "--errors" => match iter.next() {
                    Some("on") => errors = ErrorReporting::On,
                    Some("off") => errors = ErrorReporting::Off,
                    Some(other) => bail!("Unexpected argument to --errors `{other}`"),
                    None => bail!("Expected argument to --errors"),
                },
                _ if arg.starts_with("--") => bail!("Unknown flag `{arg}`"),
                _ => files.push(arg),
            }
        }

        let mut files = files.into_iter();
        let Some(grammar) = files.next() else {
            bail!("No grammar file provided\nusage: pegtest <grammar-file> [input-file] [--print] [--ast] [--memo] [--trail] [--json] [--loop-limit N] [--errors on|off]");
        };
        let input = files.next();
        if files.next().is_some() {
            bail!("At most a grammar and an input file may be provided");
        }

        Ok(Options {
            grammar: grammar.into(),
            input: input.map(PathBuf::from),
            print,
            ast,
            memo,
            trail,
            json,
            loop_limit,
            errors,
        })
    }

    fn interpret_options(&self) -> InterpretOptions {
        match self.loop_limit {
            Some(loop_limit) => InterpretOptions { loop_limit },
            None => InterpretOptions::default(),
        }
    }
}

/// Prints diagnostics for one source file as `file:line:col message` followed by the offending
/// line.
pub struct Reporter<'a> {
    file: &'a Path,
    src: &'a str,
    linemap: LineMap,
    errors: ErrorReporting,
}

impl<'a> Reporter<'a> {
    pub fn new(file: &'a Path, src: &'a str, errors: ErrorReporting) -> Reporter<'a> {
        Reporter {
            file,
            src,
            linemap: LineMap::new(src),
            errors,
        }
    }

    pub fn format(&self, e: &LocatedError) -> String {
        let pos = self.linemap.offset_to_codepoint(self.src, e.span.start());
        let excerpt = self
            .linemap
            .excerpt(self.src, e.span.start(), e.span.end());
        format!("{}:{pos} {}\n{excerpt}", self.file.display(), e.message)
    }

    pub fn report(&self, errors: &[LocatedError]) {
        if self.errors == ErrorReporting::Off {
            return;
        }
        for e in errors {
            eprintln!("{}", self.format(e));
        }
    }
}

#[derive(Serialize, Debug)]
struct JsonNode<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    start: u32,
    end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<JsonNode<'a>>,
}

impl<'a> JsonNode<'a> {
    fn new(tree: &'a SyntaxTree, id: AstId, input: &'a str) -> JsonNode<'a> {
        let node = &tree[id];
        JsonNode {
            name: node.name.as_deref(),
            start: node.span.start(),
            end: node.span.end(),
            text: node.is_terminal().then(|| node.text(input)),
            children: node
                .children()
                .iter()
                .map(|&child| JsonNode::new(tree, child, input))
                .collect(),
        }
    }
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read `{}`", path.display()))
}

fn init_logger() -> anyhow::Result<()> {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| log::LevelFilter::from_str(&level).ok())
        .unwrap_or(log::LevelFilter::Warn);

    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )
    .context("Failed to install logger")
}

/// Returns whether the grammar, and the input if one was given, were accepted.
fn run() -> anyhow::Result<bool> {
    init_logger()?;

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let options = Options::parse(args.iter().map(String::as_str))?;

    let grammar_src = read_file(&options.grammar)?;
    let grammar = match pegtest::parse_grammar(&grammar_src) {
        Ok(grammar) => grammar,
        Err(errors) => {
            Reporter::new(&options.grammar, &grammar_src, options.errors).report(&errors);
            return Ok(false);
        }
    };
    log::info!(
        "Loaded {} rules from `{}`",
        grammar.rule_names().count(),
        options.grammar.display()
    );

    if options.print {
        print!("{grammar}");
    }

    let Some(input_path) = &options.input else {
        return Ok(true);
    };
    let input = read_file(input_path)?;
    run_input(&options, &grammar, input_path, &input)
}

fn run_input(
    options: &Options,
    grammar: &Grammar,
    path: &Path,
    input: &str,
) -> anyhow::Result<bool> {
    let result = pegtest::parse_input_with(grammar, input, options.interpret_options());

    if options.memo {
        result.memo.display_into(&mut StdoutSink, grammar)?;
    }

    match &result.outcome {
        Ok(parsed) => {
            if parsed.parsed_to as usize != input.len() {
                log::info!("Input matched up to byte {} of {}", parsed.parsed_to, input.len());
            }
            if options.json {
                let json = JsonNode::new(&result.tree, parsed.root, input);
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else if options.ast {
                result.tree.display_into(&mut StdoutSink, parsed.root, input)?;
            }
            Ok(true)
        }
        Err(e) => {
            Reporter::new(path, input, options.errors).report(std::slice::from_ref(e));
            if options.trail {
                let top = grammar.axiom().and_then(|axiom| result.memo.get(0, axiom));
                for id in top.map(|top| result.memo.failure_trail(top)).unwrap_or_default() {
                    result.memo.display_entry_into(&mut StdoutSink, id, grammar)?;
                    println!();
                }
            }
            Ok(false)
        }
    }
}
