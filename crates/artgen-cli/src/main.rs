use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use artgen_contracts::chat::{help_lines, parse_command, ComposeCommand};
use artgen_contracts::dimensions::{AspectRatio, DimensionFamily, ResolutionTier};
use artgen_contracts::models::{ModelIdentity, ModelRegistry, ResolverState};
use artgen_contracts::prompt::{insert_grid, insert_style, TokenKind};
use artgen_contracts::request::{build_receipt, sanitize_payload, write_receipt, ReferenceImage};
use artgen_contracts::session::SessionStore;
use artgen_engine::config::CompilerConfig;
use artgen_engine::error::CompileError;
use artgen_engine::{resolve_dimensions, strip_tokens, CompileInput, RequestCompiler};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "artgen", version, about = "Compile prompts and references into generation requests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile one request and print it as JSON.
    Compile(CompileArgs),
    /// Preview model, size and cost without packaging references.
    Resolve(ResolveArgs),
    /// Remove every token of one kind from a prompt.
    Strip(StripArgs),
    /// Print the output size for an aspect ratio and dimension family.
    Dims(DimsArgs),
    /// Interactive compose session.
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct CompileArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "auto")]
    model: String,
    #[arg(long, default_value = "1:1")]
    ratio: AspectRatio,
    #[arg(long)]
    resolution: Option<ResolutionTier>,
    #[arg(long, default_value_t = 1)]
    count: u32,
    #[arg(long = "ref")]
    refs: Vec<PathBuf>,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long)]
    magic: bool,
    #[arg(long, default_value = "default")]
    session: String,
    #[arg(long)]
    state: Option<PathBuf>,
    #[arg(long)]
    receipt: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ResolveArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "auto")]
    model: String,
    #[arg(long, default_value_t = 0)]
    refs: usize,
    #[arg(long, default_value = "1:1")]
    ratio: AspectRatio,
    #[arg(long)]
    resolution: Option<ResolutionTier>,
    #[arg(long, default_value_t = 1)]
    count: u32,
    #[arg(long, default_value = "default")]
    session: String,
    #[arg(long)]
    state: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct StripArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    kind: TokenKind,
}

#[derive(Debug, Parser)]
struct DimsArgs {
    #[arg(long)]
    ratio: AspectRatio,
    #[arg(long)]
    family: DimensionFamily,
    #[arg(long)]
    resolution: Option<ResolutionTier>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = "default")]
    session: String,
    #[arg(long)]
    state: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory that receives one receipt per submitted request.
    #[arg(long)]
    receipts: Option<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("artgen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Compile(args) => run_compile(args),
        Command::Resolve(args) => run_resolve(args),
        Command::Strip(args) => {
            println!("{}", strip_tokens(&args.prompt, args.kind));
            Ok(0)
        }
        Command::Dims(args) => {
            println!("{}", resolve_dimensions(args.ratio, args.family, args.resolution));
            Ok(0)
        }
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
    }
}

fn run_compile(args: CompileArgs) -> Result<i32> {
    let config = CompilerConfig::load(args.config.as_deref())?;
    let mut session = Session::open(&config, args.state, &args.session);
    let compiler = RequestCompiler::from_config(config, &args.session)?;

    let mut input = CompileInput::new(args.prompt);
    input.explicit_model = parse_model(compiler.registry(), &args.model)?;
    input.aspect_ratio = args.ratio;
    input.resolution = args.resolution;
    input.count = args.count;
    input.negative_prompt = args.negative;
    input.use_magic_prompt = args.magic;
    input.references = args
        .refs
        .iter()
        .map(|path| load_reference(path))
        .collect::<Result<_>>()?;

    let (request, resolution) = match compiler.compile_with_resolution(&input, &mut session.state) {
        Ok(compiled) => compiled,
        Err(err) => return Ok(report_compile_error(&err)),
    };
    session.save()?;

    let receipt = build_receipt(&request, &resolution, &args.session)?;
    if let Some(path) = &args.receipt {
        write_receipt(path, &receipt)?;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&sanitize_payload(&serde_json::to_value(&request)?))?
    );
    Ok(0)
}

fn run_resolve(args: ResolveArgs) -> Result<i32> {
    let config = CompilerConfig::load(args.config.as_deref())?;
    let mut session = Session::open(&config, args.state, &args.session);
    let compiler = RequestCompiler::from_config(config, &args.session)?;

    let mut input = CompileInput::new(args.prompt);
    input.explicit_model = parse_model(compiler.registry(), &args.model)?;
    input.aspect_ratio = args.ratio;
    input.resolution = args.resolution;
    input.count = args.count;
    input.references = (0..args.refs)
        .map(|index| ReferenceImage::new(format!("ref-{index}"), Vec::new(), "image/png"))
        .collect();

    match compiler.preview(&input, &mut session.state) {
        Ok(preview) => {
            session.save()?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(0)
        }
        Err(err) => Ok(report_compile_error(&err)),
    }
}

fn report_compile_error(err: &CompileError) -> i32 {
    eprintln!("compile failed: {err}");
    if err.is_retryable() {
        3
    } else {
        2
    }
}

/// Resolver state for one session id, persisted when a store path is known.
struct Session {
    id: String,
    store: Option<SessionStore>,
    state: ResolverState,
}

impl Session {
    fn open(config: &CompilerConfig, state_path: Option<PathBuf>, id: &str) -> Self {
        let mut store = state_path
            .or_else(|| config.sessions_path_or_default())
            .map(SessionStore::new);
        let state = store
            .as_mut()
            .map(|store| store.load(id))
            .unwrap_or_default();
        Self {
            id: id.to_string(),
            store,
            state,
        }
    }

    fn save(&mut self) -> Result<()> {
        if let Some(store) = self.store.as_mut() {
            store.save(&self.id, &self.state)?;
            tracing::debug!(session = %self.id, path = %store.path().display(), "saved resolver state");
        }
        Ok(())
    }
}

fn parse_model(registry: &ModelRegistry, raw: &str) -> Result<ModelIdentity> {
    if let Some(spec) = registry.lookup(raw) {
        return Ok(spec.identity);
    }
    match raw.parse::<ModelIdentity>() {
        Ok(model) => Ok(model),
        Err(err) => bail!("{err}"),
    }
}

/// Reads an image file, sniffing its MIME type from the content.
fn load_reference(path: &Path) -> Result<ReferenceImage> {
    let bytes = fs::read(path).with_context(|| format!("reading reference {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognized image", path.display()))?;
    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "reference".to_string());
    let mut image = ReferenceImage::new(id, bytes, format.to_mime_type());
    if let Some(name) = path.file_name() {
        image = image.with_name(name.to_string_lossy().to_string());
    }
    Ok(image)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let config = CompilerConfig::load(args.config.as_deref())?;
    let session = Session::open(&config, args.state, &args.session);
    let compiler = RequestCompiler::from_config(config, &args.session)?;
    let mut compose = ComposeSession::new(&compiler, session, args.receipts);

    let stdin = io::stdin();
    let mut line = String::new();
    println!("artgen chat started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match compose.apply(parse_command(&line)) {
            Ok(Reply::Quit) => break,
            Ok(Reply::Lines(lines)) => {
                for text in lines {
                    println!("{text}");
                }
            }
            Err(err) => println!("{err:#}"),
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Self::Lines(vec![text.into()])
    }
}

struct ComposeSession<'a> {
    compiler: &'a RequestCompiler,
    session: Session,
    input: CompileInput,
    receipts_dir: Option<PathBuf>,
    submitted: usize,
}

impl<'a> ComposeSession<'a> {
    fn new(compiler: &'a RequestCompiler, session: Session, receipts_dir: Option<PathBuf>) -> Self {
        Self {
            compiler,
            session,
            input: CompileInput::default(),
            receipts_dir,
            submitted: 0,
        }
    }

    fn apply(&mut self, command: ComposeCommand) -> Result<Reply> {
        let reply = match command {
            ComposeCommand::Noop => Reply::Lines(Vec::new()),
            ComposeCommand::SetPrompt(text) => {
                self.input.prompt = text;
                self.preview_line()?
            }
            ComposeCommand::SetModel(raw) if raw.is_empty() => Reply::Lines(
                self.compiler
                    .registry()
                    .list()
                    .map(|spec| format!("{}  ({})", spec.label, spec.identity))
                    .collect(),
            ),
            ComposeCommand::SetModel(raw) => {
                let model = parse_model(self.compiler.registry(), &raw)?;
                self.input.explicit_model = model;
                self.session.state.on_model_selected(model);
                self.session.save()?;
                Reply::line(format!("Model set to {}", self.compiler.registry().label(model)))
            }
            ComposeCommand::SetRatio(raw) => {
                self.input.aspect_ratio = raw.parse().map_err(anyhow::Error::msg)?;
                Reply::line(format!("Aspect ratio set to {}", self.input.aspect_ratio))
            }
            ComposeCommand::SetResolution(raw) => {
                let tier: ResolutionTier = raw.parse().map_err(anyhow::Error::msg)?;
                self.input.resolution = Some(tier);
                Reply::line(format!("Resolution set to {tier}"))
            }
            ComposeCommand::SetCount(raw) => {
                let count: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid count: {raw}"))?;
                if count == 0 {
                    bail!("count must be at least 1");
                }
                self.input.count = count;
                Reply::line(format!("Count set to {count}"))
            }
            ComposeCommand::AddReferences(paths) => {
                if paths.is_empty() {
                    bail!("/ref requires at least one image path");
                }
                let max = self.compiler.config().max_reference_images;
                if self.input.references.len() + paths.len() > max {
                    bail!("at most {max} reference images are allowed");
                }
                for path in &paths {
                    let image = load_reference(Path::new(path))?;
                    self.input.references.push(image);
                }
                Reply::line(format!("{} reference image(s) attached", self.input.references.len()))
            }
            ComposeCommand::ClearReferences => {
                self.input.references.clear();
                Reply::line("References cleared")
            }
            ComposeCommand::InsertStyle(value) => {
                self.input.prompt = insert_style(&self.input.prompt, &value);
                self.preview_line()?
            }
            ComposeCommand::InsertGrid(value) => {
                self.input.prompt = insert_grid(&self.input.prompt, &value);
                self.preview_line()?
            }
            ComposeCommand::RemoveStyle => {
                self.input.prompt = strip_tokens(&self.input.prompt, TokenKind::Style);
                self.preview_line()?
            }
            ComposeCommand::RemoveGrid => {
                self.input.prompt = strip_tokens(&self.input.prompt, TokenKind::Grid);
                self.preview_line()?
            }
            ComposeCommand::SetNegative(text) => {
                let reply = match &text {
                    Some(text) => format!("Negative prompt set to {text}"),
                    None => "Negative prompt cleared".to_string(),
                };
                self.input.negative_prompt = text;
                Reply::line(reply)
            }
            ComposeCommand::ToggleMagic => {
                self.input.use_magic_prompt = !self.input.use_magic_prompt;
                Reply::line(format!(
                    "Magic prompt {}",
                    if self.input.use_magic_prompt { "on" } else { "off" }
                ))
            }
            ComposeCommand::Preview => self.preview_line()?,
            ComposeCommand::Submit => self.submit()?,
            ComposeCommand::Help => Reply::Lines(help_lines()),
            ComposeCommand::Quit => Reply::Quit,
            ComposeCommand::Unknown { command, .. } => {
                Reply::line(format!("Unknown command /{command}. Type /help for commands."))
            }
        };
        Ok(reply)
    }

    /// Every prompt edit is a resolution pass, so escalations stick while composing.
    fn preview_line(&mut self) -> Result<Reply> {
        if self.input.prompt.trim().is_empty() {
            return Ok(Reply::line("Prompt is empty"));
        }
        let reply = match self.compiler.preview(&self.input, &mut self.session.state) {
            Ok(preview) => Reply::line(format!(
                "{} | {}x{} | {} credits for {}",
                preview.model_label, preview.width, preview.height, preview.cost, preview.count
            )),
            Err(err) => Reply::line(format!("preview unavailable: {err}")),
        };
        self.session.save()?;
        Ok(reply)
    }

    fn submit(&mut self) -> Result<Reply> {
        let (request, resolution) = match self
            .compiler
            .compile_with_resolution(&self.input, &mut self.session.state)
        {
            Ok(compiled) => compiled,
            Err(err) => return Ok(Reply::line(format!("Compile failed: {err}"))),
        };
        self.session.save()?;
        self.submitted += 1;

        let receipt = build_receipt(&request, &resolution, &self.session.id)?;
        let mut lines = vec![serde_json::to_string_pretty(
            receipt.get("request").unwrap_or(&Value::Null),
        )?];
        if let Some(dir) = &self.receipts_dir {
            let path = dir.join(format!("receipt-{}-{:03}.json", self.session.id, self.submitted));
            write_receipt(&path, &receipt)?;
            lines.push(format!("Receipt written to {}", path.display()));
        }
        Ok(Reply::Lines(lines))
    }
}
