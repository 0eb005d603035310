//! Replays recorded partial responses against a saved page.
//!
//! Each response file answers one request triggered from `--source`. Lifecycle
//! events are printed as JSON lines on stdout, followed by the resulting page.
use clap::Parser;
use html::serialize::outer_html;
use html::{Document, ScriptError, ScriptHost};
use mimalloc::MiMalloc;
use net::ReplayTransport;
use runtime_net::{AjaxRuntime, ConfigError, EngineConfig, Navigator, RequestError, RequestSpec};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "partial-replay")]
#[command(about = "Apply recorded partial responses to a page")]
struct Cli {
    /// Saved page markup
    page: PathBuf,
    /// Recorded response bodies, one per request
    #[arg(required = true)]
    responses: Vec<PathBuf>,
    /// Id or name of the triggering element
    #[arg(long)]
    source: String,
    /// Ids to execute (`@this`, `@form` allowed)
    #[arg(long, default_value = "@this")]
    execute: String,
    /// Ids to render
    #[arg(long, default_value = "")]
    render: String,
    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip printing the final page
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Scripts are reported, not executed.
struct LoggedScripts;

impl ScriptHost for LoggedScripts {
    fn eval(&mut self, code: &str) -> Result<(), ScriptError> {
        log::info!(target: "ajax.patch", "script: {}", code.trim());
        Ok(())
    }

    fn load(&mut self, src: &str) -> Result<(), ScriptError> {
        log::info!(target: "ajax.patch", "script load: {src}");
        Ok(())
    }
}

struct PrintNavigation;

impl Navigator for PrintNavigation {
    fn navigate(&mut self, url: &str) {
        eprintln!("navigate: {url}");
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if config.base_url.is_none() {
        config.base_url = Some("http://localhost/".to_string());
    }

    let mut doc = Document::parse(&read(&cli.page)?);
    let replay = ReplayTransport::new();
    let mut runtime =
        AjaxRuntime::with_transports(config, Box::new(replay.clone()), Box::new(replay.clone()));
    let events = runtime.broadcaster_mut().subscribe();

    for path in &cli.responses {
        replay.respond(read(path)?);
        let spec = RequestSpec::new().execute(&cli.execute).render(&cli.render);
        runtime.request(&doc, &cli.source, spec)?;
        let result = runtime.pump(&mut doc, &mut LoggedScripts, &mut PrintNavigation);
        for event in events.try_iter() {
            println!("{}", serde_json::to_string(&event)?);
        }
        if let Err(err) = result {
            log::warn!(target: "ajax.request", "{}: {err}", path.display());
        }
    }

    if !cli.quiet {
        let root = doc.document_element().unwrap_or(doc.root());
        println!("{}", outer_html(&doc, root));
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("partial-replay: {err}");
            ExitCode::FAILURE
        }
    }
}
