use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use agentcore_core::config::{expand_env, AgentCoreConfig};
use agentcore_middleware::{
    CommandMiddleware, FileSystemMiddleware, MemoryMiddleware, MiddlewareStack, ModelCaller, MonitorMiddleware,
    PromptCachingMiddleware, QueueMiddleware, SearchMiddleware, SearchProvider, SkillDefinition, SkillMiddleware,
    TaskMiddleware, TodoMiddleware,
};
use agentcore_memory::{Compactor, SummaryStore};
use agentcore_observer::{AgentRuntime, CostCalculator};
use agentcore_queue::QueueManager;
use agentcore_sandbox::local_provider::LocalProcessProvider;
use agentcore_sandbox::types::SessionPolicy;
use agentcore_sandbox::SandboxManager;
use agentcore_scheduler::{RunExecutor, SchedulerSubAgentSpawner};
use agentcore_store::Store;

mod app;
mod http;
mod model_provider;
mod web;

const USAGE: &str = "agentcore-gateway — agent engine HTTP gateway

Usage: agentcore-gateway [--config <path>]

Options:
  -c, --config <path>  explicit config file (overrides ./agentcore.toml)
  -h, --help           print this help";

// Exit codes for the CLI surface.
const EXIT_USAGE: u8 = 10;
const EXIT_READ_ERROR: u8 = 11;
const EXIT_EMPTY_INPUT: u8 = 12;
const EXIT_CONFIG_INVALID: u8 = 20;

struct CliArgs {
    config: Option<String>,
}

fn parse_args(argv: Vec<String>) -> Result<CliArgs, ExitCode> {
    let mut args = CliArgs { config: None };
    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let Some(path) = iter.next() else {
                    eprintln!("--config requires a path\n\n{USAGE}");
                    return Err(ExitCode::from(EXIT_USAGE));
                };
                args.config = Some(path);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return Err(ExitCode::SUCCESS);
            }
            other => {
                eprintln!("unknown argument: {other}\n\n{USAGE}");
                return Err(ExitCode::from(EXIT_USAGE));
            }
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) => args,
        Err(code) => return code,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentcore_gateway=info,tower_http=debug".into()),
        )
        .init();

    // An explicitly named config file must exist and be non-empty; the
    // implicit project/home files stay optional.
    if let Some(path) = &args.config {
        match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => {
                eprintln!("config file {path} is empty");
                return ExitCode::from(EXIT_EMPTY_INPUT);
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("cannot read config file {path}: {e}");
                return ExitCode::from(EXIT_READ_ERROR);
            }
        }
    }

    let config = match AgentCoreConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid config: {e}");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: AgentCoreConfig) -> anyhow::Result<()> {
    let default_model = config.agent.resolved_model()?;

    let db_path = expand_env(&config.database.path);
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(Store::open(&db_path)?);

    let workspace_root = config
        .agent
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_else(|_| "/".to_string()));

    let mut sandbox = SandboxManager::new(store.clone(), "local".to_string(), Duration::from_secs(600))
        .with_default_cwd(&workspace_root);
    sandbox.register_provider(Arc::new(LocalProcessProvider::new()));
    let sandbox = Arc::new(sandbox);

    let queue = Arc::new(QueueManager::new());

    let api_key = config
        .agent
        .api_key
        .as_deref()
        .map(expand_env)
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
        .unwrap_or_default();
    if api_key.is_empty() || api_key.starts_with("${") {
        warn!("no API key configured; model calls will fail until agent.api_key or ANTHROPIC_API_KEY is set");
    }
    let model_caller: Arc<dyn ModelCaller> = Arc::new(
        model_provider::AnthropicModelCaller::new(api_key, config.agent.base_url.clone())
            .with_generation_params(config.agent.max_tokens, config.agent.temperature),
    );

    let compaction = config.agent.memory.compaction.clone();
    let summarizer = Arc::new(model_provider::ModelSummarizer::new(
        model_caller.clone(),
        compaction.summary_model.clone(),
    ));
    let compactor = Compactor::new(compaction, SummaryStore::new(store.clone()), summarizer);
    let memory = MemoryMiddleware::new(config.agent.memory.pruning.clone(), compactor, config.agent.context_limit);

    let runtime = Arc::new(AgentRuntime::new(config.agent.context_limit, CostCalculator::with_default_pricing()));
    let spawner = Arc::new(SchedulerSubAgentSpawner::new(default_model));

    // Outermost first: queued input is spliced in before memory records the
    // turn, cache markers go on after memory has rewritten the message list,
    // and the tool-providing middlewares sit innermost.
    let mut stack = MiddlewareStack::new();
    stack.push(Arc::new(QueueMiddleware::new(queue.clone())));
    stack.push(Arc::new(memory));
    stack.push(Arc::new(PromptCachingMiddleware));
    stack.push(Arc::new(MonitorMiddleware::new(runtime.clone())));
    stack.push(Arc::new(FileSystemMiddleware::via_manager(sandbox.clone(), &workspace_root)));
    stack.push(Arc::new(CommandMiddleware::via_manager(sandbox.clone())));
    stack.push(Arc::new(SearchMiddleware::new(vec![
        Arc::new(web::HttpFetchProvider::new()) as Arc<dyn SearchProvider>,
    ])));
    stack.push(Arc::new(SkillMiddleware::new(load_skills())));
    stack.push(Arc::new(TaskMiddleware::new(spawner.clone())));
    stack.push(Arc::new(TodoMiddleware::new()));

    let tool_config = config.tool.clone();
    stack.set_tool_filter(move |name| {
        let category = tool_category(name);
        tool_config.get(category).map(|c| c.tool_enabled(name)).unwrap_or(true)
    });

    let executor = Arc::new(RunExecutor::with_runtime(Arc::new(stack), queue.clone(), model_caller, runtime));
    spawner.bind(executor.clone());

    spawn_session_sweeper(sandbox.clone());

    let state = Arc::new(app::AppState::new(config.clone(), store, sandbox, queue, executor));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("agentcore gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Marks lapsed sessions expired on an interval of one tenth the idle
/// timeout, complementing the lazy reap on access.
fn spawn_session_sweeper(sandbox: Arc<SandboxManager>) {
    let interval = Duration::from_secs((SessionPolicy::default().idle_timeout_seconds / 10).max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let swept = match sandbox.known_thread_ids() {
                Ok(ids) => sandbox.reap_expired(&ids).await,
                Err(e) => Err(e),
            };
            match swept {
                Ok(0) => {}
                Ok(n) => info!(reaped = n, "expired chat sessions"),
                Err(e) => warn!(error = %e, "session sweep failed"),
            }
        }
    });
}

/// Maps a tool name to its configuration category, for the
/// `tool.<category>.enabled` / `tool.<category>.tools.<name>` overrides.
fn tool_category(name: &str) -> &'static str {
    match name {
        "read_file" | "write_file" | "edit_file" | "list_dir" => "filesystem",
        "run_command" | "command_status" => "command",
        "web_search" | "web_fetch" => "search",
        "load_skill" => "skill",
        "task" => "task",
        "todo_read" | "todo_write" => "todo",
        _ => "other",
    }
}

/// Loads skill bundles from `~/.agentcore/skills/*.md`. The file stem is
/// the skill name, the first non-empty line its catalog summary.
fn load_skills() -> Vec<SkillDefinition> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = std::path::PathBuf::from(format!("{home}/.agentcore/skills"));
    let mut skills = Vec::new();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return skills;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Ok(body) = std::fs::read_to_string(&path) else {
            continue;
        };
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let summary = body
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim_start_matches('#')
            .trim()
            .to_string();
        skills.push(SkillDefinition { name, summary, body });
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}
