use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use farebot_agent::{AgentRuntime, LlmClient, OllamaClient, RuntimeOptions};
use farebot_core::config::{
    AppConfig, ConfigOverrides, LlmProvider, LoadOptions, LogFormat, LoggingConfig,
};
use farebot_core::ConversationId;
use farebot_tools::{
    register_reservation_tools, HttpTransport, ReservationGateway, RetryPolicy, ToolRegistry,
};

use super::CommandResult;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub fn run(
    config_path: Option<PathBuf>,
    model: Option<String>,
    backend_url: Option<String>,
) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path,
        overrides: ConfigOverrides {
            llm_model: model,
            backend_base_url: backend_url,
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "config", error.to_string(), 2),
    };

    init_logging(&config.logging);

    let llm: Arc<dyn LlmClient> = match build_llm(&config) {
        Ok(llm) => llm,
        Err(message) => return CommandResult::failure("chat", "llm", message, 2),
    };

    let tokio_runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("chat", "runtime", error.to_string(), 1),
    };

    let transport = match HttpTransport::new(
        &config.backend.base_url,
        Duration::from_secs(config.backend.timeout_secs),
    ) {
        Ok(transport) => transport,
        Err(error) => return CommandResult::failure("chat", "backend", error.to_string(), 2),
    };
    let gateway = Arc::new(ReservationGateway::new(
        transport,
        RetryPolicy { max_attempts: config.backend.search_attempts, ..RetryPolicy::default() },
        config.backend.user_id,
    ));

    let mut registry = ToolRegistry::new();
    if let Err(error) = register_reservation_tools(&mut registry) {
        return CommandResult::failure("chat", "registry", error.to_string(), 1);
    }

    let agent = AgentRuntime::new(
        llm,
        gateway,
        Arc::new(registry),
        RuntimeOptions {
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            extraction_retries: config.llm.extraction_retries,
            today: None,
        },
    );

    let conversation = ConversationId::new();
    info!(%conversation, model = %config.llm.model, "chat session started");
    println!("farebot - where do you want to fly? (type `exit` to leave)");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else { break };
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if matches!(utterance.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match tokio_runtime.block_on(agent.handle_turn(conversation, utterance)) {
            Ok(reply) => println!("{}", reply.text),
            Err(error) => println!("something went wrong: {error}"),
        }
    }

    tokio_runtime.block_on(agent.store().end(conversation));
    CommandResult::success("chat", "session ended")
}

fn build_llm(config: &AppConfig) -> Result<Arc<dyn LlmClient>, String> {
    match config.llm.provider {
        LlmProvider::Ollama => {
            let base_url = config.llm.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            let client = OllamaClient::new(
                base_url,
                &config.llm.model,
                Duration::from_secs(config.llm.timeout_secs),
            )
            .map_err(|error| error.to_string())?;
            Ok(Arc::new(client))
        }
        other => Err(format!("llm provider {other:?} is not wired for chat yet; use ollama")),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    // A second init (e.g. under tests) keeps the first subscriber.
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
