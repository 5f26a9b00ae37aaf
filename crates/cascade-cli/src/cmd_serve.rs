use std::sync::Arc;

use cascade_engine::{CascadeConfig, ReprioritizeService, SystemClock};
use cascade_llm::{AnthropicClient, LlmAnalyzer, LlmClassifier, LlmClient};
use cascade_serve::ServeConfig;
use cascade_store::StateLock;

pub fn execute(
    mut config: CascadeConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let paths = config.paths();
    let _lock = StateLock::acquire(&paths)?;

    let client: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(config.llm.clone())?);
    let service = ReprioritizeService::new(
        paths,
        Arc::new(LlmClassifier::new(client.clone())),
        Arc::new(LlmAnalyzer::new(client)),
        config.session_ttl(),
        Arc::new(SystemClock),
    )?;

    let recovered = service.recover_orphans()?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "rolled back sessions from a previous run");
    }
    tracing::info!(
        state_dir = %config.state_dir.display(),
        model = %config.llm.model,
        "starting cascade server"
    );

    let serve_config = ServeConfig {
        bind: config.bind.clone(),
        port: config.port,
    };
    tokio::runtime::Runtime::new()?.block_on(cascade_serve::serve(Arc::new(service), serve_config))
}
