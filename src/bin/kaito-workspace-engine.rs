use std::error::Error;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kaito_workspace_engine::{
    cli::Cli,
    config::EngineConfig,
    k8s::client::KubeResourceClient,
    k8s::readiness::ReadinessPoller,
    logging::Logging,
    model::{test_models::register_test_models, Model, ModelRegistry},
    workspace::{
        manifests::KubeManifestBuilder, sku::SkuGpuResolver, InferenceConfig, PresetInference,
        Workspace,
    },
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // init logging singleton
    Logging::try_init()?;

    let cli = Cli::init_engine_cli();

    let config = EngineConfig::load(&cli.get_config())?;
    let workspace: Workspace =
        serde_yaml::from_reader(std::fs::File::open(cli.get_workspace())?)?;

    let mut registry = ModelRegistry::new();
    register_test_models(&mut registry)?;

    let preset_name = workspace
        .preset_name()
        .ok_or_else(|| format!("workspace `{}` has no preset", workspace.name))?;
    let model = registry.get(preset_name)?;
    let params = model.inference_parameters();
    let distributed = model.supports_distributed_inference();

    let inference_config = match cli.registry_name() {
        Some(registry_name) => InferenceConfig::new(registry_name),
        None => config.inference_config(),
    };

    info!("Creating the k8s client");
    let client = Arc::new(KubeResourceClient::try_default(config.retry_policy()).await?);

    let engine = PresetInference::new(
        client.clone(),
        KubeManifestBuilder::new(),
        SkuGpuResolver::new(client.clone()),
        inference_config,
    );

    info!(workspace = workspace.name.as_str(), preset = preset_name, "Deploying preset inference");
    engine.ensure_services(&workspace, distributed).await?;
    let workload = engine
        .create_preset_inference(&workspace, cli.revision(), &params, distributed)
        .await?;

    if !cli.wait() {
        return Ok(());
    }

    let timeout = cli.timeout().unwrap_or(params.readiness_timeout);
    info!(kind = %workload.kind(), name = workload.name(), ?timeout, "Waiting for the workload to be ready");
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping the readiness check");
                cancel.cancel();
            }
        }
    });

    let poller = ReadinessPoller::new(client).with_interval(config.poll_interval());
    poller
        .wait_until_ready_or_cancelled(&workload, timeout, &cancel)
        .await
        .inspect_err(|err| error!("workload not ready: {err}"))?;

    info!("Workload is ready");
    Ok(())
}
