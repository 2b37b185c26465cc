use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deploy_train::config::{DeployConfig, RootsConfig};
use deploy_train::deploy::Dispatcher;
use deploy_train::engine::SignalRegistry;
use deploy_train::github::GitHubClient;
use deploy_train::local::{GitRootFetcher, ShellCommands, TerraformCli};
use deploy_train::persistence::FileDeploymentStore;
use deploy_train::server::{AppState, build_router};
use deploy_train::terraform::{
    JobWorkflowLauncher, PlanReviewGate, StepRegistry, TerraformJobWorkflow,
    TerraformWorkflowRunner,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deploy_train=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "deploy-train exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = DeployConfig::from_env()?;
    let roots = RootsConfig::load(&config.roots_file)?;
    info!(repos = roots.repo_count(), roots_file = %config.roots_file.display(), "loaded roots");

    let github = Arc::new(GitHubClient::from_token(config.github_token.clone())?);
    let store = Arc::new(FileDeploymentStore::new(&config.state_dir));
    let fetcher = Arc::new(GitRootFetcher::new(&config.workspace_dir));
    let steps = StepRegistry::standard(
        Arc::new(TerraformCli::new(config.terraform_bin.clone())),
        Arc::new(ShellCommands),
    );

    let reviews = SignalRegistry::new();
    let job_url_base = Some(config.job_url_base.clone()).filter(|base| !base.is_empty());
    let job = TerraformJobWorkflow::new(
        fetcher,
        steps,
        PlanReviewGate::new(config.plan_review_timeout),
    )
    .with_job_url_base(job_url_base);
    let launcher = Arc::new(JobWorkflowLauncher::new(job, reviews.clone()));
    let runner = Arc::new(TerraformWorkflowRunner::new(launcher, github.clone()));

    let dispatcher = Arc::new(
        Dispatcher::new(roots, github, store, runner, reviews)
            .with_receive_timeout(config.revision_receive_timeout),
    );
    let app = build_router(AppState::new(dispatcher.clone(), config.webhook_secret.clone()));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", config.listen_addr);

    let shutdown = dispatcher.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received ctrl-c"),
                () = shutdown.cancelled() => {}
            }
        })
        .await?;

    dispatcher.shutdown().await;
    info!("shut down cleanly");
    Ok(())
}
