use pv_pool::controllers::pvpool_controller::{self, State};
use pv_pool::util::{config::OperatorConfig, telemetry};
use std::future::Future;
use tracing::info;

mod handlers;
mod server;

/// Polls the controller and the web server until both shut down gracefully.
///
/// The first one to fail ends the process, a server must not report healthy for a dead controller.
async fn serve<C, S>(controller: C, server: S) -> anyhow::Result<()>
where
    C: Future<Output = anyhow::Result<()>>,
    S: Future<Output = anyhow::Result<()>>,
{
    tokio::try_join!(controller, server)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;
    let config = OperatorConfig::from_env()?;
    info!(
        "Starting PvPool controller (namespace: {}, agent timeout: {:?})",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.agent_timeout
    );

    // Initialize Kubernetes controller state
    let state = State::default();
    let controller = pvpool_controller::run(state.clone(), config.clone());
    let server = server::start_server(state, &config.bind_addr);

    serve(controller, server).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::time::Duration;

    #[tokio::test]
    async fn controller_failure_stops_the_server() {
        let controller = async { Err(anyhow::anyhow!("CRD is not queryable")) };
        let server = pending::<anyhow::Result<()>>();

        let result = tokio::time::timeout(Duration::from_secs(1), serve(controller, server)).await;

        let err = result.expect("serve kept running").unwrap_err();
        assert!(err.to_string().contains("CRD"));
    }

    #[tokio::test]
    async fn server_failure_stops_the_controller() {
        let controller = pending::<anyhow::Result<()>>();
        let server = async { Err(anyhow::anyhow!("address in use")) };

        let result = tokio::time::timeout(Duration::from_secs(1), serve(controller, server)).await;

        assert!(result.expect("serve kept running").is_err());
    }

    #[tokio::test]
    async fn graceful_shutdown_of_both_is_ok() {
        assert!(serve(async { Ok(()) }, async { Ok(()) }).await.is_ok());
    }
}
