use anyhow::{Context as _, Result};
use clap::Parser;
use relay::cli::{Args, Commands, ConfigDiscovery, RunArgs, RunRequest, apply_overrides, execute_run};
use relay::env::DEFAULT_LOG_FILTER;
use relay::vars::MemoryConfigSource;
use relay::{BackendOptions, Relay, RelayOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout belongs to attached containers
    let default_filter = if args.verbose {
        "relay=debug"
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut options = ConfigDiscovery::load(args.config.as_deref())?;
    apply_overrides(&mut options, &args);

    match &args.command {
        Commands::Run(run) => {
            let code = run_command(options, run).await?;
            std::process::exit(exit_status(code));
        }
        Commands::Ping => ping_command(&options).await,
        Commands::Config => {
            print!("{}", options.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_command(mut options: RelayOptions, run: &RunArgs) -> Result<i64> {
    let source = MemoryConfigSource::from_apps(std::mem::take(&mut options.apps));
    let env = run
        .resolve_env(&source)
        .await
        .context("Failed to resolve container environment")?;

    let relay = Relay::new(options).context("Failed to initialize relay")?;
    let request = RunRequest {
        container: run.to_container(env),
        timeout: run.timeout(),
        keep: run.keep,
    };
    info!(
        "Running {} as {} on {} backend",
        request.container.image,
        request.container.name,
        relay.backend_kind()
    );

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    match execute_run(&relay, &request, &mut stdin, &mut stdout).await {
        Ok(code) => {
            info!("Container {} exited with {}", request.container.name, code);
            Ok(code)
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            Err(e)
        }
    }
}

async fn ping_command(options: &RelayOptions) -> Result<()> {
    match options.backend.clone().normalized() {
        BackendOptions::Fake { .. } => {
            println!("fake backend: ok");
            Ok(())
        }
        #[cfg(feature = "docker")]
        BackendOptions::Docker(docker) => {
            let backend = relay::container::DockerBackend::new(&docker)
                .context("Failed to build docker client")?;
            backend.ping().await.context("Docker engine unreachable")?;
            println!("docker backend: ok");
            Ok(())
        }
        #[cfg(not(feature = "docker"))]
        BackendOptions::Docker(_) => {
            anyhow::bail!("docker backend requires the `docker` feature")
        }
    }
}

/// Clamp a container exit code into the range a process can report.
fn exit_status(code: i64) -> i32 {
    i32::try_from(code).unwrap_or(1)
}
