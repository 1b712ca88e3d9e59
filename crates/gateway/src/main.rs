use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cr_domain::config::ObservabilityConfig;
use cr_gateway::bootstrap;
use cr_gateway::cli::chat::ChatArgs;
use cr_gateway::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            message,
            user,
            character,
            session,
            model,
            provider,
            history,
            timeout_secs,
            json,
        } => {
            let (config, _) = cr_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            let state = bootstrap::build_app_state(Arc::new(config))?;
            let args = ChatArgs {
                message,
                user,
                character,
                session,
                model,
                provider,
                history,
                timeout_secs,
                json,
            };
            if !cr_gateway::cli::chat::run(state, args).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Roast {
            message,
            model,
            provider,
        } => {
            let (config, _) = cr_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            let state = bootstrap::build_app_state(Arc::new(config))?;
            if !cr_gateway::cli::roast::run(state, message, model, provider).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Sessions {
            user,
            character,
            json,
        } => {
            let (config, _) = cr_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            let state = bootstrap::build_app_state(Arc::new(config))?;
            cr_gateway::cli::sessions::list(state, &user, &character, json).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cr_gateway::cli::load_config()?;
            if !cr_gateway::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cr_gateway::cli::load_config()?;
            cr_gateway::cli::config::show(&config)
        }
        Command::Version => {
            println!("chatrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Install the global subscriber.  Logs go to stderr so replies on stdout
/// stay pipeable.
///
/// `RUST_LOG` takes precedence over `observability.log_filter`.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    if obs.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
