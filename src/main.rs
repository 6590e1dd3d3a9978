use clap::{Arg, Command, value_parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shellwise::config::Config;
use shellwise::credentials::{Credentials, ECNU, MODELSCOPE};
use shellwise::http_client::ReqwestHttpClient;
use shellwise::orchestrator::CommandOrchestrator;
use shellwise::profile::ProfileCatalog;
use shellwise::router::ModelRouter;
use shellwise::safety::SafetyGate;
use shellwise::shell::InteractiveShell;

fn cli() -> Command {
    Command::new("shellwise")
        .about("Turn plain-language requests into shell commands")
        .long_about(
            "shellwise asks a remote language model for the shell command that does what you describe, \
             checks it for destructive patterns and runs it only after you confirm",
        )
        .arg(Arg::new("query").help("Request to translate once, then exit").num_args(1..))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the JSON config file")
                .value_name("CONFIG")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .help("Model to start with")
                .value_name("MODEL"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .help("Seconds a confirmed command may run before it is killed")
                .value_name("TIMEOUT")
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("api-key")
                .short('k')
                .long("api-key")
                .help("API key for the provider of the selected model")
                .value_name("API_KEY"),
        )
        .arg(
            Arg::new("show-config")
                .long("show-config")
                .help("Show configuration information")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-models")
                .long("list-models")
                .help("List supported models")
                .action(clap::ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let catalog = ProfileCatalog::builtin();

    if matches.get_flag("list-models") {
        for name in catalog.names() {
            if let Some(profile) = catalog.get(name) {
                println!("{:<16} {:<11} {}", profile.name, profile.provider_id, profile.model_id);
            }
        }
        return Ok(());
    }

    let config_path = match matches.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };
    let mut config = Config::load(Some(&config_path))?;

    if let Some(model) = matches.get_one::<String>("model") {
        config.model = model.clone();
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.command_timeout_secs = *timeout;
    }
    config.validate()?;

    let flag_provider = catalog.get(&config.model).map(|p| p.provider_id.clone());
    let flag = match (matches.get_one::<String>("api-key"), flag_provider.as_deref()) {
        (Some(key), Some(provider)) => Some((provider, key.as_str())),
        _ => None,
    };
    let credentials = Credentials::from_env(flag, &config.api_keys);

    if matches.get_flag("show-config") {
        config.show_config_with_io(&config_path, &credentials, &[ECNU, MODELSCOPE], &mut std::io::stdout())?;
        return Ok(());
    }

    info!("Starting with model {}", config.model);

    let router = ModelRouter::new(
        catalog,
        credentials.clone(),
        config.router_settings(),
        Arc::new(ReqwestHttpClient::new()),
    )?;
    let orchestrator = CommandOrchestrator::new(router, SafetyGate::new(), config.sampling(), config.block_policy);
    let mut shell = InteractiveShell::new(orchestrator, config, config_path, credentials);

    let query: Vec<String> = matches
        .get_many::<String>("query")
        .unwrap_or_default()
        .map(|s| s.to_string())
        .collect();

    if query.is_empty() {
        shell.run().await
    } else {
        shell.run_once(&query.join(" ")).await
    }
}
