use clap::Parser;
use pve_shim::cli::{Cli, LogFormat, RuntimeTag, Verb};
use pve_shim::config::Config;
use pve_shim::error::ShimError;
use pve_shim::orchestrator::Orchestrator;
use pve_shim::state::BackendTag;
use std::time::Duration;

fn backend_tag(runtime: Option<RuntimeTag>) -> Option<BackendTag> {
    match runtime? {
        RuntimeTag::Crun | RuntimeTag::Runc => Some(BackendTag::Crun),
        RuntimeTag::Lxc => Some(BackendTag::Lxc),
        RuntimeTag::Vm => Some(BackendTag::Vm),
    }
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    builder.init();
}

fn report(format: LogFormat, err: &ShimError) -> i32 {
    match format {
        LogFormat::Json => {
            let diagnostic = err.to_diagnostic();
            eprintln!("{}", serde_json::to_string(&diagnostic).unwrap_or_default());
        }
        LogFormat::Text => eprintln!("pve-shim: {err} (kind={})", err.kind()),
    }
    err.exit_code()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let log_format = cli.log_format;

    if matches!(cli.verb, Verb::Spec) {
        let skeleton = pve_shim::spec::Spec::default_skeleton();
        match serde_json::to_string_pretty(&skeleton) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("pve-shim: failed to render spec skeleton: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = Config::from_cli(&cli);
    let orchestrator = match Orchestrator::new(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("pve-shim: failed to initialize: {e:#}");
            std::process::exit(1);
        }
    };

    let exit_code = match run(&orchestrator, cli.verb).await {
        Ok(()) => 0,
        Err(err) => report(log_format, &err),
    };
    std::process::exit(exit_code);
}

async fn run(orchestrator: &Orchestrator, verb: Verb) -> pve_shim::error::Result<()> {
    match verb {
        Verb::Spec => unreachable!("handled before orchestrator construction"),

        Verb::Create {
            id,
            bundle,
            runtime,
            ..
        } => {
            let record = orchestrator.create(&id, &bundle, backend_tag(runtime)).await?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
            Ok(())
        }

        Verb::Run {
            id,
            bundle,
            runtime,
        } => {
            orchestrator.create(&id, &bundle, backend_tag(runtime)).await?;
            let record = orchestrator.start(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
            Ok(())
        }

        Verb::Start { id } => {
            let record = orchestrator.start(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
            Ok(())
        }

        Verb::Stop { id, timeout } => {
            let record = orchestrator.stop(&id, Duration::from_secs(timeout)).await?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
            Ok(())
        }

        Verb::Kill { id, signal } => {
            let signal = signal.unwrap_or_else(|| "SIGTERM".to_string());
            orchestrator.kill(&id, &signal).await?;
            Ok(())
        }

        Verb::Delete { id, force } => orchestrator.delete(&id, force).await,

        Verb::State { id } => {
            let record = orchestrator.state(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
            Ok(())
        }

        Verb::Exec {
            id,
            cwd,
            env,
            user,
            tty,
            argv,
        } => {
            let request = pve_shim::backend::ExecRequest {
                argv,
                env,
                cwd: cwd.map(|p| p.display().to_string()),
                user,
                tty,
            };
            let code = orchestrator.exec(&id, &request).await?;
            std::process::exit(code);
        }

        Verb::List { runtime } => {
            let entries = orchestrator.list(backend_tag(runtime)).await?;
            println!("{}", serde_json::to_string_pretty(&entries).unwrap_or_default());
            Ok(())
        }

        Verb::Checkpoint { id, image_path } => {
            let path = image_path.ok_or_else(|| {
                ShimError::UsageError("checkpoint requires --image-path".to_string())
            })?;
            orchestrator.checkpoint(&id, &path).await
        }

        Verb::Restore { id, image_path } => {
            let path = image_path.ok_or_else(|| {
                ShimError::UsageError("restore requires --image-path".to_string())
            })?;
            orchestrator.restore(&id, &path).await
        }
    }
}
