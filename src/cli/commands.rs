use crate::cli::args::{Args, Command, ConfigArgs, ConfigCommand, MonitorArgs};
use crate::cli::output::ConsoleWriter;
use crate::core::session::SessionManager;
use crate::domain::config::UartMonConfig;
use crate::domain::error::UartMonResult;
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::create_driver;
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Execute CLI command
pub async fn execute_command(args: Args) -> UartMonResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.load_config()?;
    if let Some(driver) = args.driver {
        config.global.driver = driver.into();
    }

    if !args.quiet {
        let level = if args.verbose {
            "debug"
        } else {
            config.global.log_level.as_str()
        };
        init_logging(level)?;
    }

    match args.command {
        Command::Ports => {
            let manager = SessionManager::new(create_driver(config.global.driver), &config);
            debug!("Listing ports with the {} driver", manager.driver_kind());
            let ports = manager.list_ports().await;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Monitor(monitor_args) => execute_monitor(monitor_args, &writer, &config).await,
        Command::Config(config_args) => {
            execute_config_command(config_args, &writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("uartmon {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_monitor(
    args: MonitorArgs,
    writer: &ConsoleWriter,
    config: &UartMonConfig,
) -> UartMonResult<()> {
    let manager = SessionManager::new(create_driver(config.global.driver), config);
    info!("Monitoring {} with the {} driver", args.port, manager.driver_kind());
    let mut events = manager.subscribe();
    let session_id = args.session;
    let baud_rate = args.baud.unwrap_or(config.serial.baud_rate);

    manager.connect_session(session_id, &args.port, baud_rate).await?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut input = if args.no_input {
        None
    } else {
        Some(spawn_stdin_reader())
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => writer.write_event(&event)?,
                Err(RecvError::Lagged(skipped)) => warn!("Output fell behind, {} events dropped", skipped),
                Err(RecvError::Closed) => break,
            },
            line = next_input_line(&mut input) => match line {
                Some(line) => {
                    if let Err(e) = manager.send_message(session_id, &line).await {
                        writer.write_error(&e.to_string())?;
                    }
                }
                None => {
                    debug!("End of input");
                    if deadline.is_none() {
                        break;
                    }
                    input = None;
                }
            },
            _ = sleep_until_deadline(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let export = manager.export_session(session_id, args.export_limit).await?;
    manager.disconnect_all().await?;

    // Flush events raised while shutting down
    while let Ok(event) = events.try_recv() {
        writer.write_event(&event)?;
    }
    writer.write_export(&export)?;
    Ok(())
}

/// Forward stdin lines from a plain thread so a pending read never holds up shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn next_input_line(input: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match input {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &UartMonConfig,
    config_manager: &ConfigManager,
) -> UartMonResult<()> {
    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
        }
        ConfigCommand::Init { force } => {
            let path = config_manager.init_config(force)?;
            writer.write_message(&format!("Configuration initialized at '{}'", path.display()))?;
        }
        ConfigCommand::Path => {
            writer.write_message(&config_manager.active_path().display().to_string())?;
        }
    }
    Ok(())
}
