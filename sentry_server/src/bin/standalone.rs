//! Manual command console: runs the broadcast server and issues commands typed on stdin.

use std::io::{self, BufRead, Write};

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sentry_server::{ServerConfig, ServerEvent};
use sentry_vision::CommandSink;
use sentry_vision::protocol::{CommandId, MotionCommand};

const HELP: &str = "commands: move <pan> <tilt> | cancel [id] | stop | status | quit";

#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Send(MotionCommand),
    Help,
    Quit,
}

fn parse_line(line: &str, last_id: Option<&CommandId>) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ConsoleCommand::Help);
    };
    let args: Vec<&str> = words.collect();

    match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("move", [pan, tilt]) => {
            let pan: i64 = pan.parse().map_err(|_| format!("invalid pan angle: {pan}"))?;
            let tilt: i64 = tilt.parse().map_err(|_| format!("invalid tilt angle: {tilt}"))?;
            MotionCommand::absolute(pan, tilt)
                .map(ConsoleCommand::Send)
                .map_err(|err| err.to_string())
        }
        ("move", _) => Err("usage: move <pan> <tilt>".to_string()),
        ("cancel", [id]) => Ok(ConsoleCommand::Send(MotionCommand::cancel(CommandId::new(*id)))),
        ("cancel", []) => last_id
            .cloned()
            .map(|id| ConsoleCommand::Send(MotionCommand::cancel(id)))
            .ok_or_else(|| "no command to cancel yet".to_string()),
        ("stop", []) => Ok(ConsoleCommand::Send(MotionCommand::stop(None))),
        ("status", []) => Ok(ConsoleCommand::Send(MotionCommand::status_request())),
        ("quit" | "exit", []) => Ok(ConsoleCommand::Quit),
        ("help", _) => Ok(ConsoleCommand::Help),
        _ => Err(format!("unknown command: {line}")),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = ServerConfig::default();
    if let Ok(host) = std::env::var("SENTRY_BIND") {
        if !host.is_empty() {
            config.host = host;
        }
    }
    if let Ok(port) = std::env::var("SENTRY_PORT") {
        config.port = port.parse().context("SENTRY_PORT must be a port number")?;
    }
    config.validate()?;

    let server = sentry_server::spawn(config).context("Failed to start server")?;
    let mut events = server.subscribe();
    server.runtime().spawn(async move {
        loop {
            match events.recv().await {
                Ok(ServerEvent::CommandDropped { .. }) => {}
                Ok(event) => info!("{event}"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    let mut last_id: Option<CommandId> = None;
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        match parse_line(&line, last_id.as_ref()) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(ConsoleCommand::Help) => println!("{HELP}"),
            Ok(ConsoleCommand::Send(command)) => {
                let kind = command.kind();
                let id = command.id().cloned();
                match server.submit(command) {
                    Ok(()) => {
                        info!(kind, id = ?id, "queued");
                        if kind == "MOVE" {
                            last_id = id;
                        }
                    }
                    Err(err) => error!(kind, error = %err, "command not sent"),
                }
            }
            Err(message) => println!("{message}"),
        }
        io::stdout().flush().ok();
    }

    server.shutdown()?;
    Ok(())
}
