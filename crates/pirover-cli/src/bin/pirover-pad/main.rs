//! `pirover-pad` – teleop client for the rover's command channel.
//!
//! ```text
//! pirover-pad [host | ws://host:port] [port]
//! ```
//!
//! Connects over WebSocket, reads console commands (see `help`) and prints
//! every notification the rover streams back. Leaving the prompt (`quit`,
//! Ctrl-C, Ctrl-D) always sends `stop` first.

mod console;
mod mapper;

use std::process::ExitCode;

use colored::Colorize;
use futures_util::{SinkExt, StreamExt};
use pirover_runtime::init_tracing;
use pirover_types::{DriveIntent, RoverError};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::console::{Action, Console, HELP, describe, drive_frame};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;

fn main() -> ExitCode {
    let url = match target_url(std::env::args().skip(1).collect()) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("{}: {e}\nusage: pirover-pad [host | ws://host:port] [port]", "error".red());
            return ExitCode::FAILURE;
        }
    };

    let _tracing = init_tracing("pirover-pad");
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "failed to start the async runtime".red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&url)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "pirover-pad".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn target_url(args: Vec<String>) -> Result<String, String> {
    match args.as_slice() {
        [] => Ok(format!("ws://{DEFAULT_HOST}:{DEFAULT_PORT}/")),
        [url] if url.contains("://") => Ok(url.clone()),
        [host] => Ok(format!("ws://{host}:{DEFAULT_PORT}/")),
        [host, port] => {
            let port: u16 = port.parse().map_err(|_| format!("invalid port '{port}'"))?;
            Ok(format!("ws://{host}:{port}/"))
        }
        _ => Err("too many arguments".to_string()),
    }
}

async fn run(url: &str) -> Result<(), RoverError> {
    println!("  Connecting to {} …", url.bold());
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| RoverError::Channel(format!("cannot reach {url}: {e}")))?;
    println!("  {} Connected. Type {} for commands.\n", "✓".green().bold(), "help".bold().cyan());

    let (mut tx, mut rx) = ws.split();

    // ── Rover → console ───────────────────────────────────────────────────
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
                    Ok(frame) => println!("  {}", describe(&frame)),
                    Err(e) => debug!(error = %e, "unreadable frame"),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        println!("  {}", "connection closed by the rover".yellow());
    });

    // ── Console → rover ───────────────────────────────────────────────────
    // rustyline blocks, so it lives on its own thread and hands lines over.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || read_lines(line_tx));

    let mut console = Console::default();
    while let Some(line) = line_rx.recv().await {
        match console.interpret(&line) {
            Ok(Action::Send(frame)) => {
                if tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            Ok(Action::Local(text)) if !text.is_empty() => println!("{text}"),
            Ok(Action::Local(_)) => {}
            Ok(Action::Quit) => break,
            Err(e) => println!("  {} Type {} for commands.", e.red(), "help".bold()),
        }
    }

    let stop = drive_frame(&DriveIntent::stop());
    if let Err(e) = tx.send(Message::Text(stop.to_string().into())).await {
        warn!(error = %e, "could not send the final stop");
    }
    let _ = tx.close().await;
    printer.abort();
    println!("  {}", "Rover stopped. Bye.".green());
    Ok(())
}

/// Read console lines until EOF, Ctrl-C or `quit`; closing the channel tells
/// the async side to stop.
fn read_lines(lines: mpsc::Sender<String>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {e}", "console unavailable".red());
            return;
        }
    };
    println!("{HELP}\n");
    loop {
        match editor.readline("pad> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                let quit = matches!(line.trim(), "quit" | "exit" | "q");
                if lines.blocking_send(line).is_err() || quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "console error".red());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_from_arguments() {
        assert_eq!(target_url(vec![]).unwrap(), "ws://127.0.0.1:5000/");
        assert_eq!(target_url(vec!["rover.local".into()]).unwrap(), "ws://rover.local:5000/");
        assert_eq!(
            target_url(vec!["10.0.0.5".into(), "6000".into()]).unwrap(),
            "ws://10.0.0.5:6000/"
        );
        assert_eq!(target_url(vec!["ws://x:1/".into()]).unwrap(), "ws://x:1/");
        assert!(target_url(vec!["h".into(), "port".into()]).is_err());
    }
}
