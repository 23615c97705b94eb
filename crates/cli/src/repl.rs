//! Interactive terminal loop.
//!
//! Reserved inputs are handled here and never reach the loop controller:
//! `help`, `clear`, `debug on|off|verbose|basic`, `config`, `exit`, `quit`.

use crate::Session;
use opsloop_config::AppConfig;
use std::io::{BufRead, Write};

const HELP: &str = "\
Reserved commands:
  help                      Show this help
  clear                     Clear the screen
  debug on|off              Toggle the execution summary after each request
  debug verbose|basic       Set the summary detail level
  config                    Print the effective configuration
  exit, quit                Leave the session

Anything else is sent to the agent.";

struct DebugMode {
    enabled: bool,
    verbose: bool,
}

pub(crate) async fn run(
    session: Session,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut debug = DebugMode {
        enabled: config.debug.enabled,
        verbose: config.debug.level == "verbose",
    };

    println!("opsloop — type 'help' for reserved commands, 'exit' to leave.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let input = line?.trim().to_string();
        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "exit" | "quit" => break,
            "help" => {
                println!("{HELP}");
                continue;
            }
            "clear" => {
                // ANSI clear screen + cursor home
                print!("\x1b[2J\x1b[H");
                std::io::stdout().flush()?;
                continue;
            }
            "config" => {
                println!("{}", serde_json::to_string_pretty(config)?);
                continue;
            }
            "debug on" => {
                debug.enabled = true;
                println!("debug: on");
                continue;
            }
            "debug off" => {
                debug.enabled = false;
                println!("debug: off");
                continue;
            }
            "debug verbose" => {
                debug.verbose = true;
                debug.enabled = true;
                println!("debug: verbose");
                continue;
            }
            "debug basic" => {
                debug.verbose = false;
                println!("debug: basic");
                continue;
            }
            _ => {}
        }

        match session.agent.run(&input).await {
            Ok(report) => {
                println!("{}", report.response);
                if debug.enabled {
                    println!("\n---\n{}", report.render_summary(config.agent.max_loops));
                    if debug.verbose {
                        let summary = session.audit.tool_summary();
                        println!(
                            "Audit: {} calls ({} ok, {} failed), {:.2}s total",
                            summary.total_calls,
                            summary.successful,
                            summary.failed,
                            summary.total_duration_sec
                        );
                    }
                }
            }
            Err(e) => {
                // Transport-after-retry and invariant violations land here;
                // everything else already became a natural-language reply
                eprintln!("error: {e}");
            }
        }
    }

    println!("bye.");
    Ok(())
}
