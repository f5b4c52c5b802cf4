use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use fastgpt_stream::{ConnectionState, Conversation};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::app::ChatApp;
use crate::session::LiveSession;

/// After stdin ends, give up once the server has been quiet this long.
const DRAIN_QUIET: Duration = Duration::from_secs(10);

/// Writes only what the conversation gained since the last call.
#[derive(Debug, Default)]
struct DeltaPrinter {
    prose: usize,
    code: usize,
}

impl DeltaPrinter {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn write_new(&mut self, conversation: &Conversation, out: &mut impl Write) -> std::io::Result<()> {
        let prose = conversation.prose();
        if prose.len() > self.prose {
            out.write_all(prose[self.prose..].as_bytes())?;
            self.prose = prose.len();
        }

        let code = conversation.code();
        if code.len() > self.code {
            let fresh = code[self.code..].trim_start_matches('\n');
            writeln!(out, "\n[code]\n{fresh}\n[/code]")?;
            self.code = code.len();
        }
        out.flush()
    }
}

/// Plain stdin/stdout chat for pipes and dumb terminals.
///
/// Each input line is a prompt. `/clear`, `/test` and `/quit` map to the
/// screen mode shortcuts.
pub async fn run(mut app: ChatApp, mut session: LiveSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printer = DeltaPrinter::default();
    let mut stdout = std::io::stdout();

    loop {
        let quiet = tokio::time::sleep(DRAIN_QUIET);

        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed; draining remaining output");
                    stdin_open = false;
                    continue;
                };
                let prompt = match line.trim() {
                    "" => continue,
                    "/quit" => break,
                    "/clear" => {
                        app.clear();
                        printer.reset();
                        continue;
                    }
                    "/test" => app.test_prompt().to_string(),
                    _ => line,
                };
                let outcome = session.submit(app.request(prompt));
                app.record_outcome(outcome);
                if let Some(status) = app.status() {
                    eprintln!("{status}");
                }
            }

            update = session.next_update() => {
                let Some(update) = update else { break };
                app.apply_update(update);
                printer.write_new(app.conversation(), &mut stdout)?;
                if app.state() == ConnectionState::Closed {
                    warn!(url = session.url(), "connection closed");
                    if !stdin_open {
                        break;
                    }
                }
            }

            _ = quiet, if !stdin_open => {
                info!("no output for {}s after end of input", DRAIN_QUIET.as_secs());
                break;
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close();
    Ok(())
}
