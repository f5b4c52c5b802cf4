use anyhow::Result;
use ratatui::DefaultTerminal;
use tracing::{debug, info};

use super::input::KeyReader;
use crate::app::{Action, ChatApp};
use crate::session::LiveSession;
use crate::view;

/// Full-screen chat until the user quits.
pub async fn run(mut app: ChatApp, mut session: LiveSession) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = chat_loop(&mut terminal, &mut app, &mut session).await;
    ratatui::restore();
    session.close();
    result
}

async fn chat_loop(
    terminal: &mut DefaultTerminal,
    app: &mut ChatApp,
    session: &mut LiveSession,
) -> Result<()> {
    let mut keys = KeyReader::spawn();

    loop {
        terminal.draw(|frame| view::draw(frame, app))?;

        tokio::select! {
            key = keys.next() => {
                let Some(key) = key else {
                    info!("terminal input ended");
                    return Ok(());
                };
                match app.handle_key(key) {
                    Action::None => {}
                    Action::Quit => return Ok(()),
                    Action::Submit(prompt) => {
                        let request = app.request(prompt);
                        debug!(model = request.model(), test_input = request.test_input(), "submitting prompt");
                        let outcome = session.submit(request);
                        app.record_outcome(outcome);
                    }
                }
            }

            update = session.next_update() => {
                let Some(update) = update else {
                    info!("transport event stream ended");
                    return Ok(());
                };
                app.apply_update(update);
            }
        }
    }
}
