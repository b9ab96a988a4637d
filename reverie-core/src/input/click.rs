//! Direct UI acknowledgement: the host posts the clicked choice index.

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::debug;

use crate::{
    error::Result,
    events::InputKind,
    input::{listener::Listener, InputMethod},
    prompt::PromptHandle,
};

/// Long-lived click queue owned by the host UI.
///
/// `sender()` goes to whatever renders the choices; `input_method()` is
/// called once per prompt.
#[derive(Debug, Clone)]
pub struct ClickChannel {
    tx: Sender<usize>,
    rx: Receiver<usize>,
}

impl ClickChannel {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> ClickSender {
        ClickSender(self.tx.clone())
    }

    pub fn input_method(&self) -> ClickInputMethod {
        ClickInputMethod {
            rx: self.rx.clone(),
            listener: None,
        }
    }
}

impl Default for ClickChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// UI side of a [`ClickChannel`].
#[derive(Debug, Clone)]
pub struct ClickSender(Sender<usize>);

impl ClickSender {
    /// Report a click on the choice at `index`. Returns `false` once every
    /// receiver is gone.
    pub fn click(&self, index: usize) -> bool {
        self.0.send(index).is_ok()
    }
}

pub struct ClickInputMethod {
    rx: Receiver<usize>,
    listener: Option<Listener>,
}

impl InputMethod for ClickInputMethod {
    fn kind(&self) -> InputKind {
        InputKind::Click
    }

    fn show(&mut self, prompt: PromptHandle) -> Result<()> {
        self.dismiss();

        // Clicks aimed at an earlier prompt must not leak into this one.
        let stale = self.rx.try_iter().count();
        if stale > 0 {
            debug!(prompt_id = prompt.id(), stale, "discarded stale clicks");
        }

        let rx = self.rx.clone();
        let name = format!("click-prompt-{}", prompt.id());
        let listener = Listener::spawn(name, move |stop_rx| loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(rx) -> msg => match msg {
                    Ok(index) => {
                        prompt.resolve(index, InputKind::Click);
                        if prompt.is_settled() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
            }
        })?;
        self.listener = Some(listener);
        Ok(())
    }

    fn dismiss(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }
}

impl Drop for ClickInputMethod {
    fn drop(&mut self) {
        self.dismiss();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::input::InputMethods;
    use crate::prompt::{choice::Choices, Prompt};

    #[test]
    fn click_resolves_prompt() {
        let channel = ClickChannel::new();
        let clicks = channel.sender();
        let choices = Choices::decide(["North", "South", "East"], "en-US").expect("valid choices");
        let prompt = Prompt::new(
            choices,
            InputMethods::default().with(channel.input_method()),
        );

        prompt.show().expect("show");
        assert!(clicks.click(2));

        let resolution = prompt
            .wait(Some(Duration::from_secs(2)))
            .expect("click should resolve");
        assert_eq!(resolution.index, 2);
        assert_eq!(resolution.source, InputKind::Click);
        prompt.dismiss();
    }

    #[test]
    fn stale_clicks_are_discarded_on_show() {
        let channel = ClickChannel::new();
        let clicks = channel.sender();
        clicks.click(0);

        let choices = Choices::decide(["Stay", "Go"], "en-US").expect("valid choices");
        let prompt = Prompt::new(
            choices,
            InputMethods::default().with(channel.input_method()),
        );
        prompt.show().expect("show");
        let outcome = prompt.wait(Some(Duration::from_millis(50)));
        assert!(outcome.is_err(), "stale click must not resolve: {outcome:?}");
    }

    #[test]
    fn dismiss_without_show_is_noop() {
        let channel = ClickChannel::new();
        let mut method = channel.input_method();
        method.dismiss();
        method.dismiss();
    }
}
