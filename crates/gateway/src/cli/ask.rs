//! `fieldrep ask`: send one message through a running gateway.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fr_client::{ChatSession, ReqwestTransport, Role, TurnOutcome, TurnPayload};
use fr_domain::config::Config;

pub async fn run(
    config: &Config,
    thread_id: String,
    assistant_id: String,
    message: String,
    streaming: bool,
) -> anyhow::Result<()> {
    let transport = ReqwestTransport::from_config(&config.client).context("building gateway client")?;
    let session = Arc::new(ChatSession::new(
        Arc::new(transport),
        Duration::from_secs(config.client.timeout_secs),
    ));

    // Print the assistant bubble as it grows, and step changes on stderr.
    let mut rx = session.subscribe();
    let printer_task = tokio::spawn(async move {
        let mut printer = BubblePrinter::default();
        let mut last_step: Option<String> = None;
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            if view.step != last_step {
                if let Some(step) = &view.step {
                    eprintln!("[{step}]");
                }
                last_step = view.step.clone();
            }
            if let Some(bubble) = view.messages.last().filter(|m| m.role == Role::Assistant) {
                if let Some(text) = printer.next(&bubble.id, &bubble.content) {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
            }
        }
    });

    let outcome = tokio::select! {
        outcome = session.send_with(TurnPayload {
            thread_id,
            message,
            assistant_id,
            streaming,
        }) => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            TurnOutcome::Aborted
        }
    };

    let view = session.snapshot();
    drop(session);
    let _ = printer_task.await;
    println!();

    if let Some(bubble) = view.last_assistant() {
        for citation in &bubble.citations {
            match &citation.file_name {
                Some(file) => println!("  {} ({file})", citation.label()),
                None => println!("  {}", citation.label()),
            }
        }
        for source in &bubble.sources {
            println!(
                "  source: {} pp. {}-{} (score {:.2})",
                source.document_name, source.page_start, source.page_end, source.relevance_score
            );
        }
    }

    match outcome {
        TurnOutcome::Completed => Ok(()),
        TurnOutcome::Failed(text) => anyhow::bail!("{text}"),
        TurnOutcome::Aborted => anyhow::bail!("aborted"),
        TurnOutcome::TimedOut => anyhow::bail!(
            "no response within {}s",
            config.client.timeout_secs
        ),
    }
}

/// What has been written of the latest assistant bubble.
#[derive(Debug, Default)]
struct BubblePrinter {
    id: Option<String>,
    shown: String,
}

impl BubblePrinter {
    /// Text to write so the terminal catches up with `content`.  Growth
    /// prints only the new suffix.  A rewritten bubble (markers replaced by
    /// `[n]` when the message completes) or a different bubble starts a new
    /// line with the full text.
    fn next(&mut self, id: &str, content: &str) -> Option<String> {
        let out = match self.id.as_deref() {
            Some(current) if current == id => match content.strip_prefix(self.shown.as_str()) {
                Some("") => None,
                Some(suffix) => Some(suffix.to_owned()),
                None => Some(format!("\n{content}")),
            },
            Some(_) => Some(format!("\n{content}")),
            None => Some(content.to_owned()),
        };
        self.id = Some(id.to_owned());
        self.shown = content.to_owned();
        out
    }
}
