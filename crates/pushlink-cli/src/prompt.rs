//! Interactive pairing approval on the terminal

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;

use async_trait::async_trait;
use pushlink_core::PairingRequest;
use pushlink_runtime::{Approval, ApprovalPrompt};
use tokio::sync::oneshot;
use tracing::warn;

/// Asks on stdin whether to trust a phone.
///
/// Only an explicit `yes` (or `y`) approves. End of input, read errors and
/// anything else reject. The read happens on a detached thread so a pending
/// question never holds up runtime shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ApprovalPrompt for TerminalPrompt {
    async fn decide(&self, request: &PairingRequest, source: SocketAddr) -> Approval {
        let question = describe_request(request, source);
        let (reply, answer) = oneshot::channel();

        let spawned = std::thread::Builder::new()
            .name("pairing-prompt".into())
            .spawn(move || {
                let _ = reply.send(ask(&question));
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Could not start the approval prompt");
            return Approval::Rejected;
        }

        answer.await.unwrap_or(Approval::Rejected)
    }
}

fn ask(question: &str) -> Approval {
    let mut stdout = io::stdout().lock();
    if write!(stdout, "{}Accept? (yes/no) ", question)
        .and_then(|_| stdout.flush())
        .is_err()
    {
        return Approval::Rejected;
    }
    drop(stdout);

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => Approval::Rejected,
        Ok(_) => parse_answer(&line),
    }
}

/// What the operator sees before answering
pub fn describe_request(request: &PairingRequest, source: SocketAddr) -> String {
    let mut text = format!(
        "\nPairing request from {} (connected from {})\n",
        request.identifier,
        source.ip()
    );
    if request.identifier.as_str() != source.ip().to_string() {
        text.push_str("  Note: the claimed identifier differs from the connecting address\n");
    }
    text.push_str(&format!("  Public key:  {}\n", request.public_key));
    text.push_str(&format!("  Fingerprint: {}\n", request.public_key.fingerprint()));
    text
}

pub fn parse_answer(line: &str) -> Approval {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Approval::Approved,
        _ => Approval::Rejected,
    }
}
