//! Operator decisions on pairing requests

use std::net::SocketAddr;

use async_trait::async_trait;
use pushlink_core::PairingRequest;
use tokio::sync::{mpsc, oneshot};

/// Operator verdict on a pairing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Approved,
    Rejected,
}

/// Asks the operator whether a phone should be trusted
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    /// `source` is the socket the request came from, which may differ from
    /// the identifier the phone claims.
    async fn decide(&self, request: &PairingRequest, source: SocketAddr) -> Approval;
}

/// Accepts every request; for scripted setups
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalPrompt for AutoApprove {
    async fn decide(&self, _request: &PairingRequest, _source: SocketAddr) -> Approval {
        Approval::Approved
    }
}

/// Declines every request
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReject;

#[async_trait]
impl ApprovalPrompt for AutoReject {
    async fn decide(&self, _request: &PairingRequest, _source: SocketAddr) -> Approval {
        Approval::Rejected
    }
}

// ----------------------------------------------------------------------------
// Channel Prompt
// ----------------------------------------------------------------------------

/// A pending decision forwarded by [`ChannelPrompt`]
#[derive(Debug)]
pub struct ApprovalRequest {
    pub request: PairingRequest,
    pub source: SocketAddr,
    reply: oneshot::Sender<Approval>,
}

impl ApprovalRequest {
    pub fn respond(self, approval: Approval) {
        let _ = self.reply.send(approval);
    }
}

/// Forwards each request over a channel and waits for the answer.
///
/// Dropping the receiving end, or an [`ApprovalRequest`] without
/// responding, counts as a rejection.
#[derive(Debug, Clone)]
pub struct ChannelPrompt {
    requests: mpsc::Sender<ApprovalRequest>,
}

impl ChannelPrompt {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (requests, receiver) = mpsc::channel(buffer);
        (Self { requests }, receiver)
    }
}

#[async_trait]
impl ApprovalPrompt for ChannelPrompt {
    async fn decide(&self, request: &PairingRequest, source: SocketAddr) -> Approval {
        let (reply, answer) = oneshot::channel();
        let forwarded = ApprovalRequest {
            request: request.clone(),
            source,
            reply,
        };

        if self.requests.send(forwarded).await.is_err() {
            return Approval::Rejected;
        }
        answer.await.unwrap_or(Approval::Rejected)
    }
}
