//! pushlink runtime
//!
//! The moving parts of the relay:
//! - `NotificationListener`: authenticated Noise channel for paired phones
//! - `PairingListener`: operator-approved trust establishment
//! - `Dispatcher`: bounded, per-connection ordered presentation
//! - `Supervisor`: starts both listeners and coordinates shutdown
//!
//! `pushlink-core` provides the wire format, keys and identity store these
//! build on.

pub mod approval;
pub mod authorizer;
pub mod client;
pub mod dispatch;
pub mod net;
pub mod notification;
pub mod pairing;
pub mod presentation;
pub mod shutdown;
pub mod supervisor;

pub use approval::{Approval, ApprovalPrompt, ApprovalRequest, AutoApprove, AutoReject, ChannelPrompt};
pub use authorizer::Authorizer;
pub use client::{NotificationSender, PeerClient};
pub use dispatch::{Admission, DispatchLane, DispatchSettings, Dispatcher};
pub use notification::{BoundNotificationListener, ListenerState, NotificationListener, NotificationSettings};
pub use pairing::{
    Announcer, BoundPairingListener, LogAnnouncer, PairingAnnouncement, PairingListener, PairingSettings,
    PairingState,
};
pub use presentation::{
    sink_from_config, CommandSink, FanoutSink, ImageFormat, LogSink, Presentation, PresentationSink,
    RenderedImage, Template,
};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use supervisor::{Components, RunningRelay, Supervisor};

// Re-export core types for convenience
pub use pushlink_core::{
    config::PushlinkConfig, BindError, IdentityStore, KeyPair, NotificationMessage, PairingResponse,
    PeerIdentifier, PublicKey, PushlinkError,
};
