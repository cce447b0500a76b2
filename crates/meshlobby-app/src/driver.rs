//! Driver trait for abstracting the platform mesh transport.
//!
//! The [`Driver`] trait decouples the lobby runtime from a specific transport.
//! Each platform implements the trait to advertise, browse, invite and send,
//! and to report transport callbacks as [`LobbyEvent`]s. The generic
//! [`crate::Runtime`] handles all orchestration.

use std::{future::Future, time::Duration};

use bytes::Bytes;
use meshlobby_core::{DecisionId, LobbyEvent, PeerIdentity, Reliability};
use meshlobby_proto::DiscoveryInfo;

/// Abstracts the mesh transport for the lobby runtime.
///
/// Commands are fire-and-forget: an `Ok` only means the transport accepted
/// the request. Outcomes arrive later through [`Driver::next_event`].
pub trait Driver: Send + 'static {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Wait for the next transport callback.
    ///
    /// Returns `None` once the transport has shut down. Must be cancel safe:
    /// the runtime drops the future whenever another input wins the select.
    fn next_event(&mut self) -> impl Future<Output = Option<LobbyEvent>> + Send;

    /// Begin advertising `identity` under `service_tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the advertiser could not be started.
    fn start_advertising(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &str,
        info: &DiscoveryInfo,
    ) -> Result<(), Self::Error>;

    /// Stop advertising.
    fn stop_advertising(&mut self);

    /// Begin browsing for `service_tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser could not be started.
    fn start_browsing(&mut self, identity: &PeerIdentity, service_tag: &str)
    -> Result<(), Self::Error>;

    /// Stop browsing.
    fn stop_browsing(&mut self);

    /// Invite `peer` into the session with an opaque context.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport refused the invitation.
    fn invite(
        &mut self,
        peer: &PeerIdentity,
        context: Bytes,
        timeout: Duration,
    ) -> Result<(), Self::Error>;

    /// Invoke a pending invitation callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the decision is unknown to the transport.
    fn respond_to_invitation(&mut self, decision: DecisionId, accept: bool)
    -> Result<(), Self::Error>;

    /// Invoke a pending certificate callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the decision is unknown to the transport.
    fn respond_to_certificate(
        &mut self,
        decision: DecisionId,
        accept: bool,
    ) -> Result<(), Self::Error>;

    /// Send a message to connected peers.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport could not queue the message.
    fn send(
        &mut self,
        peers: &[PeerIdentity],
        payload: Bytes,
        reliability: Reliability,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Drop the connection to `peer`.
    fn cancel_connection(&mut self, peer: &PeerIdentity);

    /// Create a session owned by `identity` and start reporting its callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be created.
    fn open_session(&mut self, identity: &PeerIdentity) -> Result<(), Self::Error>;

    /// Disconnect everyone and stop reporting callbacks for the current
    /// session.
    fn close_session(&mut self);
}
