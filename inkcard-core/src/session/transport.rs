//! The seam between the session and a physical reader.

use async_trait::async_trait;

use crate::apdu::Response;
use crate::error::TransportError;

/// A command/response link to one card.
///
/// Implementations perform exactly one exchange per call; the session
/// never issues a second command before the first has answered.
#[async_trait]
pub trait Transceiver: Send {
    /// Send raw command bytes and wait for the response.
    async fn transceive(&mut self, command: &[u8]) -> Result<Response, TransportError>;

    /// Drop the physical link and wait for the card to come back.
    ///
    /// After a successful reconnect the card is unauthenticated.
    async fn reconnect(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    async fn transceive(&mut self, command: &[u8]) -> Result<Response, TransportError> {
        (**self).transceive(command).await
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        (**self).reconnect().await
    }
}
