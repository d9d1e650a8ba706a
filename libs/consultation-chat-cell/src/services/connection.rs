use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::models::{OutboundFrame, Participant};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,

    #[error("connection writer has gone away")]
    Closed,
}

/// Session-side end of one participant socket.
///
/// The room session is the only owner of `outbound`. Dropping the `Connection`
/// closes the queue, which ends the socket writer and with it the socket.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    pub room_id: Uuid,
    pub participant: Participant,
    outbound: mpsc::Sender<OutboundFrame>,
}

impl Connection {
    /// Creates a connection with a bounded outbound queue and returns the writer's receiving end.
    pub fn open(
        room_id: Uuid,
        participant: Participant,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: Uuid::new_v4(),
            room_id,
            participant,
            outbound,
        };
        (connection, receiver)
    }

    /// Never waits: a slow reader must not hold up the room.
    pub fn deliver(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;

    fn error_frame() -> OutboundFrame {
        OutboundFrame::error(&ChatError::InvalidInput("x".into()))
    }

    #[tokio::test]
    async fn full_queue_reports_full() {
        let (conn, mut rx) = Connection::open(Uuid::new_v4(), Participant::patient(Uuid::new_v4()), 1);

        assert_eq!(conn.deliver(error_frame()), Ok(()));
        assert_eq!(conn.deliver(error_frame()), Err(DeliveryError::Full));

        assert!(rx.recv().await.is_some());
        assert_eq!(conn.deliver(error_frame()), Ok(()));
    }

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let (conn, rx) = Connection::open(Uuid::new_v4(), Participant::doctor(Uuid::new_v4()), 4);
        drop(rx);

        assert!(conn.is_closed());
        assert_eq!(conn.deliver(error_frame()), Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn dropping_connection_ends_receiver() {
        let (conn, mut rx) = Connection::open(Uuid::new_v4(), Participant::doctor(Uuid::new_v4()), 4);
        drop(conn);
        assert!(rx.recv().await.is_none());
    }
}
