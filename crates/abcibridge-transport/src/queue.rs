//! Ordered hand-off between the connection reader and the consumer.

use tokio::sync::mpsc;

use crate::envelope::Envelope;

pub(crate) enum QueueSender {
    Bounded(mpsc::Sender<Envelope>),
    Unbounded(mpsc::UnboundedSender<Envelope>),
}

pub(crate) enum QueueReceiver {
    Bounded(mpsc::Receiver<Envelope>),
    Unbounded(mpsc::UnboundedReceiver<Envelope>),
}

pub(crate) fn queue(capacity: Option<usize>) -> (QueueSender, QueueReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

impl QueueSender {
    /// Enqueue, waiting for room on a bounded queue. Returns `false` once the
    /// receiving side has been closed.
    pub(crate) async fn push(&self, envelope: Envelope) -> bool {
        match self {
            QueueSender::Bounded(tx) => tx.send(envelope).await.is_ok(),
            QueueSender::Unbounded(tx) => tx.send(envelope).is_ok(),
        }
    }
}

impl QueueReceiver {
    pub(crate) async fn pop(&mut self) -> Option<Envelope> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Close the queue and discard whatever is still buffered.
    pub(crate) fn close_and_drain(&mut self) -> usize {
        let mut discarded = 0;
        match self {
            QueueReceiver::Bounded(rx) => {
                rx.close();
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
            }
            QueueReceiver::Unbounded(rx) => {
                rx.close();
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
            }
        }
        discarded
    }
}
