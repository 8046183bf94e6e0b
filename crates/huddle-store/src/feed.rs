//! Change-feed cursor abstraction.

use async_trait::async_trait;
use huddle_core::ChangeEvent;
use tokio::sync::mpsc;

use crate::errors::Result;

/// A live cursor over storage changes.
///
/// Yields events in the order the backend produced them. `None` means the
/// feed ended normally; `Some(Err(_))` is unrecoverable for this cursor.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Wait for the next change.
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// event, so callers can race it against cancellation in `select!`.
    async fn next(&mut self) -> Option<Result<ChangeEvent>>;

    /// Release the cursor. Further `next` calls return `None`.
    async fn close(&mut self);
}

/// A feed driven by an in-process channel.
///
/// Handy for adapting push-style backends and for scripting events in tests.
pub struct ChannelFeed {
    rx: mpsc::Receiver<Result<ChangeEvent>>,
    closed: bool,
}

impl ChannelFeed {
    /// Create a feed and the sender that drives it.
    pub fn new(capacity: usize) -> (mpsc::Sender<Result<ChangeEvent>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, closed: false })
    }
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn yields_in_send_order() {
        let (tx, mut feed) = ChannelFeed::new(8);
        for i in 0..3 {
            tx.send(Ok(ChangeEvent::created(json!({"n": i})))).await.unwrap();
        }
        for i in 0..3 {
            let ev = feed.next().await.unwrap().unwrap();
            assert_eq!(ev.new_val, Some(json!({"n": i})));
        }
    }

    #[tokio::test]
    async fn ends_when_sender_dropped() {
        let (tx, mut feed) = ChannelFeed::new(1);
        drop(tx);
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn close_stops_delivery_and_rejects_sends() {
        let (tx, mut feed) = ChannelFeed::new(4);
        tx.send(Ok(ChangeEvent::created(json!({})))).await.unwrap();
        feed.close().await;
        assert!(feed.next().await.is_none());
        assert!(tx.send(Ok(ChangeEvent::default())).await.is_err());
    }

    #[tokio::test]
    async fn forwards_errors() {
        let (tx, mut feed) = ChannelFeed::new(1);
        tx.send(Err(StoreError::Backend("gone".into()))).await.unwrap();
        assert_matches!(feed.next().await, Some(Err(StoreError::Backend(_))));
    }
}
