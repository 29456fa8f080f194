//! Host event system.
//!
//! The host emits an event for every lifecycle step and every diagnostic
//! the dispatcher records. Events are broadcast; a slow receiver skips
//! what it missed instead of blocking the host.

use crate::controller::{Hook, LifecycleState};
use crate::stream::StreamId;
use futures::future::BoxFuture;
use std::fmt;
use tokio::sync::broadcast;

/// Events emitted by a [`ControlHost`](super::ControlHost).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// A controller constructed successfully and was registered.
    ControllerLoaded {
        /// Unique controller name.
        name: String,
    },

    /// A controller was destroyed and removed.
    ControllerUnloaded {
        /// Unique controller name.
        name: String,
    },

    /// A controller's `construct` failed; nothing was registered.
    ConstructFailed {
        /// Name the controller would have had.
        name: String,
        /// Code returned by the hook.
        code: i32,
    },

    /// A controller moved to a new lifecycle state.
    LifecycleChanged {
        /// Controller name.
        controller: String,
        /// Stream the transition belongs to, if any.
        stream: Option<StreamId>,
        /// Previous state.
        from: LifecycleState,
        /// New state.
        to: LifecycleState,
    },

    /// An advisory hook returned a failure.
    HookFailed {
        /// Controller name.
        controller: String,
        /// Which hook.
        hook: Hook,
        /// Stream, for per-filter hooks.
        stream: Option<StreamId>,
        /// Filter, for per-filter hooks.
        filter: Option<String>,
        /// Code returned by the hook.
        code: i32,
    },

    /// A controller vetoed the start of a filter.
    StartVetoed {
        /// Controller name.
        controller: String,
        /// Stream being started.
        stream: StreamId,
        /// Filter that will not start.
        filter: String,
    },

    /// A filter started.
    FilterStarted {
        /// Stream of the filter.
        stream: StreamId,
        /// Filter name.
        filter: String,
    },

    /// A filter's `start` failed.
    FilterFailed {
        /// Stream of the filter.
        stream: StreamId,
        /// Filter name.
        filter: String,
        /// Failure description.
        message: String,
    },

    /// A filter stopped.
    FilterStopped {
        /// Stream of the filter.
        stream: StreamId,
        /// Filter name.
        filter: String,
    },

    /// A stream finished starting.
    StreamStarted {
        /// The stream.
        stream: StreamId,
    },

    /// A stream finished stopping.
    StreamStopped {
        /// The stream.
        stream: StreamId,
    },

    /// A parameter query named an unknown target.
    QueryRejected {
        /// Requested stream.
        stream: StreamId,
        /// Requested filter.
        filter: String,
        /// Requested parameter.
        parameter: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A callback was skipped because of its shape.
    SignatureMismatch {
        /// Stream of the parameter.
        stream: StreamId,
        /// Owner filter.
        filter: String,
        /// Parameter name.
        parameter: String,
        /// Required number of inputs.
        expected: usize,
        /// Number of inputs the callback accepts.
        found: usize,
    },

    /// A callback returned nonzero.
    CallbackFailed {
        /// Stream of the parameter.
        stream: StreamId,
        /// Owner filter.
        filter: String,
        /// Parameter name.
        parameter: String,
        /// Returned status.
        code: i32,
    },

    /// A callback panicked.
    CallbackPanicked {
        /// Stream of the parameter.
        stream: StreamId,
        /// Owner filter.
        filter: String,
        /// Parameter name.
        parameter: String,
    },
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::ControllerLoaded { name } => write!(f, "Controller {} loaded", name),
            ControlEvent::ControllerUnloaded { name } => write!(f, "Controller {} unloaded", name),
            ControlEvent::ConstructFailed { name, code } => {
                write!(f, "Controller {} construct() failed ({})", name, code)
            }
            ControlEvent::LifecycleChanged {
                controller,
                stream,
                from,
                to,
            } => match stream {
                Some(s) => write!(f, "Controller {} on {}: {:?} -> {:?}", controller, s, from, to),
                None => write!(f, "Controller {}: {:?} -> {:?}", controller, from, to),
            },
            ControlEvent::HookFailed {
                controller,
                hook,
                filter,
                code,
                ..
            } => match filter {
                Some(filter) => write!(
                    f,
                    "Controller {} {}() failed for {} ({})",
                    controller, hook, filter, code
                ),
                None => write!(f, "Controller {} {}() failed ({})", controller, hook, code),
            },
            ControlEvent::StartVetoed {
                controller,
                stream,
                filter,
            } => write!(f, "Controller {} vetoed start of {}:{}", controller, stream, filter),
            ControlEvent::FilterStarted { stream, filter } => {
                write!(f, "Filter {}:{} started", stream, filter)
            }
            ControlEvent::FilterFailed {
                stream,
                filter,
                message,
            } => write!(f, "Filter {}:{} failed: {}", stream, filter, message),
            ControlEvent::FilterStopped { stream, filter } => {
                write!(f, "Filter {}:{} stopped", stream, filter)
            }
            ControlEvent::StreamStarted { stream } => write!(f, "Stream {} started", stream),
            ControlEvent::StreamStopped { stream } => write!(f, "Stream {} stopped", stream),
            ControlEvent::QueryRejected {
                stream,
                filter,
                parameter,
                reason,
            } => write!(
                f,
                "Query {}:{}:{} rejected: {}",
                stream, filter, parameter, reason
            ),
            ControlEvent::SignatureMismatch {
                filter,
                parameter,
                expected,
                found,
                ..
            } => write!(
                f,
                "Callback for {}:{} takes {} inputs, not {}",
                filter, parameter, found, expected
            ),
            ControlEvent::CallbackFailed {
                filter,
                parameter,
                code,
                ..
            } => write!(f, "Callback for {}:{} returned {}", filter, parameter, code),
            ControlEvent::CallbackPanicked {
                filter, parameter, ..
            } => write!(f, "Callback for {}:{} panicked", filter, parameter),
        }
    }
}

/// Sender for host events.
#[derive(Clone)]
pub struct ControlEventSender {
    sender: broadcast::Sender<ControlEvent>,
}

impl ControlEventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that got it; 0 when nobody listens.
    pub fn send(&self, event: ControlEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> ControlEventReceiver {
        ControlEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Create a stream of events.
    pub fn stream(&self) -> ControlEventStream {
        ControlEventStream::new(self.subscribe())
    }
}

impl Default for ControlEventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for ControlEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlEventSender")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Receiver for host events.
pub struct ControlEventReceiver {
    receiver: broadcast::Receiver<ControlEvent>,
}

impl ControlEventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<ControlEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::trace!(skipped, "event receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<ControlEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain every event currently queued.
    pub fn drain(&mut self) -> Vec<ControlEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Wait for the first event matching `pred`.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> Option<ControlEvent>
    where
        F: FnMut(&ControlEvent) -> bool,
    {
        while let Some(event) = self.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    }
}

type RecvFuture = BoxFuture<'static, (Option<ControlEvent>, ControlEventReceiver)>;

/// Adapter implementing `futures::Stream` over a receiver.
///
/// The pending receive owns the receiver and lives across polls, so the
/// task stays registered for the next event.
pub struct ControlEventStream {
    next: RecvFuture,
}

impl ControlEventStream {
    /// Create a new event stream from a receiver.
    pub fn new(receiver: ControlEventReceiver) -> Self {
        Self {
            next: recv_owned(receiver),
        }
    }
}

fn recv_owned(mut receiver: ControlEventReceiver) -> RecvFuture {
    Box::pin(async move {
        let event = receiver.recv().await;
        (event, receiver)
    })
}

impl futures::Stream for ControlEventStream {
    type Item = ControlEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        match self.next.as_mut().poll(cx) {
            std::task::Poll::Pending => std::task::Poll::Pending,
            std::task::Poll::Ready((event, receiver)) => {
                self.next = recv_owned(receiver);
                std::task::Poll::Ready(event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_event_send_recv() {
        let sender = ControlEventSender::new(16);
        let mut receiver = sender.subscribe();

        sender.send(ControlEvent::StreamStarted {
            stream: StreamId::new(1),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(
            event,
            ControlEvent::StreamStarted {
                stream: StreamId::new(1)
            }
        );
    }

    #[tokio::test]
    async fn test_multiple_receivers() {
        let sender = ControlEventSender::new(16);
        let mut r1 = sender.subscribe();
        let mut r2 = sender.subscribe();

        assert_eq!(
            sender.send(ControlEvent::ControllerLoaded { name: "c".into() }),
            2
        );
        assert!(matches!(r1.recv().await, Some(ControlEvent::ControllerLoaded { .. })));
        assert!(matches!(r2.recv().await, Some(ControlEvent::ControllerLoaded { .. })));
    }

    #[tokio::test]
    async fn test_wait_for() {
        let sender = ControlEventSender::new(16);
        let mut receiver = sender.subscribe();

        let tx = sender.clone();
        tokio::spawn(async move {
            tx.send(ControlEvent::StreamStarted {
                stream: StreamId::new(2),
            });
            tx.send(ControlEvent::StreamStopped {
                stream: StreamId::new(2),
            });
        });

        let event = receiver
            .wait_for(|e| matches!(e, ControlEvent::StreamStopped { .. }))
            .await;
        assert!(event.is_some());
    }

    #[tokio::test]
    async fn test_event_stream() {
        let sender = ControlEventSender::new(16);
        let mut stream = sender.stream();
        sender.send(ControlEvent::ControllerUnloaded { name: "x".into() });
        drop(sender);

        assert_eq!(
            stream.next().await,
            Some(ControlEvent::ControllerUnloaded { name: "x".into() })
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_event_stream_wakes_on_later_event() {
        let sender = ControlEventSender::new(16);
        let mut stream = sender.stream();

        let waiter = tokio::spawn(async move { stream.next().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        sender.send(ControlEvent::StreamStarted {
            stream: StreamId::new(4),
        });
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), waiter)
            .await
            .expect("stream woke")
            .unwrap();
        assert_eq!(
            event,
            Some(ControlEvent::StreamStarted {
                stream: StreamId::new(4)
            })
        );
    }

    #[test]
    fn test_send_without_receivers() {
        let sender = ControlEventSender::default();
        assert_eq!(
            sender.send(ControlEvent::StreamStopped {
                stream: StreamId::new(0)
            }),
            0
        );
    }

    #[test]
    fn test_event_display() {
        let event = ControlEvent::SignatureMismatch {
            stream: StreamId::new(1),
            filter: "F1".into(),
            parameter: "gain".into(),
            expected: 5,
            found: 3,
        };
        assert_eq!(event.to_string(), "Callback for F1:gain takes 3 inputs, not 5");

        let event = ControlEvent::HookFailed {
            controller: "mon".into(),
            hook: Hook::PostStop,
            stream: Some(StreamId::new(1)),
            filter: Some("F1".into()),
            code: -2,
        };
        assert_eq!(event.to_string(), "Controller mon postStop() failed for F1 (-2)");
    }
}
