//! Exit animation completion

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Sleep;

enum Completion {
    Done,
    Signal(oneshot::Receiver<()>),
    Timer(Pin<Box<Sleep>>),
}

/// Resolves when a presenter's exit animation has finished.
///
/// A dropped [`AnimationDone`] counts as finished, so a presenter that goes
/// away cannot wedge the notification slot.
pub struct ExitAnimation {
    completion: Completion,
}

/// Completion side of [`ExitAnimation::channel`]
pub struct AnimationDone(oneshot::Sender<()>);

impl AnimationDone {
    pub fn complete(self) {
        let _ = self.0.send(());
    }
}

impl ExitAnimation {
    /// No animation: resolves immediately
    pub fn finished() -> Self {
        Self {
            completion: Completion::Done,
        }
    }

    /// Resolves once the returned handle is completed or dropped
    pub fn channel() -> (AnimationDone, Self) {
        let (tx, rx) = oneshot::channel();
        (
            AnimationDone(tx),
            Self {
                completion: Completion::Signal(rx),
            },
        )
    }

    /// Resolves after a fixed animation length. Must be created inside a
    /// tokio runtime.
    pub fn timed(duration: Duration) -> Self {
        Self {
            completion: Completion::Timer(Box::pin(tokio::time::sleep(duration))),
        }
    }
}

impl Future for ExitAnimation {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match &mut self.completion {
            Completion::Done => Poll::Ready(()),
            Completion::Signal(rx) => Pin::new(rx).poll(cx).map(|_| ()),
            Completion::Timer(sleep) => sleep.as_mut().poll(cx),
        }
    }
}

impl std::fmt::Debug for ExitAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.completion {
            Completion::Done => "done",
            Completion::Signal(_) => "signal",
            Completion::Timer(_) => "timer",
        };
        f.debug_struct("ExitAnimation").field("completion", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_timed_animation_waits() {
        let start = Instant::now();
        ExitAnimation::timed(Duration::from_millis(300)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(302));
    }

    #[tokio::test]
    async fn test_signal_and_drop_complete() {
        let (done, animation) = ExitAnimation::channel();
        done.complete();
        animation.await;

        let (done, animation) = ExitAnimation::channel();
        drop(done);
        animation.await;

        ExitAnimation::finished().await;
    }
}
