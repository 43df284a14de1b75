//! Fragment stream lifecycle
//!
//! [`FragmentStream`] pulls boxes from a session, yields fragments one at a
//! time and releases the session resource exactly once: when the source
//! ends, when reading fails, when the caller closes it, or when it is dropped.

use super::session::{ResourceKind, Session, SessionBoxes, SessionResource, Teardown};
use crate::mp4::fragment::{Fragment, FragmentReassembler};
use crate::mp4::parser::BoxSource;
use tracing::Instrument;
use uuid::Uuid;

/// Releases a resource once, on request or on drop
pub struct ResourceGuard<R: Teardown> {
    resource: Option<R>,
    session_id: Uuid,
}

impl<R: Teardown> ResourceGuard<R> {
    pub fn new(resource: R, session_id: Uuid) -> Self {
        Self {
            resource: Some(resource),
            session_id,
        }
    }

    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.resource.is_none()
    }

    /// Tear the resource down; later calls do nothing. Failures are logged.
    pub fn release(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            match resource.teardown() {
                Ok(()) => tracing::debug!(session = %self.session_id, "Session resource released"),
                Err(e) => tracing::warn!(
                    session = %self.session_id,
                    "Failed to release session resource: {}",
                    e
                ),
            }
        }
    }
}

impl<R: Teardown> Drop for ResourceGuard<R> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pull-based sequence of fragments over an owned resource
pub struct FragmentStream<S = SessionBoxes, R: Teardown = SessionResource> {
    boxes: S,
    reassembler: FragmentReassembler,
    guard: ResourceGuard<R>,
    span: tracing::Span,
    finished: bool,
}

impl FragmentStream {
    /// Stream over an acquired session
    pub fn from_session(session: Session, session_id: Uuid, span: tracing::Span) -> Self {
        Self::with_span(session.boxes, session.resource, session_id, span)
    }

    pub fn resource_kind(&self) -> Option<ResourceKind> {
        self.guard.get().map(SessionResource::kind)
    }
}

impl<S: BoxSource, R: Teardown> FragmentStream<S, R> {
    pub fn new(boxes: S, resource: R) -> Self {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("recording", session = %session_id);
        Self::with_span(boxes, resource, session_id, span)
    }

    fn with_span(boxes: S, resource: R, session_id: Uuid, span: tracing::Span) -> Self {
        Self {
            boxes,
            reassembler: FragmentReassembler::new(),
            guard: ResourceGuard::new(resource, session_id),
            span,
            finished: false,
        }
    }

    /// Next fragment, or None once the sequence has ended
    ///
    /// Errors from the source end the sequence; they are logged, not
    /// returned. Not cancel safe: dropping the returned future mid-box loses
    /// that box, so drop the stream instead.
    pub async fn next_fragment(&mut self) -> Option<Fragment> {
        if self.finished {
            return None;
        }
        let span = self.span.clone();
        self.pull().instrument(span).await
    }

    async fn pull(&mut self) -> Option<Fragment> {
        loop {
            match self.boxes.next_box().await {
                Ok(Some(mp4_box)) => {
                    if let Some(fragment) = self.reassembler.push(mp4_box) {
                        return Some(fragment);
                    }
                }
                Ok(None) => {
                    tracing::info!("Motion recording finished");
                    self.finish();
                    return None;
                }
                Err(e) => {
                    tracing::info!("Motion recording complete: {}", e);
                    self.finish();
                    return None;
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        let discarded = self.reassembler.discard_pending();
        if discarded > 0 {
            tracing::debug!("Dropping {} bytes that did not end on a fragment boundary", discarded);
        }
        tracing::info!("Emitted {} fragments", self.reassembler.emitted());
        let _entered = self.span.enter();
        self.guard.release();
    }

    /// Stop early and release the resource now
    pub fn close(&mut self) {
        if !self.finished {
            tracing::info!(parent: &self.span, "Recording stopped by consumer");
            self.finish();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fragments yielded so far
    pub fn fragments_emitted(&self) -> u64 {
        self.reassembler.emitted()
    }

    pub fn resource(&self) -> Option<&R> {
        self.guard.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::parser::{BoxType, Mp4Box};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingResource {
        releases: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Teardown for CountingResource {
        fn teardown(&mut self) -> io::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(io::Error::new(io::ErrorKind::Other, "already gone"))
            } else {
                Ok(())
            }
        }
    }

    /// Boxes from memory, optionally failing after the last one
    struct ScriptedBoxes {
        boxes: VecDeque<Mp4Box>,
        error_at_end: bool,
    }

    #[async_trait]
    impl BoxSource for ScriptedBoxes {
        async fn next_box(&mut self) -> io::Result<Option<Mp4Box>> {
            match self.boxes.pop_front() {
                Some(b) => Ok(Some(b)),
                None if self.error_at_end => {
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
                }
                None => Ok(None),
            }
        }
    }

    fn scripted(types: &[&[u8; 4]], error_at_end: bool) -> ScriptedBoxes {
        ScriptedBoxes {
            boxes: types
                .iter()
                .map(|t| Mp4Box::new(BoxType(**t), vec![0xAB; 4]))
                .collect(),
            error_at_end,
        }
    }

    fn stream(
        boxes: ScriptedBoxes,
        fail_teardown: bool,
    ) -> (FragmentStream<ScriptedBoxes, CountingResource>, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let resource = CountingResource {
            releases: Arc::clone(&releases),
            fail: fail_teardown,
        };
        (FragmentStream::new(boxes, resource), releases)
    }

    const RECORDING: [&[u8; 4]; 6] = [b"ftyp", b"moov", b"moof", b"mdat", b"moof", b"mdat"];

    #[tokio::test]
    async fn test_cleanup_once_on_normal_end() {
        let (mut fragments, releases) = stream(scripted(&RECORDING, false), false);

        let mut count = 0;
        while fragments.next_fragment().await.is_some() {
            count += 1;
            assert_eq!(releases.load(Ordering::SeqCst), 0);
        }

        assert_eq!(count, 3);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(fragments.next_fragment().await.is_none());
        drop(fragments);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_error_ends_sequence_quietly() {
        let (mut fragments, releases) =
            stream(scripted(&[b"ftyp", b"moov", b"moof"], true), false);

        let first = fragments.next_fragment().await.unwrap();
        assert_eq!(first.box_types, vec![BoxType::FTYP, BoxType::MOOV]);
        // The error surfaces as the end of the sequence, the pending moof is dropped
        assert!(fragments.next_fragment().await.is_none());
        assert!(fragments.is_finished());
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        drop(fragments);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_consumer_drop_after_first_fragment() {
        let (mut fragments, releases) = stream(scripted(&RECORDING, false), false);

        assert!(fragments.next_fragment().await.is_some());
        assert_eq!(fragments.fragments_emitted(), 1);
        drop(fragments);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_close_then_drop() {
        let (mut fragments, releases) = stream(scripted(&RECORDING, false), false);

        assert!(fragments.next_fragment().await.is_some());
        fragments.close();
        fragments.close();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(fragments.resource().is_none());
        assert!(fragments.next_fragment().await.is_none());

        drop(fragments);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_unpolled_stream_still_cleans_up() {
        let (fragments, releases) = stream(scripted(&RECORDING, false), false);
        drop(fragments);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_swallowed() {
        let (mut fragments, releases) = stream(scripted(&[b"moof", b"mdat"], false), true);

        assert!(fragments.next_fragment().await.is_some());
        assert!(fragments.next_fragment().await.is_none());
        drop(fragments);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trailing_boxes_are_discarded() {
        let (mut fragments, releases) =
            stream(scripted(&[b"moof", b"mdat", b"moof", b"free"], false), false);

        let fragment = fragments.next_fragment().await.unwrap();
        assert_eq!(fragment.box_types, vec![BoxType::MOOF, BoxType::MDAT]);
        assert!(fragments.next_fragment().await.is_none());
        assert_eq!(fragments.fragments_emitted(), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut guard = ResourceGuard::new(
            CountingResource {
                releases: Arc::clone(&releases),
                fail: false,
            },
            Uuid::new_v4(),
        );
        assert!(!guard.is_released());
        guard.release();
        guard.release();
        assert!(guard.is_released());
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
