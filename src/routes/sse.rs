//! SSE progress endpoint (§6's **[ADD]**): `GET /sync-progress/{sessionId}`.
//! Bridges `sync::ProgressRegistry`'s `mpsc::Receiver` to an actix streaming
//! body, merged with a 15s heartbeat tick via `tokio_stream`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use actix_web::web;
use actix_web::HttpResponse;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::services::Services;
use crate::sync::ProgressRegistry;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Frame = Result<web::Bytes, actix_web::Error>;

/// Wraps the merged progress/heartbeat stream so the session is
/// unregistered the moment the client disconnects and actix drops the
/// streaming body, not just when the channel closes on the sender side.
struct SyncProgressStream {
    inner: Pin<Box<dyn Stream<Item = Frame> + Send>>,
    registry: Arc<ProgressRegistry>,
    session_id: Uuid,
}

impl Stream for SyncProgressStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for SyncProgressStream {
    fn drop(&mut self) {
        self.registry.unregister(self.session_id);
    }
}

pub async fn sync_progress(path: web::Path<Uuid>, services: web::Data<Services>) -> HttpResponse {
    let session_id = path.into_inner();
    let rx = services.sync_progress.register(session_id);

    let progress_frames = ReceiverStream::new(rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(web::Bytes::from(format!("data: {json}\n\n")))
    });
    let heartbeat_frames = IntervalStream::new(tokio::time::interval(HEARTBEAT_INTERVAL))
        .map(|_| Ok(web::Bytes::from_static(b": heartbeat\n\n")));

    let stream = SyncProgressStream {
        inner: Box::pin(progress_frames.merge(heartbeat_frames)),
        registry: services.sync_progress.clone(),
        session_id,
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream)
}
