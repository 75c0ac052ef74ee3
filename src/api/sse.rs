//! Server-sent event binding for job subscriptions
//!
//! Each [`Event`] becomes one named SSE message:
//!
//! | Event      | SSE name    | data                     |
//! |------------|-------------|--------------------------|
//! | `Log`      | `message`   | the log line             |
//! | `NewItem`  | `new_video` | the item title           |
//! | `Progress` | `progress`  | `{"progress": <0..100>}` |
//! | `Error`    | `job_error` | the error message        |
//! | `Finished` | `finished`  | empty                    |
//!
//! Progress data also carries `speed` and `eta` when the tool reported them.
//!
//! The stream ends after the terminal event. Dropping the stream (client
//! disconnect) detaches the subscription and leaves the job running.

use crate::bus::Subscription;
use crate::types::Event;
use axum::response::sse::Event as SseEvent;
use futures::stream::{BoxStream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Stream type served by the events endpoint
pub type EventStream = BoxStream<'static, Result<SseEvent, Infallible>>;

/// Convert a job event into its SSE message
pub fn to_sse(event: &Event) -> SseEvent {
    let data = match event {
        Event::Log { line } => single_line(line),
        Event::NewItem { title } => single_line(title),
        Event::Progress { percent, speed, eta } => {
            let rounded = (f64::from(*percent) * 10.0).round() / 10.0;
            let mut data = serde_json::json!({ "progress": rounded });
            if let Some(speed) = speed {
                data["speed"] = speed.as_str().into();
            }
            if let Some(eta) = eta {
                data["eta"] = eta.as_str().into();
            }
            data.to_string()
        }
        Event::Error { message, .. } => single_line(message),
        Event::Finished => String::new(),
    };
    SseEvent::default().event(event.name()).data(data)
}

/// SSE data lines cannot carry carriage returns
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Stream every event of a subscription, ending after the terminal one
pub fn job_stream(subscription: Subscription) -> EventStream {
    subscription
        .into_stream()
        .map(|event| Ok(to_sse(&event)))
        .boxed()
}

/// Stream that sends nothing and ends after `idle_timeout`
///
/// Served for job ids that are not (or no longer) registered.
pub fn idle_stream(idle_timeout: Duration) -> EventStream {
    futures::stream::once(tokio::time::sleep(idle_timeout))
        .filter_map(|_| futures::future::ready(None))
        .boxed()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::types::ErrorKind;

    /// Render an SSE event the way it goes over the wire
    fn wire(event: SseEvent) -> String {
        use axum::response::IntoResponse;
        use axum::response::sse::Sse;

        let stream = futures::stream::iter(vec![Ok::<_, Infallible>(event)]);
        let response = Sse::new(stream).into_response();
        let body = tokio_test::block_on(axum::body::to_bytes(response.into_body(), usize::MAX))
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn test_event_names_and_payloads() {
        assert_eq!(
            wire(to_sse(&Event::log("Starting download..."))),
            "event: message\ndata: Starting download...\n\n"
        );
        assert_eq!(
            wire(to_sse(&Event::NewItem {
                title: "Intro".into()
            })),
            "event: new_video\ndata: Intro\n\n"
        );
        assert_eq!(
            wire(to_sse(&Event::progress(42.25))),
            "event: progress\ndata: {\"progress\":42.3}\n\n"
        );
        let detailed = wire(to_sse(&Event::Progress {
            percent: 7.0,
            speed: Some("1.00MiB/s".into()),
            eta: Some("00:05".into()),
        }));
        let data = detailed
            .strip_prefix("event: progress\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"progress": 7.0, "speed": "1.00MiB/s", "eta": "00:05"})
        );
        assert_eq!(
            wire(to_sse(&Event::Error {
                message: "bad\r\nthing".into(),
                kind: ErrorKind::Extraction
            })),
            "event: job_error\ndata: bad  thing\n\n"
        );
        assert!(wire(to_sse(&Event::Finished)).starts_with("event: finished\n"));
    }

    #[tokio::test]
    async fn test_job_stream_ends_after_terminal_event() {
        let bus = EventBus::new(16, 16);
        bus.publish(Event::log("a"));
        bus.publish(Event::NewItem { title: "t".into() });
        bus.publish(Event::Finished);

        let items: Vec<_> = job_stream(bus.subscribe()).collect().await;
        assert_eq!(items.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_closes_after_timeout() {
        let started = tokio::time::Instant::now();
        let items: Vec<_> = idle_stream(Duration::from_secs(30)).collect().await;
        assert!(items.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
