//! Custom test assertions for integration tests

use std::time::Duration;
use udown::{Event, JobId, JobManager};

/// Collect every event of a job until its stream ends
///
/// Panics if the job does not reach a terminal event within `timeout`.
pub async fn collect_events(manager: &JobManager, id: JobId, timeout: Duration) -> Vec<Event> {
    let mut subscription = manager.subscribe(id).await.unwrap();
    let mut events = Vec::new();

    let drain = async {
        while let Some(event) = subscription.recv().await {
            events.push(event);
        }
    };
    tokio::time::timeout(timeout, drain)
        .await
        .expect("job did not reach a terminal event in time");
    events
}

/// Exactly one terminal event, and it is the last one
pub fn assert_single_terminal(events: &[Event]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals.len(), 1, "expected one terminal event in {:?}", events);
    assert_eq!(terminals[0], events.len() - 1, "events after the terminal event");
}

/// Every `Progress` event is preceded by some `NewItem`
pub fn assert_items_precede_progress(events: &[Event]) {
    let mut seen_item = false;
    for event in events {
        match event {
            Event::NewItem { .. } => seen_item = true,
            Event::Progress { .. } => assert!(seen_item, "progress before any item in {:?}", events),
            _ => {}
        }
    }
}

/// Titles of the `NewItem` events, in order
pub fn item_titles(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::NewItem { title } => Some(title.clone()),
            _ => None,
        })
        .collect()
}
