//! Automatic page view triggering.
//!
//! Mirrors a single-page app: the router reports every navigation and the
//! document reports visibility changes. A page view is recorded once per
//! distinct path on navigation, whether or not the tab is visible. Showing
//! the tab again re-checks the current path, so it never records a path
//! twice in a row.

use std::sync::{Arc, Mutex};

use super::recorder::EventRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

struct TrackerState {
    current_path: Option<String>,
    last_recorded: Option<String>,
}

pub struct PageViewTracker {
    recorder: Arc<EventRecorder>,
    state: Mutex<TrackerState>,
}

impl PageViewTracker {
    pub fn new(recorder: Arc<EventRecorder>) -> Self {
        Self {
            recorder,
            state: Mutex::new(TrackerState {
                current_path: None,
                last_recorded: None,
            }),
        }
    }

    /// The router moved to `path`. Returns whether a page view was recorded.
    pub fn navigate(&self, path: &str) -> bool {
        let pending = {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            state.current_path = Some(path.to_string());
            Self::take_pending(&mut state)
        };
        self.record(pending)
    }

    /// The tab's visibility changed. Returns whether a page view was recorded.
    ///
    /// Only a change to [`Visibility::Visible`] can record, and only when the
    /// current path has not been recorded yet.
    pub fn set_visibility(&self, visibility: Visibility) -> bool {
        if visibility != Visibility::Visible {
            return false;
        }
        let pending = {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            Self::take_pending(&mut state)
        };
        self.record(pending)
    }

    pub fn last_recorded_path(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.last_recorded.clone())
    }

    /// Claims the current path for recording if it is due.
    fn take_pending(state: &mut TrackerState) -> Option<String> {
        if state.current_path.is_none() || state.current_path == state.last_recorded {
            return None;
        }
        state.last_recorded = state.current_path.clone();
        state.current_path.clone()
    }

    fn record(&self, pending: Option<String>) -> bool {
        match pending {
            Some(path) => {
                self.recorder.track_page_view(&path, None);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AnalyticsStore, Database};
    use crate::tracking::recorder::ClientContext;
    use crate::tracking::session_id::FixedSessionId;
    use chrono::{Duration, Utc};

    fn tracker() -> (PageViewTracker, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        let recorder = EventRecorder::new(
            db.clone(),
            Arc::new(FixedSessionId("session_1_tab".into())),
            ClientContext::default(),
        );
        (PageViewTracker::new(Arc::new(recorder)), db)
    }

    fn page_views(db: &Database) -> Vec<String> {
        db.recent_page_view_events(Utc::now() - Duration::minutes(1))
            .unwrap()
            .into_iter()
            .map(|e| e.page_path)
            .collect()
    }

    #[test]
    fn test_once_per_distinct_path() {
        let (tracker, db) = tracker();
        assert!(tracker.navigate("/"));
        assert!(!tracker.navigate("/"));
        assert!(tracker.navigate("/about"));
        assert!(tracker.navigate("/"));
        assert_eq!(page_views(&db), vec!["/", "/about", "/"]);
    }

    #[test]
    fn test_reshow_does_not_duplicate() {
        let (tracker, db) = tracker();
        tracker.navigate("/trade");
        assert!(!tracker.set_visibility(Visibility::Hidden));
        assert!(!tracker.set_visibility(Visibility::Visible));
        assert_eq!(page_views(&db), vec!["/trade"]);
    }

    #[test]
    fn test_background_navigation_recorded_immediately() {
        let (tracker, db) = tracker();
        tracker.navigate("/");
        assert!(!tracker.set_visibility(Visibility::Hidden));
        assert!(tracker.navigate("/mining"));
        assert_eq!(tracker.last_recorded_path().as_deref(), Some("/mining"));

        // Showing the tab again does not record it a second time
        assert!(!tracker.set_visibility(Visibility::Visible));
        assert_eq!(page_views(&db), vec!["/", "/mining"]);
    }

    #[test]
    fn test_page_opened_in_background_is_counted() {
        let (tracker, db) = tracker();
        tracker.set_visibility(Visibility::Hidden);
        assert!(tracker.navigate("/opened-in-background"));
        assert_eq!(page_views(&db), vec!["/opened-in-background"]);
    }

    #[test]
    fn test_visible_before_any_navigation_records_nothing() {
        let (tracker, db) = tracker();
        assert!(!tracker.set_visibility(Visibility::Visible));
        assert!(page_views(&db).is_empty());
    }
}
