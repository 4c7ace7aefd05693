use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

/// State object the runtime stores on the history entries it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    pub spa: bool,
}

impl HistoryState {
    pub const SPA: HistoryState = HistoryState { spa: true };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: Url,
    pub state: Option<HistoryState>,
}

impl HistoryEntry {
    pub fn is_spa(&self) -> bool {
        self.state.is_some_and(|state| state.spa)
    }
}

/// Fired when the session history moves to another entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopStateEvent {
    pub state: Option<HistoryState>,
}

/// Location and session history of the page hosting the runtime.
///
/// Full page loads are not performed here; they are queued for the embedder,
/// which drains them with [`Window::take_location_changes`].
#[derive(Debug, Clone)]
pub struct Window {
    entries: Vec<HistoryEntry>,
    index: usize,
    location_changes: Vec<Url>,
}

impl Window {
    pub fn new(location: Url) -> Self {
        Self {
            entries: vec![HistoryEntry {
                url: location,
                state: None,
            }],
            index: 0,
            location_changes: Vec::new(),
        }
    }

    pub fn location(&self) -> &Url {
        &self.current_entry().url
    }

    pub fn current_entry(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn history_len(&self) -> usize {
        self.entries.len()
    }

    /// Resolves `url` against the current location.
    pub fn resolve(&self, url: &str) -> Result<Url, ParseError> {
        self.location().join(url)
    }

    /// Adds an entry after the current one, discarding any forward entries.
    pub fn push_state(&mut self, state: HistoryState, url: &str) -> Result<(), ParseError> {
        let url = self.resolve(url)?;
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry {
            url,
            state: Some(state),
        });
        self.index = self.entries.len() - 1;
        Ok(())
    }

    pub fn replace_state(&mut self, state: HistoryState, url: Option<&str>) -> Result<(), ParseError> {
        let url = match url {
            Some(url) => self.resolve(url)?,
            None => self.location().clone(),
        };
        self.entries[self.index] = HistoryEntry {
            url,
            state: Some(state),
        };
        Ok(())
    }

    /// Moves `delta` entries through history. Returns `None` when the move
    /// would leave the history bounds.
    pub fn go(&mut self, delta: isize) -> Option<PopStateEvent> {
        let target = self.index.checked_add_signed(delta)?;
        if target >= self.entries.len() || delta == 0 {
            return None;
        }
        self.index = target;
        Some(PopStateEvent {
            state: self.current_entry().state,
        })
    }

    pub fn back(&mut self) -> Option<PopStateEvent> {
        self.go(-1)
    }

    pub fn forward(&mut self) -> Option<PopStateEvent> {
        self.go(1)
    }

    /// Requests a full page load of `url`.
    pub fn assign(&mut self, url: &str) -> Result<(), ParseError> {
        let url = self.resolve(url)?;
        self.location_changes.push(url);
        Ok(())
    }

    pub fn take_location_changes(&mut self) -> Vec<Url> {
        std::mem::take(&mut self.location_changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window::new(Url::parse("https://example.test/app/").unwrap())
    }

    #[test]
    fn push_truncates_forward_entries() {
        let mut window = window();
        window.push_state(HistoryState::SPA, "a").unwrap();
        window.push_state(HistoryState::SPA, "b").unwrap();
        assert!(window.back().is_some());
        window.push_state(HistoryState::SPA, "/c").unwrap();
        let urls: Vec<&str> = window.entries().iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.test/app/",
                "https://example.test/app/a",
                "https://example.test/c"
            ]
        );
        assert!(window.forward().is_none());
    }

    #[test]
    fn pop_reports_entry_state() {
        let mut window = window();
        window.replace_state(HistoryState::SPA, None).unwrap();
        window.push_state(HistoryState::SPA, "next").unwrap();
        let event = window.back().unwrap();
        assert_eq!(event.state, Some(HistoryState::SPA));
        assert_eq!(window.location().as_str(), "https://example.test/app/");
        assert!(window.back().is_none());
    }

    #[test]
    fn assign_queues_full_load() {
        let mut window = window();
        window.assign("/login").unwrap();
        assert_eq!(
            window.take_location_changes(),
            vec![Url::parse("https://example.test/login").unwrap()]
        );
        assert!(window.take_location_changes().is_empty());
        assert_eq!(window.history_len(), 1);
    }
}
