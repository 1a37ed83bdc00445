//! Page-level capabilities handed to the session layer at construction.

use parking_lot::Mutex;

/// Location of the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub hostname: String,
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
}

impl PageContext {
    pub fn new(hostname: impl Into<String>, pathname: impl Into<String>) -> Self {
        Self { hostname: hostname.into(), pathname: pathname.into(), search: String::new() }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn is_path(&self, path: &str) -> bool {
        let want = path.trim_end_matches('/');
        self.pathname == path || self.pathname.trim_end_matches('/') == want
    }
}

pub trait Navigator: Send + Sync {
    fn assign(&self, url: &str);
}

/// The identity widget's controls that the session layer uses.
pub trait CredentialSource: Send + Sync {
    fn disable_auto_select(&self);
}

/// Navigator that only records destinations.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self { Self::default() }

    pub fn visits(&self) -> Vec<String> { self.visits.lock().clone() }

    pub fn last(&self) -> Option<String> { self.visits.lock().last().cloned() }
}

impl Navigator for RecordingNavigator {
    fn assign(&self, url: &str) {
        self.visits.lock().push(url.to_string());
    }
}

pub fn person_url(base: &str, id: &str) -> String {
    format!("{}{}", base, urlencoding::encode(id))
}

/// `<login_path>?next=<encoded next>`; `next` is the path plus query of the page being left.
pub fn login_redirect_url(login_path: &str, next: &str) -> String {
    if next.is_empty() {
        return login_path.to_string();
    }
    let sep = if login_path.contains('?') { '&' } else { '?' };
    format!("{}{}next={}", login_path, sep, urlencoding::encode(next))
}
