use crate::{error::ClientError, models::UserProfile};

/// Top-level views of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Login,
    Register,
    Dashboard,
    /// Single-patient predictor; reachable logged in or not.
    LegacyPredictor,
}

impl Route {
    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Dashboard)
    }

    /// Views a logged-in user is bounced away from.
    pub fn is_guest_only(&self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

/// Where a request for `requested` actually lands.
pub fn resolve_route(requested: Route, logged_in: bool) -> Route {
    if requested.requires_auth() && !logged_in {
        Route::Login
    } else if requested.is_guest_only() && logged_in {
        Route::Dashboard
    } else {
        requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
}

/// Banner shown after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

/// Everything the front end shows besides fetched data.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    user: Option<UserProfile>,
    route: Route,
    loading: bool,
    uploading: bool,
    clearing: bool,
    message: Option<StatusMessage>,
}

impl AppState {
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn is_clearing(&self) -> bool {
        self.clearing
    }

    pub fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_uploading(&mut self, uploading: bool) {
        self.uploading = uploading;
    }

    pub fn set_clearing(&mut self, clearing: bool) {
        self.clearing = clearing;
    }

    pub fn set_message(&mut self, message: StatusMessage) {
        self.message = Some(message);
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    pub fn sign_in(&mut self, user: UserProfile) {
        self.user = Some(user);
        self.route = Route::Dashboard;
    }

    /// Drop the user and every in-flight flag; lands on the login view.
    pub fn sign_out(&mut self) {
        self.user = None;
        self.loading = false;
        self.uploading = false;
        self.clearing = false;
        self.route = Route::Login;
    }

    /// Move to `requested`, subject to the auth rules. Returns where we
    /// ended up.
    pub fn navigate(&mut self, requested: Route) -> Route {
        self.route = resolve_route(requested, self.is_logged_in());
        self.route
    }

    /// Record `err` as an error banner, using `fallback` when the backend
    /// sent no detail.
    pub fn report_error(&mut self, err: &ClientError, fallback: &str) {
        self.set_message(StatusMessage::error(err.user_message(fallback)));
    }
}
