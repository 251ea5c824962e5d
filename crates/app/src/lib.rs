//! Chat and drafting client core: turn reconciliation, the single app store, history paging and
//! the session and draft controllers that drive the backend.

pub mod draft;
pub mod error;
pub mod pager;
pub mod reconcile;
pub mod session;
pub mod settings;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use docdraft_api::{Collaborator, HttpCollaborator, HttpConfig};
use snafu::ResultExt;

pub use draft::DraftEditor;
pub use error::{AppError, AppResult, DraftError, DraftResult, SessionError, SessionResult};
pub use pager::{HISTORY_PAGE_SIZE, HistoryPager};
pub use reconcile::{NO_CONTENT_ERROR_TEXT, TurnDisplay, TurnEnd, TurnError, TurnReconciler};
pub use session::{
    ChatSession, GENERATE_REJECTED_TEXT, RETRY_HINT_TEXT, RenameOutcome, SAVE_FAILED_TEXT,
    SessionOptions, TurnSummary,
};
pub use settings::{ClientSettings, SettingsError, SettingsResult, SettingsStore};
pub use state::{Action, AppState, AppStore, ChatMode, ErrorBanner, HistoryLoadingState};

use error::CollaboratorSnafu;

/// Wires the store, session and draft editor around one collaborator.
pub struct App {
    settings: SettingsStore,
    store: Arc<AppStore>,
    session: ChatSession,
    drafts: DraftEditor,
}

impl App {
    /// Builds the HTTP collaborator from `settings` and runs the startup checks.
    pub async fn start(settings: SettingsStore) -> AppResult<Self> {
        let current = settings.settings();
        telemetry::init_tracing(&current.log_filter);

        let config =
            HttpConfig::new(current.base_url.clone()).with_request_timeout(current.request_timeout());
        let collaborator = HttpCollaborator::new(config).context(CollaboratorSnafu {
            stage: "build-http-collaborator",
        })?;

        tracing::info!(base_url = %current.base_url, "starting client");
        let app = Self::with_collaborator(settings, Arc::new(collaborator));
        app.bootstrap().await;
        Ok(app)
    }

    /// Builds the app around an existing collaborator without contacting it.
    pub fn with_collaborator(settings: SettingsStore, collaborator: Arc<dyn Collaborator>) -> Self {
        let current = settings.settings();
        let options = SessionOptions {
            history_enabled: current.history_enabled,
            auth_enabled: current.auth_enabled,
        };
        let store = Arc::new(AppStore::default());

        Self {
            session: ChatSession::new(Arc::clone(&collaborator), Arc::clone(&store), options),
            drafts: DraftEditor::new(collaborator, Arc::clone(&store)),
            settings,
            store,
        }
    }

    /// Probes history health and the signed-in user, then loads the first history page.
    ///
    /// Failures are logged and reflected in the store; startup continues without history.
    pub async fn bootstrap(&self) {
        let (health, auth_required) = futures::future::join(
            self.session.refresh_history_health(),
            self.session.load_user_info(),
        )
        .await;

        if health.is_working()
            && let Err(error) = self.session.load_more_history().await
        {
            tracing::warn!(error = %error, "failed to load the first history page");
        }

        tracing::info!(health = ?health, auth_required, "client ready");
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn drafts(&self) -> &DraftEditor {
        &self.drafts
    }

    /// Cancels any in-flight turn.
    pub fn shutdown(self) {
        let stopped = self.session.stop_generating();
        tracing::info!(stopped, "client shut down");
    }
}
