use docdraft_api::HistoryBackend;
use snafu::ResultExt;

use super::error::{RemoteSnafu, SessionResult};
use super::state::{Action, AppStore, HistoryLoadingState};

/// Number of conversations the history service returns per page.
pub const HISTORY_PAGE_SIZE: usize = 25;

/// Offset cursor over the remote history list.
///
/// The offset is the number of conversations the store lists, so local deletes and upserts
/// move it with the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPager {
    last_offset: Option<usize>,
    exhausted: bool,
}

impl HistoryPager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the most recent request, if any page was requested.
    pub fn last_offset(&self) -> Option<usize> {
        self.last_offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fetches the next page and merges it into the history list.
    ///
    /// Returns how many conversations were new; entries already listed are skipped.
    pub async fn load_more<B>(&mut self, backend: &B, store: &AppStore) -> SessionResult<usize>
    where
        B: HistoryBackend + ?Sized,
    {
        if self.exhausted {
            return Ok(0);
        }

        let offset = store.snapshot().chat_history.len();
        let first_page = offset == 0;
        self.last_offset = Some(offset);
        if first_page {
            store.dispatch(Action::SetHistoryLoading(HistoryLoadingState::Loading));
        }

        let page = match backend.list_history(offset).await {
            Ok(page) => page,
            Err(error) => {
                tracing::warn!(offset, error = %error, "failed to load history page");
                if first_page {
                    store.dispatch(Action::SetHistoryLoading(HistoryLoadingState::Fail));
                }
                return Err(error).context(RemoteSnafu {
                    stage: "history-load-more",
                    operation: "load history",
                });
            }
        };

        let fetched = page.len();
        self.exhausted = fetched < HISTORY_PAGE_SIZE;

        let after = store.dispatch(Action::AppendHistoryPage(page)).chat_history.len();
        if first_page {
            store.dispatch(Action::SetHistoryLoading(HistoryLoadingState::Success));
        }

        let appended = after.saturating_sub(offset);
        tracing::debug!(
            fetched,
            appended,
            offset,
            exhausted = self.exhausted,
            "merged history page"
        );
        Ok(appended)
    }
}
