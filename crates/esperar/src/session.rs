//! Scoped page sessions.
//!
//! A [`Session`] is acquired once per suite run, passed explicitly to every
//! scenario, and released when the run ends, whether it passed or failed.

use crate::condition::BoxFuture;
use crate::config::EsperarConfig;
use crate::page::PageQuery;
use crate::result::EsperarResult;
use crate::wait::Poller;
use tracing::{info, warn};
use uuid::Uuid;

/// A page plus the wait budget scenarios run with
#[derive(Debug)]
pub struct Session<P: PageQuery> {
    id: Uuid,
    page: P,
    config: EsperarConfig,
    poller: Poller,
    released: bool,
}

impl<P: PageQuery> Session<P> {
    /// Validate `config` and take ownership of `page`
    pub fn open(page: P, config: EsperarConfig) -> EsperarResult<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        info!(session = %id, timeout_ms = config.wait.timeout_ms, "session opened");
        Ok(Self {
            id,
            poller: config.poller(),
            page,
            config,
            released: false,
        })
    }

    /// Session identifier, for correlating logs
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The page under test
    #[must_use]
    pub const fn page(&self) -> &P {
        &self.page
    }

    /// Poller built from the session configuration
    #[must_use]
    pub const fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &EsperarConfig {
        &self.config
    }

    /// Close the page
    pub async fn release(mut self) -> EsperarResult<()> {
        self.released = true;
        self.page.close().await?;
        info!(session = %self.id, "session released");
        Ok(())
    }
}

impl<P: PageQuery> Drop for Session<P> {
    fn drop(&mut self) {
        if !self.released {
            warn!(session = %self.id, "session dropped without release");
        }
    }
}

/// Run `scenario` in a fresh session, releasing it afterwards.
///
/// The scenario's error takes precedence over a release error.
pub async fn with_session<P, T, F>(page: P, config: EsperarConfig, scenario: F) -> EsperarResult<T>
where
    P: PageQuery,
    F: for<'s> FnOnce(&'s Session<P>) -> BoxFuture<'s, EsperarResult<T>>,
{
    let session = Session::open(page, config)?;
    let id = session.id();
    let result = scenario(&session).await;
    let released = session.release().await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), released) => {
            if let Err(release_err) = released {
                warn!(session = %id, error = %release_err, "release failed after scenario error");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::condition::{present, texts_equal};
    use crate::mock::{MockNode, MockPage};
    use crate::result::EsperarError;
    use crate::selector::Selector;

    #[tokio::test]
    async fn test_release_closes_page() {
        let page = MockPage::new();
        let session = Session::open(page.clone(), EsperarConfig::default()).unwrap();
        assert_eq!(session.poller().options().timeout_ms, 10_000);
        session.release().await.unwrap();
        assert!(page.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EsperarConfig::default();
        config.wait.timeout_ms = 0;
        assert!(Session::open(MockPage::new(), config).is_err());
    }

    #[tokio::test]
    async fn test_with_session_success() {
        let page = MockPage::new();
        page.insert(Selector::tag("th"), MockNode::new().text("Name"));
        let texts = with_session(page.clone(), EsperarConfig::default(), |s| {
            Box::pin(async move {
                s.poller()
                    .until(s.page(), &texts_equal(Selector::tag("th"), ["Name"]))
                    .await
            })
        })
        .await
        .unwrap();
        assert_eq!(texts, ["Name"]);
        assert!(page.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_session_releases_on_failure() {
        let page = MockPage::new();
        let err = with_session(page.clone(), EsperarConfig::default(), |s| {
            Box::pin(async move {
                s.poller().until(s.page(), &present(".data-grid-container")).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EsperarError::Timeout { .. }));
        assert!(page.is_closed());
    }
}
