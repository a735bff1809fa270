//! Watch/read session lifecycle.
//!
//! States are `Active -> Paused -> Active ...` until `Completed`, which is
//! terminal. Completion always clears the paused flag.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{NextupError, Result};
use crate::storage::SessionStore;
use crate::types::{Session, SessionFilter, SessionState, SessionSubject};

pub struct SessionTracker<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: SessionStore + ?Sized> SessionTracker<'a, S> {
    pub fn new(store: &'a S) -> Self { Self { store } }

    /// Opens an active session. Fails with `Conflict` while another session
    /// for the same subject is running.
    pub async fn start(&self, subject: &SessionSubject) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            media_type: subject.media_type,
            activity_type: subject.media_type.activity(),
            subject: subject.subject.clone(),
            title: subject.title.clone(),
            series_id: subject.series_id.clone(),
            series_title: subject.series_title.clone(),
            season_number: subject.season_number,
            episode_number: subject.episode_number,
            start_time: Utc::now(),
            end_time: None,
            total_watch_time: 0,
            is_completed: false,
            is_paused: false,
        };
        if !self.store.insert_session(&session).await? {
            debug!(subject = %session.subject, "refused second running session");
            return Err(NextupError::Conflict { subject: session.subject.key() });
        }
        info!(id = %session.id, subject = %session.subject, title = %session.title, "session started");
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Result<Session> {
        self.store.get_session(id).await?.ok_or_else(|| NextupError::not_found("session", id))
    }

    /// Unfinished session or `NotFound`.
    async fn open(&self, id: &str) -> Result<Session> {
        let session = self.get(id).await?;
        if session.is_completed {
            return Err(NextupError::not_found("active session", id));
        }
        Ok(session)
    }

    pub async fn pause(&self, id: &str) -> Result<Session> {
        let session = self.open(id).await?;
        if session.state() == SessionState::Paused {
            return Ok(session);
        }
        if !self.store.set_session_paused(id, true).await? {
            return Err(NextupError::not_found("active session", id));
        }
        info!(%id, "session paused");
        self.get(id).await
    }

    /// Fails with `Conflict` when another session for the subject started
    /// while this one was paused.
    pub async fn resume(&self, id: &str) -> Result<Session> {
        let session = self.open(id).await?;
        if session.state() == SessionState::Active {
            return Ok(session);
        }
        if !self.store.set_session_paused(id, false).await? {
            // Lost to a completion, a delete, or a newer running session
            let current = self.open(id).await?;
            return Err(NextupError::Conflict { subject: current.subject.key() });
        }
        info!(%id, "session resumed");
        self.get(id).await
    }

    /// Closes the session and adds `watch_minutes` to its total. Completing
    /// an already completed session returns it unchanged.
    pub async fn complete(&self, id: &str, watch_minutes: i64) -> Result<Session> {
        let session = self.get(id).await?;
        if session.is_completed {
            debug!(%id, "session already completed");
            return Ok(session);
        }
        self.store.complete_session(id, Utc::now(), watch_minutes.max(0)).await?;
        let done = self.get(id).await?;
        info!(%id, subject = %done.subject, total_minutes = done.total_watch_time, "session completed");
        Ok(done)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.store.delete_session(id).await? {
            return Err(NextupError::not_found("session", id));
        }
        info!(%id, "session deleted");
        Ok(())
    }

    pub async fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(filter).await?)
    }
}
