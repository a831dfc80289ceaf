use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

/// The user name in clear text and its sanitized (hashed) form, used to
/// namespace per-user daemon-store paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    Started,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    LoggedOut,
}

/// The platform signal stream collaborator (§6): yields `"started"` /
/// `"stopped"` transitions and, on demand, the current primary user.
#[async_trait]
pub trait SessionStateSource: Send {
    async fn next_transition(&mut self) -> Option<SessionTransition>;
    async fn primary_user(&self) -> Option<User>;
}

/// Tracks the single primary user and fans out login/logout events to
/// subscribers, grounded on `SessionStateManager`'s observer-list behavior:
/// only one primary user at a time, and a user switch always emits a logout
/// before the next login.
pub struct SessionStateManager {
    primary_user: Mutex<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStateManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            primary_user: Mutex::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn primary_user(&self) -> Option<User> {
        self.primary_user.lock().await.clone()
    }

    /// Drains transitions from `source` until it ends (the platform signal
    /// stream closed), refreshing the primary user on each one.
    pub async fn run(&self, mut source: impl SessionStateSource) {
        while let Some(transition) = source.next_transition().await {
            match transition {
                SessionTransition::Started => {
                    let user = source.primary_user().await;
                    self.refresh_primary_user(user).await;
                }
                SessionTransition::Stopped => {
                    self.refresh_primary_user(None).await;
                }
            }
        }
    }

    async fn refresh_primary_user(&self, user: Option<User>) {
        let mut primary = self.primary_user.lock().await;
        if *primary == user {
            return;
        }
        if primary.is_some() {
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
        if let Some(user) = user.clone() {
            let _ = self.events.send(SessionEvent::LoggedIn(user));
        }
        *primary = user;
    }
}

impl Default for SessionStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedSource {
        steps: VecDeque<(SessionTransition, Option<User>)>,
        pending_user: Option<User>,
    }

    #[async_trait]
    impl SessionStateSource for ScriptedSource {
        async fn next_transition(&mut self) -> Option<SessionTransition> {
            let (transition, user) = self.steps.pop_front()?;
            self.pending_user = user;
            Some(transition)
        }

        async fn primary_user(&self) -> Option<User> {
            self.pending_user.clone()
        }
    }

    #[tokio::test]
    async fn user_switch_emits_logout_before_login() {
        let manager = SessionStateManager::new();
        let mut events = manager.subscribe();

        let alice = User {
            name: "alice".into(),
            hash: "h-alice".into(),
        };
        let bob = User {
            name: "bob".into(),
            hash: "h-bob".into(),
        };

        manager.refresh_primary_user(Some(alice.clone())).await;
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn(alice));

        manager.refresh_primary_user(Some(bob.clone())).await;
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn(bob.clone()));

        assert_eq!(manager.primary_user().await, Some(bob));
    }

    #[tokio::test]
    async fn logout_with_no_prior_user_emits_nothing() {
        let manager = SessionStateManager::new();
        let mut events = manager.subscribe();
        manager.refresh_primary_user(None).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn refreshing_to_the_same_user_is_a_no_op() {
        let manager = SessionStateManager::new();
        let mut events = manager.subscribe();
        let alice = User {
            name: "alice".into(),
            hash: "h-alice".into(),
        };
        manager.refresh_primary_user(Some(alice.clone())).await;
        let _ = events.recv().await.unwrap();
        manager.refresh_primary_user(Some(alice)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_drives_events_from_a_scripted_source() {
        let manager = SessionStateManager::new();
        let mut events = manager.subscribe();
        let alice = User {
            name: "alice".into(),
            hash: "h-alice".into(),
        };

        let source = ScriptedSource {
            steps: VecDeque::from([
                (SessionTransition::Started, Some(alice.clone())),
                (SessionTransition::Stopped, None),
            ]),
            pending_user: None,
        };
        manager.run(source).await;

        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn(alice));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
        assert_eq!(manager.primary_user().await, None);
    }
}
