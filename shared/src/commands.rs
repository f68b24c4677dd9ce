//! Slash-command dispatch.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::{CommandInvocation, Reply};
use crate::scheduler::Scheduler;
use crate::slack::Directory;
use crate::store::PrefixStore;
use crate::{Config, Error, Result};

const PERMISSION_DENIED: &str =
    "Only workspace admins, owners, or the channel's creator can set the meeting title prefix.";
const PERMISSION_CHECK_FAILED: &str = "An error occurred while checking your permissions.";

/// Names the two slash commands are registered under.
#[derive(Debug, Clone)]
pub struct CommandNames {
    pub set_prefix: String,
    pub schedule: String,
}

impl From<&Config> for CommandNames {
    fn from(config: &Config) -> Self {
        Self {
            set_prefix: config.set_prefix_command.clone(),
            schedule: config.schedule_command.clone(),
        }
    }
}

/// Routes an invocation to its handler and always produces exactly one reply.
pub struct Bot {
    names: CommandNames,
    directory: Arc<dyn Directory>,
    store: Arc<PrefixStore>,
    scheduler: Scheduler,
}

impl Bot {
    pub fn new(
        names: CommandNames,
        directory: Arc<dyn Directory>,
        store: Arc<PrefixStore>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            names,
            directory,
            store,
            scheduler,
        }
    }

    pub async fn handle(&self, invocation: &CommandInvocation, now: DateTime<Utc>) -> Reply {
        info!(
            "Received {} from {} in {}",
            invocation.command, invocation.user_id, invocation.channel_id
        );

        if invocation.command == self.names.set_prefix {
            self.set_prefix(invocation).await.unwrap_or_else(|e| {
                warn!("{} failed: {}", invocation.command, e);
                Reply::private(e.user_message())
            })
        } else if invocation.command == self.names.schedule {
            self.scheduler.schedule_meeting(invocation, now).await
        } else {
            warn!("Unknown command: {}", invocation.command);
            Reply::private(format!("Unknown command: {}", invocation.command))
        }
    }

    async fn set_prefix(&self, invocation: &CommandInvocation) -> Result<Reply> {
        self.authorize(invocation).await?;

        let channel = &invocation.channel_id;
        let reply = match self.store.set_prefix(channel, invocation.text.trim()).await? {
            Some(record) => Reply::public(format!(
                "Meeting title prefix for <#{}> set to `{}`.",
                channel, record.prefix
            )),
            None => Reply::public(format!("Meeting title prefix for <#{}> cleared.", channel)),
        };
        Ok(reply)
    }

    /// Admins, owners and the channel creator may change the prefix.
    async fn authorize(&self, invocation: &CommandInvocation) -> Result<()> {
        let user = self.directory.user(&invocation.user_id).await.map_err(|e| {
            error!("Permission check failed for {}: {}", invocation.user_id, e);
            Error::PermissionDenied(PERMISSION_CHECK_FAILED.to_string())
        })?;

        if user.is_admin || user.is_owner {
            return Ok(());
        }

        match self.directory.channel_creator(&invocation.channel_id).await {
            Ok(Some(creator)) if creator == invocation.user_id => return Ok(()),
            Ok(_) => {}
            Err(e) => warn!(
                "Could not look up creator of {}: {}",
                invocation.channel_id, e
            ),
        }

        info!(
            "{} may not set the prefix for {}",
            invocation.user_id, invocation.channel_id
        );
        Err(Error::PermissionDenied(PERMISSION_DENIED.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialProvider;
    use crate::calendar::EventService;
    use crate::meet::{ArtifactConfigurator, ArtifactError};
    use crate::models::{AccessToken, NewEvent, ScheduledMeeting, Visibility};
    use crate::scheduler::SchedulerSettings;
    use crate::slack::SlackUser;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FakeDirectory {
        admin: bool,
        creator: Result<Option<String>>,
        user_lookup_fails: bool,
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn user(&self, user_id: &str) -> Result<SlackUser> {
            if self.user_lookup_fails {
                return Err(Error::Slack("ratelimited".to_string()));
            }
            Ok(SlackUser {
                id: user_id.to_string(),
                is_admin: self.admin,
                ..Default::default()
            })
        }

        async fn channel_creator(&self, _: &str) -> Result<Option<String>> {
            match &self.creator {
                Ok(creator) => Ok(creator.clone()),
                Err(_) => Err(Error::Slack("channel_not_found".to_string())),
            }
        }
    }

    struct Unused;

    #[async_trait]
    impl CredentialProvider for Unused {
        async fn access_token(&self, _: &str) -> Result<AccessToken> {
            Err(Error::Credential("unused".to_string()))
        }
    }

    #[async_trait]
    impl EventService for Unused {
        async fn create_event(&self, _: &AccessToken, _: &NewEvent) -> Result<ScheduledMeeting> {
            Err(Error::EventCreationFailed("unused".to_string()))
        }
    }

    #[async_trait]
    impl ArtifactConfigurator for Unused {
        async fn resolve_space(&self, _: &AccessToken, _: &str) -> std::result::Result<String, ArtifactError> {
            Err(ArtifactError::MissingConferenceId)
        }

        async fn enable_artifacts(&self, _: &AccessToken, _: &str) -> std::result::Result<(), ArtifactError> {
            Err(ArtifactError::MissingConferenceId)
        }
    }

    fn bot(dir: &TempDir, directory: FakeDirectory) -> (Bot, Arc<PrefixStore>) {
        let store = Arc::new(PrefixStore::open(dir.path(), std::time::Duration::from_secs(3)).unwrap());
        let directory: Arc<dyn Directory> = Arc::new(directory);
        let scheduler = Scheduler::new(
            SchedulerSettings {
                workspace_domain: "org.com".to_string(),
                display_timezone: chrono_tz::Asia::Tokyo,
            },
            Arc::clone(&directory),
            Arc::clone(&store),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
        );
        let names = CommandNames {
            set_prefix: "/reg-mtg-prefix".to_string(),
            schedule: "/mtg".to_string(),
        };
        (Bot::new(names, directory, Arc::clone(&store), scheduler), store)
    }

    fn member() -> FakeDirectory {
        FakeDirectory {
            admin: false,
            creator: Ok(Some("UCREATOR".to_string())),
            user_lookup_fails: false,
        }
    }

    fn invocation(command: &str, user: &str, text: &str) -> CommandInvocation {
        CommandInvocation {
            command: command.to_string(),
            channel_id: "C1".to_string(),
            user_id: user.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_admin_sets_prefix() {
        let dir = TempDir::new().unwrap();
        let (bot, store) = bot(&dir, FakeDirectory { admin: true, ..member() });

        let reply = bot
            .handle(&invocation("/reg-mtg-prefix", "UADMIN", "[Sales] "), Utc::now())
            .await;

        assert_eq!(reply.visibility, Visibility::InChannel);
        assert!(reply.text.contains("<#C1>"));
        assert!(reply.text.contains("`[Sales]`"));
        assert_eq!(store.get_prefix("C1").await.unwrap(), "[Sales]");
    }

    #[tokio::test]
    async fn test_channel_creator_may_set_prefix() {
        let dir = TempDir::new().unwrap();
        let (bot, store) = bot(&dir, member());

        let reply = bot
            .handle(&invocation("/reg-mtg-prefix", "UCREATOR", "Team-"), Utc::now())
            .await;

        assert_eq!(reply.visibility, Visibility::InChannel);
        assert_eq!(store.get_prefix("C1").await.unwrap(), "Team-");
    }

    #[tokio::test]
    async fn test_member_is_denied_and_store_untouched() {
        let dir = TempDir::new().unwrap();
        let (bot, store) = bot(&dir, member());

        let reply = bot
            .handle(&invocation("/reg-mtg-prefix", "UMEMBER", "x"), Utc::now())
            .await;

        assert_eq!(reply, Reply::private(PERMISSION_DENIED));
        assert_eq!(store.get_prefix("C1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_creator_lookup_failure_denies() {
        let dir = TempDir::new().unwrap();
        let (bot, _) = bot(
            &dir,
            FakeDirectory {
                creator: Err(Error::Slack("channel_not_found".to_string())),
                ..member()
            },
        );

        let reply = bot
            .handle(&invocation("/reg-mtg-prefix", "UCREATOR", "x"), Utc::now())
            .await;

        assert_eq!(reply, Reply::private(PERMISSION_DENIED));
    }

    #[tokio::test]
    async fn test_user_lookup_failure_is_private() {
        let dir = TempDir::new().unwrap();
        let (bot, _) = bot(
            &dir,
            FakeDirectory {
                user_lookup_fails: true,
                ..member()
            },
        );

        let reply = bot
            .handle(&invocation("/reg-mtg-prefix", "UCREATOR", "x"), Utc::now())
            .await;

        assert_eq!(reply, Reply::private(PERMISSION_CHECK_FAILED));
    }

    #[tokio::test]
    async fn test_empty_text_clears_prefix() {
        let dir = TempDir::new().unwrap();
        let (bot, store) = bot(&dir, FakeDirectory { admin: true, ..member() });
        store.set_prefix("C1", "old-").await.unwrap();

        let reply = bot
            .handle(&invocation("/reg-mtg-prefix", "UADMIN", "   "), Utc::now())
            .await;

        assert_eq!(reply.visibility, Visibility::InChannel);
        assert!(reply.text.contains("cleared"));
        assert_eq!(store.get_prefix("C1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_schedule_command_is_routed() {
        let dir = TempDir::new().unwrap();
        let (bot, _) = bot(&dir, member());

        let reply = bot.handle(&invocation("/mtg", "UADMIN", "nope"), Utc::now()).await;

        assert_eq!(reply.visibility, Visibility::Ephemeral);
        assert_eq!(reply.text, crate::parser::USAGE);
    }

    #[tokio::test]
    async fn test_unknown_command_is_private() {
        let dir = TempDir::new().unwrap();
        let (bot, _) = bot(&dir, member());

        let reply = bot.handle(&invocation("/other", "U1", ""), Utc::now()).await;

        assert_eq!(reply.visibility, Visibility::Ephemeral);
        assert!(reply.text.contains("/other"));
    }
}
