//! Shared library for the meeting scheduler Lambda.
//!
//! This crate provides the command pipeline, API clients and the prefix store.

pub mod auth;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod meet;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod secrets;
pub mod slack;
pub mod store;

pub use auth::{CredentialProvider, ServiceAccountCredentials, ServiceAccountKey};
pub use calendar::{EventService, GoogleCalendarClient};
pub use commands::{Bot, CommandNames};
pub use config::{Config, ServiceAccountSource, GOOGLE_API_SCOPES};
pub use error::{Error, Result};
pub use meet::{ArtifactConfigurator, ArtifactError, GoogleMeetClient};
pub use models::{CommandInvocation, Reply, Visibility};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use secrets::{get_secret, load_service_account_key};
pub use slack::{verify_signature, Directory, SlackClient, SlashCommand};
pub use store::PrefixStore;
