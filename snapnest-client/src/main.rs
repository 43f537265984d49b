use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use snapnest_backend::{BackendClient, BackendConfig, BackendError, HttpBackend};
use snapnest_client::{
    ClientError, QueryClient, QueryConfig,
    controllers::{AuthContext, FollowController},
    queries::{InfinitePosts, RecentPosts, SearchPosts, UserById, UserPosts, Users},
};
use snapnest_common::model::{Id, auth::Credentials, user::UserMarker};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up backend: {0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("Error printing output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Optional sign-in, read from `SNAPNEST_EMAIL` and `SNAPNEST_PASSWORD`.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct SessionEnv {
    email: Option<String>,
    password: Option<String>,
}

impl SessionEnv {
    fn credentials(self) -> Option<Credentials> {
        Some(Credentials {
            email: self.email?,
            password: self.password?,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "snapnest", about = "Browse SnapNest from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// The most recent posts.
    Feed,
    /// Pages through all posts.
    Explore {
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Posts whose caption contains the term.
    Search { term: String },
    /// Newest users first.
    Users {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// A user and their posts.
    Profile { id: Id<UserMarker> },
    /// Follows or unfollows a user as the signed-in user.
    Follow { id: Id<UserMarker> },
    /// The signed-in user.
    Whoami,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snapnest_client=debug,snapnest_backend=debug,snapnest_common=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn get_env() -> Result<(BackendConfig, SessionEnv), InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    let backend = envy::prefixed("SNAPNEST_").from_env()?;
    let session = envy::prefixed("SNAPNEST_").from_env()?;
    Ok((backend, session))
}

fn print(value: &impl Serialize) -> Result<(), InitError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(
    command: Command,
    auth: &AuthContext,
    queries: &Arc<QueryClient>,
) -> Result<(), InitError> {
    match command {
        Command::Feed => print(&queries.fetch(&RecentPosts).await?)?,
        Command::Explore { pages } => {
            let mut data = queries.fetch_infinite(&InfinitePosts).await?;
            for _ in 1..pages {
                if !data.as_ref().is_some_and(|data| data.has_next_page()) {
                    break;
                }
                data = queries.fetch_next_page(&InfinitePosts).await?;
            }
            let posts: Vec<_> = data.iter().flat_map(|data| data.items()).collect();
            print(&posts)?;
        }
        Command::Search { term } => print(&queries.fetch(&SearchPosts(term)).await?)?,
        Command::Users { limit } => print(&queries.fetch(&Users { limit }).await?)?,
        Command::Profile { id } => {
            let user = queries.fetch(&UserById(Some(id))).await?;
            let posts = queries.fetch(&UserPosts(Some(id))).await?;
            print(&serde_json::json!({ "user": user, "posts": posts }))?;
        }
        Command::Follow { id } => {
            let viewer = auth.require_user()?.id;
            let Some(viewed) = queries.fetch(&UserById(Some(id))).await? else {
                return Ok(());
            };
            let mut button = FollowController::new(queries.clone(), &viewed, viewer);
            button.toggle().await?;
            print(&button.state())?;
        }
        Command::Whoami => print(&auth.user())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let cli = Cli::parse();
    let (config, session) = get_env()?;

    let backend = Arc::new(HttpBackend::new(config)?);
    let queries = Arc::new(QueryClient::new(
        Arc::new(BackendClient::from_backend(backend)),
        QueryConfig::default(),
    ));

    let mut auth = AuthContext::new(queries.clone());
    if let Some(credentials) = session.credentials() {
        auth.sign_in(credentials).await?;
    } else {
        auth.check_auth_user().await?;
    }

    run(cli.command, &auth, &queries).await
}
