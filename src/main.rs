//! Learnboard - Personal Learning Resource Tracker
//!
//! Command-line front end. Every command runs against the live view kept by
//! the sync layer; `shell` keeps the process alive and re-renders the
//! dashboard whenever the view changes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use learnboard::{
    config::LearnboardConfig,
    identity::{AuthError, HmacAssertionProvider, IdentityService, LocalIdentity},
    preferences::PreferenceStore,
    render::{self, Theme},
    resources::{parse_tags, Cluster, NewResource, Resource, ResourcePatch, ResourceType},
    store::{DocumentStore, LocalStore},
    sync::{SyncLayer, ViewSnapshot},
    tracker::Tracker,
    Error,
};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "learnboard")]
#[command(version)]
#[command(about = "Track learning resources grouped into clusters")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LEARNBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// A single line typed into the interactive shell
#[derive(Parser)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an email/password account and sign in
    Signup {
        email: String,
        #[arg(env = "LEARNBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in with email/password or a federated provider
    Login {
        #[arg(required_unless_present = "provider")]
        email: Option<String>,
        #[arg(
            env = "LEARNBOARD_PASSWORD",
            hide_env_values = true,
            required_unless_present = "provider"
        )]
        password: Option<String>,

        /// Federated provider name from the configuration
        #[arg(long, requires = "assertion", conflicts_with = "email")]
        provider: Option<String>,

        /// Signed identity assertion issued by the provider
        #[arg(long, requires = "provider")]
        assertion: Option<String>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Add a resource
    Add {
        title: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long = "type", default_value = "website")]
        kind: ResourceType,
        /// Cluster id, id prefix or name
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Edit fields of a resource
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        #[arg(long = "type")]
        kind: Option<ResourceType>,
        /// Cluster id, id prefix or name; empty for the default cluster
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Advance a resource's progress (Start, Complete, Restart)
    Progress { id: String },

    /// Replace a resource's notes
    Notes { id: String, notes: String },

    /// Delete a resource
    Rm { id: String },

    /// Move a resource to another cluster
    Mv { id: String, cluster: String },

    /// Manage clusters
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Show the dashboard
    List {
        /// Only show resources matching this text
        #[arg(short, long, default_value = "")]
        search: String,
    },

    /// Show a resource and how it embeds
    View { id: String },

    /// Show or toggle the dark-mode preference
    Theme {
        #[arg(long)]
        toggle: bool,
    },

    /// Interactive shell with a live dashboard
    Shell,
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Create a cluster
    New { name: String },

    /// Delete a cluster and every resource in it
    Rm { cluster: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("learnboard={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = match cli.config.or_else(default_config_path) {
        Some(path) if path.exists() => LearnboardConfig::load(&path)?,
        Some(path) => {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            LearnboardConfig::default()
        }
        None => LearnboardConfig::default(),
    };

    let app = App::open(config).await?;
    let mut session = Session {
        theme: app.theme().await,
        query: String::new(),
    };

    match cli.command {
        Commands::Shell => app.run_shell(session).await,
        command => {
            report(app.execute(command, &mut session).await)?;
            Ok(())
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join("learnboard").join("config.toml"))
}

/// Auth failures and incomplete cascades are shown to the user; anything else
/// is passed on
fn report(result: learnboard::Result<()>) -> learnboard::Result<()> {
    match result {
        Err(Error::Auth(e)) => {
            eprintln!("{}", e);
            Ok(())
        }
        Err(e @ Error::CascadeIncomplete { .. }) => {
            eprintln!("{}. Run the command again to finish.", e);
            Ok(())
        }
        other => other,
    }
}

/// Per-invocation view state
struct Session {
    theme: Theme,
    query: String,
}

struct App {
    config: LearnboardConfig,
    identity: Arc<LocalIdentity>,
    tracker: Tracker,
    sync: SyncLayer,
    preferences: PreferenceStore,
}

impl App {
    async fn open(config: LearnboardConfig) -> Result<Self> {
        let identity =
            Arc::new(LocalIdentity::open(config.storage.identity_dir(), &config.identity).await?);
        let store: Arc<dyn DocumentStore> =
            Arc::new(LocalStore::new(config.storage.documents_dir()));

        let users = identity.subscribe();
        let tracker = Tracker::new(store.clone(), users.clone());
        let sync = SyncLayer::start(store, users);
        let preferences = PreferenceStore::new(config.storage.preferences_file.clone());

        Ok(Self {
            config,
            identity,
            tracker,
            sync,
            preferences,
        })
    }

    async fn theme(&self) -> Theme {
        let preferences = self.preferences.load().await;
        Theme::from_preferences(&preferences, std::io::stdout().is_terminal())
    }

    /// Snapshot for whoever is signed in right now
    async fn view(&self) -> Arc<ViewSnapshot> {
        let uid = self.identity.current_user().map(|u| u.uid);
        self.sync.wait_for_user(uid.as_deref()).await
    }

    async fn execute(&self, command: Commands, session: &mut Session) -> learnboard::Result<()> {
        match command {
            Commands::Signup { email, password } => {
                let password = Zeroizing::new(password);
                let user = self.identity.sign_up(&email, &password).await?;
                println!("Signed up as {}", user.display_name());
            }
            Commands::Login {
                email,
                password,
                provider,
                assertion,
            } => {
                let user = match (provider, assertion) {
                    (Some(provider), Some(assertion)) => {
                        let secret = self
                            .config
                            .federated_provider(&provider)
                            .map(|p| p.secret.clone())
                            .ok_or_else(|| AuthError::UnknownProvider(provider.clone()))?;
                        let provider = HmacAssertionProvider::new(provider, secret, assertion);
                        self.identity.log_in_with(&provider).await?
                    }
                    _ => {
                        let password = Zeroizing::new(password.unwrap_or_default());
                        self.identity
                            .log_in(email.as_deref().unwrap_or_default(), &password)
                            .await?
                    }
                };
                println!("Signed in as {}", user.display_name());
            }
            Commands::Logout => {
                self.identity.log_out().await?;
                println!("Signed out");
            }
            Commands::Whoami => match self.identity.current_user() {
                Some(user) => println!("{} ({})", user.display_name(), user.provider),
                None => println!("Not signed in"),
            },
            Commands::Add {
                title,
                url,
                description,
                category,
                tags,
                kind,
                cluster,
            } => {
                let cluster_id = match cluster {
                    Some(key) => match self.find_cluster(&key).await {
                        Some(cluster) => Some(cluster.id),
                        None => return Ok(()),
                    },
                    None => None,
                };
                let input = NewResource {
                    title,
                    url,
                    description,
                    category,
                    tags: parse_tags(&tags),
                    kind,
                    cluster_id,
                };
                match self.tracker.create_resource(input).await? {
                    Some(resource) => println!(
                        "Added [{}] {}",
                        render::short_id(&resource.id),
                        resource.title
                    ),
                    None => println!("Not signed in"),
                }
            }
            Commands::Edit {
                id,
                title,
                url,
                description,
                category,
                tags,
                kind,
                cluster,
            } => {
                let Some(resource) = self.find_resource(&id).await else {
                    return Ok(());
                };
                let cluster_id = match cluster {
                    Some(key) if key.is_empty() => Some(String::new()),
                    Some(key) => match self.find_cluster(&key).await {
                        Some(cluster) => Some(cluster.id),
                        None => return Ok(()),
                    },
                    None => None,
                };
                let patch = ResourcePatch {
                    title,
                    url,
                    description,
                    category,
                    tags: tags.as_deref().map(parse_tags),
                    kind,
                    cluster_id,
                    ..Default::default()
                };
                if patch.is_empty() {
                    println!("Nothing to change");
                    return Ok(());
                }
                if let Some(updated) = self.tracker.update_resource(&resource.id, patch).await? {
                    println!("Updated {}", updated.title);
                }
            }
            Commands::Progress { id } => {
                let Some(resource) = self.find_resource(&id).await else {
                    return Ok(());
                };
                if let Some(updated) = self.tracker.cycle_progress(&resource).await? {
                    println!("{}: {}", updated.title, updated.progress);
                }
            }
            Commands::Notes { id, notes } => {
                let Some(resource) = self.find_resource(&id).await else {
                    return Ok(());
                };
                if self.tracker.update_notes(&resource.id, &notes).await?.is_some() {
                    println!("Notes saved for {}", resource.title);
                }
            }
            Commands::Rm { id } => {
                let Some(resource) = self.find_resource(&id).await else {
                    return Ok(());
                };
                if self.tracker.delete_resource(&resource.id).await? {
                    println!("Deleted {}", resource.title);
                }
            }
            Commands::Mv { id, cluster } => {
                let Some(resource) = self.find_resource(&id).await else {
                    return Ok(());
                };
                let Some(cluster) = self.find_cluster(&cluster).await else {
                    return Ok(());
                };
                if self
                    .tracker
                    .reassign_resource_cluster(&resource.id, &cluster.id)
                    .await?
                    .is_some()
                {
                    println!("Moved {} to {}", resource.title, cluster.name);
                }
            }
            Commands::Cluster { command } => match command {
                ClusterCommands::New { name } => match self.tracker.create_cluster(&name).await? {
                    Some(cluster) => println!(
                        "Created cluster [{}] {}",
                        render::short_id(&cluster.id),
                        cluster.name
                    ),
                    None if self.identity.current_user().is_none() => println!("Not signed in"),
                    None => println!("Cluster name cannot be empty"),
                },
                ClusterCommands::Rm { cluster } => {
                    let Some(cluster) = self.find_cluster(&cluster).await else {
                        return Ok(());
                    };
                    if self.tracker.delete_cluster(&cluster.id).await? {
                        println!("Deleted cluster {} and its resources", cluster.name);
                    }
                }
            },
            Commands::List { search } => {
                session.query = search;
                print!("{}", render::dashboard(&*self.view().await, &session.query, &session.theme));
            }
            Commands::View { id } => {
                let view = self.view().await;
                match view.resolve_resource(&id) {
                    Some(resource) => print!("{}", render::resource_detail(&view, resource, &session.theme)),
                    None => println!("No resource matching '{}'", id),
                }
            }
            Commands::Theme { toggle } => {
                if toggle {
                    let preferences = self.preferences.toggle_dark_mode().await?;
                    session.theme.dark = preferences.dark_mode;
                }
                println!("Theme: {}", session.theme.name());
            }
            Commands::Shell => println!("Already in the shell"),
        }
        Ok(())
    }

    async fn find_resource(&self, key: &str) -> Option<Resource> {
        let view = self.view().await;
        if !view.is_signed_in() {
            println!("Not signed in");
            return None;
        }
        let found = view.resolve_resource(key).cloned();
        if found.is_none() {
            println!("No resource matching '{}'", key);
        }
        found
    }

    async fn find_cluster(&self, key: &str) -> Option<Cluster> {
        let view = self.view().await;
        if !view.is_signed_in() {
            println!("Not signed in");
            return None;
        }
        let found = view.resolve_cluster(key).cloned();
        if found.is_none() {
            println!("No cluster matching '{}'", key);
        }
        found
    }

    async fn run_shell(&self, mut session: Session) -> Result<()> {
        let mut views = self.sync.subscribe();
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = LinesStream::new(stdin.lines());

        let snapshot = self.view().await;
        let _ = views.borrow_and_update();
        redraw(&snapshot, &session);

        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = views.borrow_and_update().clone();
                    redraw(&snapshot, &session);
                }
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        let args = split_args(&line);
                        match args.first().map(String::as_str) {
                            None => {}
                            Some("exit") | Some("quit") => break,
                            Some(_) => match ShellLine::try_parse_from(args) {
                                Ok(parsed) => {
                                    if let Err(e) = report(self.execute(parsed.command, &mut session).await) {
                                        tracing::error!("{}", e);
                                    }
                                }
                                Err(e) => {
                                    let _ = e.print();
                                }
                            },
                        }
                        prompt();
                    }
                    Some(Err(e)) => {
                        tracing::error!("Failed to read input: {}", e);
                        break;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        println!();
        Ok(())
    }
}

fn redraw(snapshot: &ViewSnapshot, session: &Session) {
    println!();
    print!("{}", render::dashboard(snapshot, &session.query, &session.theme));
    prompt();
}

fn prompt() {
    print!("learnboard> ");
    let _ = std::io::stdout().flush();
}

/// Split a shell line into arguments, honouring single and double quotes
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_args_quotes() {
        assert_eq!(
            split_args(r#"add "Go Tour" --tags 'go, tutorial'  --url https://go.dev/tour"#),
            vec!["add", "Go Tour", "--tags", "go, tutorial", "--url", "https://go.dev/tour"]
        );
        assert_eq!(split_args("edit abc --cluster \"\""), vec!["edit", "abc", "--cluster", ""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_shell_line_parses_commands() {
        let parsed = ShellLine::try_parse_from(split_args("mv abc123 Frontend")).unwrap();
        assert!(matches!(
            parsed.command,
            Commands::Mv { ref id, ref cluster } if id == "abc123" && cluster == "Frontend"
        ));

        let parsed = ShellLine::try_parse_from(split_args("add Video --type youtube")).unwrap();
        assert!(matches!(
            parsed.command,
            Commands::Add { kind: ResourceType::Youtube, .. }
        ));

        assert!(ShellLine::try_parse_from(split_args("add X --type podcast")).is_err());
    }

    #[test]
    fn test_login_requires_provider_pair() {
        let parsed = Cli::try_parse_from(["learnboard", "login", "--provider", "google", "--assertion", "a.b"]);
        assert!(parsed.is_ok());
        assert!(Cli::try_parse_from(["learnboard", "login", "--provider", "google"]).is_err());
    }
}
