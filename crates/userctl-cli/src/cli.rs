//! Command-line surface: global connection options and the `user`/`group` command trees.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use userctl_core::{BindCredentials, DirectoryConfig, Result, TransportSecurity};
use userctl_ldap::{
    render_report, DirectoryEntry, DirectorySession, GroupSpec, Provisioner, Query, UserSpec,
};

#[derive(Debug, Parser)]
#[command(name = "userctl")]
#[command(author, version, about = "A simple command line tool for user management.", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// More log output on stderr (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the directory lives and how to bind to it.
#[derive(Debug, clap::Args)]
pub struct ConnectionArgs {
    /// LDAP server address, `host:port` or a full `ldap://`/`ldaps://` URL
    #[arg(long, global = true, env = "USERCTL_URL", default_value = "127.0.0.1:389")]
    pub url: String,

    /// Base DN holding the People and Group units
    #[arg(
        long,
        alias = "baseDn",
        global = true,
        env = "USERCTL_BASE_DN",
        default_value = "dc=test,dc=com"
    )]
    pub base_dn: String,

    /// Bind DN of the administrator
    #[arg(
        long,
        global = true,
        env = "USERCTL_ADMIN",
        default_value = "cn=manager,dc=test,dc=com"
    )]
    pub admin: String,

    /// Bind password of the administrator
    #[arg(
        long,
        alias = "adminPw",
        global = true,
        env = "USERCTL_ADMIN_PW",
        default_value = "123456",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub admin_pw: String,

    /// Connect over LDAPS
    #[arg(long, global = true)]
    pub tls: bool,

    /// Upgrade a plain connection with StartTLS
    #[arg(long, global = true, conflicts_with = "tls")]
    pub starttls: bool,

    /// Skip server certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// PEM certificate of an additional trusted CA
    #[arg(long, global = true, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// Samba domain whose SID prefixes new accounts
    #[arg(long, global = true, env = "USERCTL_SAMBA_DOMAIN", default_value = "SAMBA")]
    pub samba_domain: String,

    /// Connection and per-operation timeout in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 10)]
    pub timeout: u64,
}

impl ConnectionArgs {
    /// Builds and validates the directory configuration.
    pub fn directory_config(&self) -> Result<DirectoryConfig> {
        let credentials = BindCredentials::new(&self.admin, &self.admin_pw);
        let mut config = DirectoryConfig::new(&self.url, &self.base_dn, credentials)?
            .with_transport(TransportSecurity::from_flags(self.tls, self.starttls))
            .with_tls_verify(!self.insecure)
            .with_samba_domain(&self.samba_domain)
            .with_timeouts(self.timeout, self.timeout);
        if let Some(path) = &self.ca_cert {
            config = config.with_ca_cert(path.clone());
        }
        config.validated()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// User related commands
    #[command(subcommand)]
    User(UserCommand),
    /// Group related commands
    #[command(subcommand)]
    Group(GroupCommand),
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// List all users
    List,
    /// Show the user with a numeric uid
    Id { id: u32 },
    /// Show the user with a login name
    Name { name: String },
    /// Create a user
    Add {
        name: String,
        id: u32,
        password: String,
    },
    /// Change a user's password
    Putpwd { name: String, password: String },
    /// Delete a user
    Del { name: String },
}

#[derive(Debug, Subcommand)]
pub enum GroupCommand {
    /// List all groups
    List,
    /// Show the group with a name
    Name { name: String },
    /// Create a group
    Add { name: String, id: u32 },
    /// Delete a group
    Del { name: String },
    /// Add a user to a group
    #[command(name = "addMember", alias = "add-member")]
    AddMember { groupname: String, username: String },
    /// Remove a user from a group
    #[command(name = "delMember", alias = "del-member")]
    DelMember { groupname: String, username: String },
}

impl Cli {
    /// Log level used when RUST_LOG is unset.
    pub fn verbosity(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

/// Runs one command on a fresh session. Returns the JSON report of read commands.
pub async fn execute(cli: Cli) -> Result<Option<String>> {
    let config = cli.connection.directory_config()?;
    run(DirectorySession::new(config)?, cli.command).await
}

/// Connects `session`, runs `command`, then closes the session whether the command succeeded
/// or not.
async fn run(mut session: DirectorySession, command: Command) -> Result<Option<String>> {
    session.connect().await?;
    let outcome = command.run(&mut session).await;
    session.close().await;
    outcome
}

/// Process exit code for an argument parsing outcome: 0 for help and version, 1 otherwise.
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    i32::from(err.use_stderr())
}

impl Command {
    async fn run(self, session: &mut DirectorySession) -> Result<Option<String>> {
        match self {
            Self::User(command) => command.run(session).await,
            Self::Group(command) => command.run(session).await,
        }
    }
}

impl UserCommand {
    async fn run(self, session: &mut DirectorySession) -> Result<Option<String>> {
        match self {
            Self::List => report(Query::new(session).list_users().await?),
            Self::Id { id } => report(Query::new(session).find_user_by_id(id).await?),
            Self::Name { name } => report(Query::new(session).find_user_by_name(&name).await?),
            Self::Add { name, id, password } => {
                let spec = UserSpec::new(name, id, password)?;
                Provisioner::new(session).create_user(&spec).await?;
                Ok(None)
            }
            Self::Putpwd { name, password } => {
                Provisioner::new(session)
                    .change_password(&name, &password)
                    .await?;
                Ok(None)
            }
            Self::Del { name } => {
                Provisioner::new(session).delete_user(&name).await?;
                Ok(None)
            }
        }
    }
}

impl GroupCommand {
    async fn run(self, session: &mut DirectorySession) -> Result<Option<String>> {
        match self {
            Self::List => report(Query::new(session).list_groups().await?),
            Self::Name { name } => report(Query::new(session).find_group_by_name(&name).await?),
            Self::Add { name, id } => {
                let spec = GroupSpec::new(name, id)?;
                Provisioner::new(session).create_group(&spec).await?;
                Ok(None)
            }
            Self::Del { name } => {
                Provisioner::new(session).delete_group(&name).await?;
                Ok(None)
            }
            Self::AddMember {
                groupname,
                username,
            } => {
                Provisioner::new(session)
                    .add_group_member(&groupname, &username)
                    .await?;
                Ok(None)
            }
            Self::DelMember {
                groupname,
                username,
            } => {
                Provisioner::new(session)
                    .remove_group_member(&groupname, &username)
                    .await?;
                Ok(None)
            }
        }
    }
}

fn report(entries: Vec<DirectoryEntry>) -> Result<Option<String>> {
    render_report(&entries).map(Some)
}
