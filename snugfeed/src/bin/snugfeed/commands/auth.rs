use anyhow::{Result, bail};
use clap::Subcommand;
use serde::Serialize;
use snugfeed::SignUpForm;

use super::{report, resolve_session};
use crate::context::ClientContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Accounts",
        commands: &[
            "snugfeed auth signup --email me@example.com --password s3cret --confirm s3cret --name me",
            "snugfeed auth signin --email me@example.com --password s3cret",
        ],
    },
    ExampleGroup {
        title: "Session",
        commands: &[
            "snugfeed auth whoami              # Show the signed-in user",
            "snugfeed auth signout             # Forget the saved session",
        ],
    },
];

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account and sign in
    #[command(name = "signup")]
    SignUp {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SNUGFEED_PASSWORD", hide_env_values = true)]
        password: String,

        /// Repeat the password
        #[arg(long)]
        confirm: String,

        /// Display name shown on posts and comments
        #[arg(long)]
        name: String,
    },

    /// Sign in with email and password
    #[command(name = "signin")]
    SignIn {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SNUGFEED_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the saved session
    #[command(name = "signout")]
    SignOut,

    /// Show the signed-in user
    #[command(name = "whoami")]
    WhoAmI,
}

#[derive(Serialize)]
struct WhoAmI {
    id: String,
    email: String,
    user_name: Option<String>,
}

impl TableDisplay for WhoAmI {
    fn to_table(&self, output: &OutputManager) -> comfy_table::Table {
        let mut table = output.create_table();
        table.add_row(vec!["ID", self.id.as_str()]);
        table.add_row(vec!["Email", self.email.as_str()]);
        table.add_row(vec!["Name", self.user_name.as_deref().unwrap_or("-")]);
        table
    }

    fn to_compact(&self) -> String {
        format!("{} <{}>", self.user_name.as_deref().unwrap_or("?"), self.email)
    }
}

pub async fn handle_auth_commands(command: AuthCommands, output: &OutputManager) -> Result<()> {
    let context = ClientContext::find()?;
    let client = context.connect().await?;

    match command {
        AuthCommands::SignUp {
            email,
            password,
            confirm,
            name,
        } => {
            let form = SignUpForm {
                email,
                password,
                password_confirmation: confirm,
                user_name: name,
            };
            let ctx = client.session().sign_up(&form).await.map_err(|err| report(err, output))?;
            if let Some(session) = ctx.session() {
                context.save_session(session)?;
                output.success(&format!("Welcome, {}! You are signed in.", form.user_name.trim()));
            }
        }
        AuthCommands::SignIn { email, password } => {
            let ctx = client
                .session()
                .sign_in(&email, &password)
                .await
                .map_err(|err| report(err, output))?;
            if let Some(session) = ctx.session() {
                context.save_session(session)?;
                output.success(&format!("Signed in as {}", session.user.email));
            }
        }
        AuthCommands::SignOut => {
            client.session().sign_out().await;
            context.clear_session()?;
            output.success("Signed out");
        }
        AuthCommands::WhoAmI => {
            let ctx = resolve_session(&client, &context, output).await?;
            let Some(identity) = ctx.identity() else {
                bail!("Not signed in. Run 'snugfeed auth signin' first.");
            };
            let user_name = match client.profiles().get(&identity.id).await {
                Ok(profile) => Some(profile.user_name),
                Err(err) => {
                    output.verbose(&format!("profile lookup failed: {err}"));
                    None
                }
            };
            output.display(&WhoAmI {
                id: identity.id.clone(),
                email: identity.email.clone(),
                user_name,
            })?;
        }
    }

    Ok(())
}
