use anyhow::{Result, bail};
use clap::Subcommand;
use serde::Serialize;
use snugfeed::{Page, Profile, Resolution, Route, presentation};

use super::{report, resolve_session};
use crate::context::ClientContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Profiles",
    commands: &[
        "snugfeed profile show                      # Your profile",
        "snugfeed profile show <USER_ID>            # Someone else's",
        "snugfeed profile rename \"new name\"",
    ],
}];

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show a profile (yours when no id is given)
    Show { user_id: Option<String> },

    /// Change your display name
    Rename {
        /// New display name
        user_name: String,
    },
}

#[derive(Serialize)]
struct ProfileView {
    #[serde(flatten)]
    profile: Profile,
    is_current_user: bool,
}

impl TableDisplay for ProfileView {
    fn to_table(&self, output: &OutputManager) -> comfy_table::Table {
        let mut table = output.create_table();
        table.add_row(vec!["ID", self.profile.id.as_str()]);
        table.add_row(vec!["Name", self.profile.user_name.as_str()]);
        table.add_row(vec!["Email", self.profile.email.as_str()]);
        table.add_row(vec!["You", if self.is_current_user { "yes" } else { "no" }]);
        table
    }

    fn to_compact(&self) -> String {
        format!("{} {} <{}>", self.profile.id, self.profile.user_name, self.profile.email)
    }
}

pub async fn handle_profile_commands(command: ProfileCommands, output: &OutputManager) -> Result<()> {
    let context = ClientContext::find()?;
    let client = context.connect().await?;
    let ctx = resolve_session(&client, &context, output).await?;

    match command {
        ProfileCommands::Show { user_id } => {
            let route = user_id.map(Route::User).unwrap_or(Route::MyPage);
            let view = match presentation::resolve(&route, &ctx, client.profiles()).await {
                Resolution::Render(Page::MyPage { profile }) => ProfileView {
                    profile,
                    is_current_user: true,
                },
                Resolution::Render(Page::User { profile, is_current_user }) => ProfileView {
                    profile,
                    is_current_user,
                },
                Resolution::Redirect(Route::SignIn) => bail!("Not signed in. Run 'snugfeed auth signin' first."),
                Resolution::Render(Page::Unavailable { message }) => {
                    bail!("Could not reach the backend ({message}). Try again.")
                }
                _ => bail!("User not found"),
            };
            output.display(&view)?;
        }
        ProfileCommands::Rename { user_name } => {
            let user_id = ctx
                .require("update profile")
                .map_err(|err| report(err, output))?
                .user
                .id
                .clone();
            let profile = client
                .profiles()
                .update(&user_id, &user_name, &ctx)
                .await
                .map_err(|err| report(err, output))?;
            client.session().notify_user_updated(profile.clone());
            output.success(&format!("You are now {}", profile.user_name));
        }
    }

    Ok(())
}
