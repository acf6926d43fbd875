//! `login`, `signup`, `logout` and `whoami`

use colored::Colorize;

use crate::api::{Credentials, SignupRequest};
use crate::commands::{secret_or_prompt, value_or_prompt};
use crate::error::Result;
use crate::http::ApiClient;

pub async fn handle_login(
    client: &ApiClient,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let credentials = Credentials {
        email: value_or_prompt(email, "Email: ")?,
        password: secret_or_prompt(password, "Password")?,
    };
    let user = client.login(&credentials).await?;
    let name = user.name.as_deref().unwrap_or(&user.email);
    println!("{}", format!("Signed in as {}", name).green());
    Ok(())
}

pub async fn handle_signup(
    client: &ApiClient,
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let request = SignupRequest {
        email: value_or_prompt(email, "Email: ")?,
        password: secret_or_prompt(password, "Password")?,
        name,
    };
    let user = client.signup(&request).await?;
    println!(
        "{}",
        format!("Account created for {}. Run `botdesk login` to sign in.", user.email).green()
    );
    Ok(())
}

pub async fn handle_logout(client: &ApiClient) -> Result<()> {
    client.logout().await?;
    println!("{}", "Signed out.".green());
    Ok(())
}

/// Prints the signed-in user (refreshed from the server) and the active
/// project.
pub async fn handle_whoami(client: &ApiClient) -> Result<()> {
    if client.session().is_authenticated() {
        let user = match client.me().await {
            Ok(user) => {
                client.session().set_user(user.clone())?;
                Some(user)
            }
            Err(e) => {
                tracing::debug!("Falling back to stored profile: {}", e);
                client.session().user()
            }
        };
        match user {
            Some(user) => {
                println!("User:    {} ({})", user.email.cyan(), user.id);
                if let Some(name) = &user.name {
                    println!("Name:    {}", name);
                }
                if let Some(role) = &user.role {
                    println!("Role:    {}", role);
                }
            }
            None => println!("User:    {}", "not signed in".yellow()),
        }
    } else {
        println!("User:    {}", "not signed in".yellow());
    }

    match client.session().project() {
        Some(project) => {
            let label = project.name.as_deref().unwrap_or(&project.project_id);
            println!("Project: {} ({})", label.cyan(), project.project_id);
            let key_state = if client.session().project_api_key().is_some() {
                "set".green()
            } else {
                "missing".yellow()
            };
            println!("API key: {}", key_state);
        }
        None => println!("Project: {}", "none selected".yellow()),
    }
    Ok(())
}
