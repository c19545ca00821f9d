use colored::Colorize;
use solidcard_lib::{Error, FileSessionStore, Identifier, SessionTerminator};

pub fn login(
    sessions: &FileSessionStore,
    webid: Identifier,
    token: Option<String>,
) -> Result<(), Error> {
    sessions.login(webid.clone(), token)?;
    println!("Logged in as {}", webid.to_string().bold());
    Ok(())
}

pub async fn logout(sessions: &FileSessionStore) -> Result<(), Error> {
    sessions.logout().await?;
    println!("Logged out");
    Ok(())
}
