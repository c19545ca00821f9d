use std::sync::Arc;

use clap::Subcommand;
use colored::Colorize;
use solidcard_lib::{
    AuthenticatedFetch, CoreConfig, Error, FileSessionStore, FormState, Identifier,
    ProfileEditor, ProfileStore, Session, StoreError, store::HttpStore,
};
use tracing::debug;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the profile
    Show,
    /// Change the name and/or email
    Edit {
        #[arg(long)]
        name: Option<String>,
        /// An empty value removes the email
        #[arg(long)]
        email: Option<String>,
    },
}

pub async fn handle(
    cfg: &CoreConfig,
    sessions: &FileSessionStore,
    webid: Option<Identifier>,
    cmd: Command,
) -> Result<(), Error> {
    let session = resolve_session(cfg, sessions, webid)?;
    let store: Arc<dyn ProfileStore> = Arc::new(HttpStore::new());

    let mut editor = ProfileEditor::new();
    if let Some(request) = editor.bind(session) {
        let loaded = request.run(store.clone()).await;
        if let Err(e) = loaded.result() {
            return Err(e.clone().into());
        }
        editor.loaded(loaded);
    }

    match cmd {
        Command::Show => {
            print_form(editor.form());
            Ok(())
        }
        Command::Edit { name, email } => {
            if let Some(name) = name {
                editor.set_name(name);
            }
            if let Some(email) = email {
                editor.set_email(email);
            }

            if !editor.is_dirty() {
                println!("Nothing to change");
                return Ok(());
            }

            let Some(request) = editor.begin_submit() else {
                let reason = editor.submit_error().unwrap_or("Profile can't be submitted");
                return Err(StoreError::Validation(reason.into()).into());
            };

            let submitted = request.run(store).await;
            if let Err(e) = submitted.result() {
                return Err(e.clone().into());
            }
            editor.finish_submit(submitted);

            println!("{}", "Profile updated".green());
            print_form(editor.form());
            Ok(())
        }
    }
}

/// The stored session, optionally pointed at another WebID. The stored credentials are only
/// sent to the origin they were issued for. Anything else, or running without a stored
/// session, goes out unauthenticated, which is enough for public profiles.
fn resolve_session(
    cfg: &CoreConfig,
    sessions: &FileSessionStore,
    webid: Option<Identifier>,
) -> Result<Session, Error> {
    match (sessions.load(cfg)?, webid) {
        (Some(session), None) => Ok(session),
        (Some(session), Some(webid)) if same_origin(session.identifier(), &webid) => {
            Ok(Session::new(webid, session.fetch().clone()))
        }
        (_, Some(webid)) => {
            let origin = webid.url().origin().ascii_serialization();
            debug!("Not sending stored credentials to {origin}");
            Ok(Session::new(webid, AuthenticatedFetch::new(cfg, None)?))
        }
        (None, None) => Err(Error::NoSession),
    }
}

fn same_origin(a: &Identifier, b: &Identifier) -> bool {
    a.url().origin() == b.url().origin()
}

fn print_form(form: &FormState) {
    println!("{}", format!("Hello, {}", form.name).bold());
    println!("  Name:  {}", form.name);
    if form.email.is_empty() {
        println!("  Email: {}", "(none)".dimmed());
    } else {
        println!("  Email: {}", form.email);
    }
}
