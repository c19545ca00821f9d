use std::sync::Arc;

use iced::{
    Element,
    Length::Fill,
    Task, Theme, application,
    widget::{center, column, text},
};
use solidcard_lib::{
    Cfg, CoreConfig, FileSessionStore, Identifier, ProfileStore, Session, SessionTerminator,
    store::HttpStore,
};
use tracing::{Level, error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::{
    components::{
        profile_form::{self, ProfileForm},
        sign_in::{self, SignIn},
    },
    config::GuiConfig,
};

pub mod components;
pub mod config;

fn main() -> iced::Result {
    // Human friendly panicking in release mode
    human_panic::setup_panic!();

    // Logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set up logging");
    }

    application(App::new, App::update, App::view)
        .theme(App::theme)
        .title(App::title)
        .run()
}

#[derive(Debug, Clone)]
enum Message {
    SignIn(sign_in::Message),
    ProfileForm(profile_form::Message),
    LoggedOut(Result<(), String>),
}

enum Screen {
    SignIn(SignIn),
    Profile(ProfileForm),
    /// Nothing can be shown without configuration
    Failed(String),
}

struct App {
    title: String,
    theme: Theme,
    cfg: Cfg,
    sessions: Option<FileSessionStore>,
    store: Arc<dyn ProfileStore>,
    screen: Screen,
}

impl App {
    /// Build the whole application from what's on disk. Also used to reload after logout.
    pub fn new() -> (Self, Task<Message>) {
        let theme = GuiConfig::load().theme();
        let store: Arc<dyn ProfileStore> = Arc::new(HttpStore::new());

        let mut app = Self {
            title: "solidcard".into(),
            theme,
            cfg: CoreConfig::default().into_handle(),
            sessions: None,
            store,
            screen: Screen::Failed(String::new()),
        };

        let boot = CoreConfig::load().and_then(|cfg| {
            let sessions = FileSessionStore::new()?;
            let session = sessions.load(&cfg)?;
            Ok((cfg, sessions, session))
        });

        let task = match boot {
            Ok((cfg, sessions, session)) => {
                app.cfg = cfg.into_handle();
                app.sessions = Some(sessions);
                match session {
                    Some(session) => app.open_profile(session),
                    None => app.open_sign_in(),
                }
            }
            Err(e) => {
                error!("Failed to start: {e}");
                app.screen = Screen::Failed(e.to_string());
                Task::none()
            }
        };

        (app, task)
    }

    // Update application state based on messages passed by view()
    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::SignIn(message) => {
                let Screen::SignIn(sign_in) = &mut self.screen else {
                    return Task::none();
                };

                match sign_in.update(message) {
                    sign_in::Action::None => Task::none(),
                    sign_in::Action::SignIn { webid, token } => self.sign_in(webid, token),
                }
            }
            Message::ProfileForm(message) => {
                let Screen::Profile(form) = &mut self.screen else {
                    return Task::none();
                };

                match form.update(message) {
                    profile_form::Action::None => Task::none(),
                    profile_form::Action::Run(task) => task.map(Message::ProfileForm),
                    profile_form::Action::Logout => self.logout(),
                }
            }
            Message::LoggedOut(Ok(())) => {
                // Start over from scratch, dropping the old screen aborts anything in flight
                let (app, task) = App::new();
                *self = app;
                task
            }
            Message::LoggedOut(Err(e)) => {
                self.screen = Screen::Failed(format!("Failed to log out: {e}"));
                Task::none()
            }
        }
    }

    // Render the application and pass along messages from components to update()
    pub fn view(&self) -> Element<'_, Message> {
        let content: Element<'_, Message> = match &self.screen {
            Screen::SignIn(sign_in) => sign_in.view().map(Message::SignIn),
            Screen::Profile(form) => form.view().map(Message::ProfileForm),
            Screen::Failed(e) => text(e).into(),
        };

        center(column![content].max_width(600)).height(Fill).into()
    }

    pub fn title(&self) -> String {
        self.title.clone()
    }

    pub fn theme(&self) -> Theme {
        self.theme.clone()
    }

    fn open_profile(&mut self, session: Session) -> Task<Message> {
        let (form, task) = ProfileForm::new(session, self.store.clone());
        self.screen = Screen::Profile(form);
        task.map(Message::ProfileForm)
    }

    fn open_sign_in(&mut self) -> Task<Message> {
        let (sign_in, task) = SignIn::new();
        self.screen = Screen::SignIn(sign_in);
        task.map(Message::SignIn)
    }

    fn sign_in(&mut self, webid: Identifier, token: Option<String>) -> Task<Message> {
        let Some(sessions) = &self.sessions else {
            return Task::none();
        };

        let cfg = self.cfg.read().clone();
        let session = sessions
            .login(webid, token)
            .and_then(|()| sessions.require(&cfg));

        match session {
            Ok(session) => self.open_profile(session),
            Err(e) => {
                warn!("Sign in failed: {e}");
                if let Screen::SignIn(sign_in) = &mut self.screen {
                    sign_in.set_error(e.to_string());
                }
                Task::none()
            }
        }
    }

    fn logout(&self) -> Task<Message> {
        let Some(sessions) = self.sessions.clone() else {
            return Task::none();
        };

        Task::perform(
            async move { sessions.logout().await.map_err(|e| e.to_string()) },
            Message::LoggedOut,
        )
    }
}
