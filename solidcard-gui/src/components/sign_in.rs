use iced::{
    Element, Task,
    widget::{button, column, container, row, space, text, text_input},
};
use solidcard_lib::Identifier;

#[derive(Debug, Clone)]
pub enum Message {
    WebIdInput(String),
    TokenInput(String),
    SignInPressed,
}

pub enum Action {
    None,
    SignIn {
        webid: Identifier,
        token: Option<String>,
    },
}

/// Collects the WebID and the access token issued for it by the identity provider.
pub struct SignIn {
    webid: String,
    token: String,
    error: Option<String>,
}

impl SignIn {
    pub fn new() -> (Self, Task<Message>) {
        (
            Self {
                webid: "".into(),
                token: "".into(),
                error: None,
            },
            Task::none(),
        )
    }

    /// Reset the form state
    pub fn clear(&mut self) {
        self.webid.clear();
        self.token.clear();
        self.error = None;
    }

    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    pub fn update(&mut self, message: Message) -> Action {
        match message {
            Message::WebIdInput(content) => {
                self.webid = content;
                self.error = None;
                Action::None
            }
            Message::TokenInput(content) => {
                self.token = content;
                Action::None
            }
            Message::SignInPressed => match Identifier::parse(&self.webid) {
                Ok(webid) => {
                    let token = Some(self.token.trim().to_owned()).filter(|t| !t.is_empty());

                    self.clear();

                    Action::SignIn { webid, token }
                }
                Err(e) => {
                    self.error = Some(e.to_string());
                    Action::None
                }
            },
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let mut content = column![
            text("Sign in").size(32),
            row![
                text("WebID"),
                text_input("https://you.example/profile/card#me", &self.webid)
                    .on_input(Message::WebIdInput),
            ]
            .spacing(8),
            row![
                text("Token"),
                text_input("...", &self.token)
                    .secure(true)
                    .on_input(Message::TokenInput),
            ]
            .spacing(8),
        ]
        .spacing(16);

        if let Some(e) = &self.error {
            content = content.push(text(e).style(text::danger));
        }

        content = content.push(row![
            space::horizontal(),
            button("Sign in").on_press_maybe(self.validate().then_some(Message::SignInPressed)),
        ]);

        container(content).padding(20).width(500).into()
    }

    fn validate(&self) -> bool {
        !self.webid.trim().is_empty()
    }
}
