use std::sync::Arc;

use iced::{
    Element, Length, Task,
    task::Handle,
    widget::{button, column, container, row, space, text, text_input},
};
use solidcard_lib::{
    ProfileEditor, ProfileStore, Session, UiState,
    editor::{Loaded, Submitted},
};

const LABEL_WIDTH: f32 = 80.0;

#[derive(Debug, Clone)]
pub enum Message {
    Loaded(Loaded),
    NameInput(String),
    EmailInput(String),
    SubmitPressed,
    Submitted(Submitted),
    LogoutPressed,
}

/// Action used for communicating with the parent component
pub enum Action {
    None,
    Run(Task<Message>),
    Logout,
}

pub struct ProfileForm {
    editor: ProfileEditor,
    store: Arc<dyn ProfileStore>,
    /// The load or write currently running. Dropping the form aborts it.
    in_flight: Option<Handle>,
}

impl ProfileForm {
    pub fn new(session: Session, store: Arc<dyn ProfileStore>) -> (Self, Task<Message>) {
        let mut form = Self {
            editor: ProfileEditor::new(),
            store,
            in_flight: None,
        };
        let task = form.bind(session);

        (form, task)
    }

    /// Point the form at `session`, reloading the profile if it differs from the current one.
    pub fn bind(&mut self, session: Session) -> Task<Message> {
        match self.editor.bind(session) {
            Some(request) => {
                let store = self.store.clone();
                self.track(Task::perform(request.run(store), Message::Loaded))
            }
            None => Task::none(),
        }
    }

    pub fn update(&mut self, message: Message) -> Action {
        match message {
            Message::Loaded(loaded) => {
                self.in_flight = None;
                self.editor.loaded(loaded);
                Action::None
            }
            Message::NameInput(content) => {
                self.editor.set_name(content);
                Action::None
            }
            Message::EmailInput(content) => {
                self.editor.set_email(content);
                Action::None
            }
            Message::SubmitPressed => match self.editor.begin_submit() {
                Some(request) => {
                    let store = self.store.clone();
                    Action::Run(self.track(Task::perform(request.run(store), Message::Submitted)))
                }
                None => Action::None,
            },
            Message::Submitted(submitted) => {
                self.in_flight = None;
                self.editor.finish_submit(submitted);
                Action::None
            }
            // Handled higher up
            Message::LogoutPressed => Action::Logout,
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        match self.editor.state() {
            UiState::Loading => text("Loading...").into(),
            UiState::Error(e) => text(e).into(),
            UiState::Submitting(_) => text("Updating...").into(),
            UiState::Ready(doc) => {
                let form = self.editor.form();

                let mut content = column![
                    text(format!("Hello, {}", doc.name.as_deref().unwrap_or_default())).size(32),
                    row![
                        text("Name").width(LABEL_WIDTH),
                        text_input("...", &form.name).on_input(Message::NameInput),
                    ]
                    .spacing(8),
                    row![
                        text("Email").width(LABEL_WIDTH),
                        text_input("...", &form.email).on_input(Message::EmailInput),
                    ]
                    .spacing(8),
                ]
                .spacing(16);

                if let Some(e) = self.editor.submit_error() {
                    content = content.push(text(e).style(text::danger));
                }

                content = content.push(
                    row![
                        button("Logout")
                            .style(button::danger)
                            .on_press(Message::LogoutPressed),
                        space::horizontal(),
                        button("Submit").on_press_maybe(
                            self.editor.can_submit().then_some(Message::SubmitPressed)
                        ),
                    ]
                    .spacing(8),
                );

                container(content)
                    .padding(20)
                    .width(Length::Fill)
                    .into()
            }
        }
    }

    pub fn editor(&self) -> &ProfileEditor {
        &self.editor
    }

    fn track(&mut self, task: Task<Message>) -> Task<Message> {
        let (task, handle) = task.abortable();
        self.in_flight = Some(handle.abort_on_drop());
        task
    }
}
