use iced::{
    widget::{button, column, row, text, text_input, Space},
    Element, Length,
};

use crate::{application::Intent, domain::ServiceSnapshot};

/// Main view state
pub struct ServiceView {
    pub service_id: String,
    pub status_message: String,
    pub error_message: Option<String>,
    pub logs: String,
}

impl ServiceView {
    pub fn new(service_id: String) -> Self {
        let status_message = ServiceSnapshot::unseen(&service_id).status_text();
        Self {
            service_id,
            status_message,
            error_message: None,
            logs: String::new(),
        }
    }

    /// Shows `snapshot` if it belongs to the service currently typed in.
    pub fn show(&mut self, snapshot: &ServiceSnapshot) {
        if snapshot.service_id != self.service_id.trim() {
            return;
        }
        self.status_message = snapshot.status_text();
        self.error_message = snapshot.last_error.as_ref().map(ToString::to_string);
    }
}

#[derive(Debug, Clone)]
pub enum ServiceMessage {
    ServiceIdChanged(String),
    IntentPressed(Intent),
}

impl ServiceView {
    pub fn update(&mut self, message: ServiceMessage) {
        match message {
            ServiceMessage::ServiceIdChanged(id) => {
                self.service_id = id;
                self.logs.clear();
            }
            ServiceMessage::IntentPressed(_) => {
                // Will be handled by the app
            }
        }
    }

    pub fn view(&self) -> Element<'_, ServiceMessage> {
        let actions = row![
            action_button("Download", Intent::Download),
            action_button("Run", Intent::Run),
            action_button("Stop", Intent::Stop),
            action_button("Delete", Intent::Delete),
            action_button("Logs", Intent::ShowLogs),
        ]
        .spacing(10);

        column![
            text("Service Console").size(32),
            Space::new().height(Length::Fixed(20.0)),
            text("Service ID:").size(16),
            text_input("Enter service id...", &self.service_id)
                .on_input(ServiceMessage::ServiceIdChanged)
                .padding(10),
            Space::new().height(Length::Fixed(10.0)),
            actions,
            Space::new().height(Length::Fixed(10.0)),
            text(&self.status_message).size(14),
            text(self.error_message.as_deref().unwrap_or_default()).size(14),
            Space::new().height(Length::Fixed(20.0)),
            text(&self.logs).size(12),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

fn action_button(label: &str, intent: Intent) -> iced::widget::Button<'_, ServiceMessage> {
    button(text(label))
        .on_press(ServiceMessage::IntentPressed(intent))
        .padding([10, 20])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LifecycleError, ServiceState};

    #[test]
    fn test_show_ignores_other_services() {
        let mut view = ServiceView::new("alice".to_string());
        let mut snapshot = ServiceSnapshot::unseen("bob");
        snapshot.state = ServiceState::Running;

        view.show(&snapshot);
        assert_eq!(view.status_message, "not downloaded");

        snapshot.service_id = "alice".to_string();
        snapshot.last_error = Some(LifecycleError::Busy);
        view.show(&snapshot);
        assert_eq!(view.status_message, "running");
        assert_eq!(
            view.error_message.as_deref(),
            Some("Another operation is still pending for this service")
        );
    }
}
