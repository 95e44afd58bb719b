mod api;
mod app;
mod application;
mod domain;
mod ui;
mod utils;

use iced::window;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> iced::Result {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "service_console=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = app::AppConfig::from_env();
    let adapter = match app::build_adapter(&config) {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::error!(error = %e, "cannot reach service manager");
            std::process::exit(1);
        }
    };
    let service_id = config.service_id;

    iced::application(
        move || app::ServiceApp::new(adapter.clone(), service_id.clone()),
        app::update,
        app::view,
    )
    .title("Service Console")
    .window(window::Settings {
        size: iced::Size::new(560.0, 480.0),
        ..Default::default()
    })
    .run()
}
