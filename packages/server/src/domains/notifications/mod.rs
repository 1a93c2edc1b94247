pub mod dispatcher;
pub mod models;
pub mod templates;

pub use dispatcher::NotificationDispatcher;
pub use models::{Notification, TemplateFields};
pub use templates::{render_notification, NotificationLinks};
