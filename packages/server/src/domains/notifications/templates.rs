//! Email rendering for completion notifications.

use super::models::TemplateFields;
use crate::kernel::traits::RenderedEmail;
use uuid::Uuid;

/// Links embedded in every notification email.
#[derive(Debug, Clone)]
pub struct NotificationLinks {
    pub results_url_base: String,
    pub manage_schedules_url: String,
    pub unsubscribe_url: String,
    pub preferences_url: String,
}

impl NotificationLinks {
    /// Derive the standard link set from the application base URL.
    pub fn from_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            results_url_base: format!("{base}/jobs"),
            manage_schedules_url: format!("{base}/schedules"),
            unsubscribe_url: format!("{base}/notifications/unsubscribe"),
            preferences_url: format!("{base}/notifications/preferences"),
        }
    }

    /// Deep link to one job's results.
    pub fn results_url(&self, job_id: Uuid) -> String {
        format!("{}/{}", self.results_url_base, job_id)
    }
}

/// Render the subject, text, and HTML variants for a notification.
pub fn render_notification(recipient: &str, fields: &TemplateFields) -> RenderedEmail {
    RenderedEmail {
        to: recipient.to_string(),
        subject: fields.subject.clone(),
        text: render_text(fields),
        html: Some(render_html(fields)),
    }
}

fn render_text(fields: &TemplateFields) -> String {
    let mut body = format!(
        "{greeting}\n\n\
         \"{name}\" finished with status: {status} (took {time}).\n",
        greeting = fields.greeting,
        name = fields.schedule_name,
        status = fields.status,
        time = fields.execution_time,
    );

    if let Some(summary) = &fields.summary {
        body.push_str(&format!("\nSummary:\n{summary}\n"));
    }
    if let Some(error) = &fields.error_message {
        body.push_str(&format!("\nError: {error}\n"));
    }

    body.push_str(&format!(
        "\nView results: {results}\n\
         Manage schedules: {manage}\n\n\
         Unsubscribe: {unsubscribe}\n\
         Preferences: {preferences}\n",
        results = fields.results_url,
        manage = fields.manage_schedules_url,
        unsubscribe = fields.unsubscribe_url,
        preferences = fields.preferences_url,
    ));

    body
}

fn render_html(fields: &TemplateFields) -> String {
    let summary_block = fields
        .summary
        .as_ref()
        .map(|s| format!("<p><strong>Summary</strong></p><blockquote>{}</blockquote>", escape(s)))
        .unwrap_or_default();
    let error_block = fields
        .error_message
        .as_ref()
        .map(|e| format!("<p style=\"color:#b91c1c\"><strong>Error:</strong> {}</p>", escape(e)))
        .unwrap_or_default();

    format!(
        "<html><body>\
         <p>{greeting}</p>\
         <p>&ldquo;{name}&rdquo; finished with status: <strong>{status}</strong> (took {time}).</p>\
         {summary_block}{error_block}\
         <p><a href=\"{results}\">View results</a> &middot; <a href=\"{manage}\">Manage schedules</a></p>\
         <p style=\"font-size:12px;color:#6b7280\">\
         <a href=\"{unsubscribe}\">Unsubscribe</a> &middot; <a href=\"{preferences}\">Notification preferences</a>\
         </p>\
         </body></html>",
        greeting = escape(&fields.greeting),
        name = escape(&fields.schedule_name),
        status = escape(&fields.status),
        time = escape(&fields.execution_time),
        results = fields.results_url,
        manage = fields.manage_schedules_url,
        unsubscribe = fields.unsubscribe_url,
        preferences = fields.preferences_url,
    )
}

/// Minimal HTML escaping for user-influenced fields.
fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> TemplateFields {
        TemplateFields {
            subject: "Your document \"report.pdf\" is ready".into(),
            greeting: "Hi there,".into(),
            schedule_name: "report.pdf".into(),
            status: "completed".into(),
            execution_time: "2.5s".into(),
            summary: Some("All good".into()),
            error_message: None,
            results_url: "https://app.example.com/jobs/abc".into(),
            manage_schedules_url: "https://app.example.com/schedules".into(),
            unsubscribe_url: "https://app.example.com/notifications/unsubscribe".into(),
            preferences_url: "https://app.example.com/notifications/preferences".into(),
        }
    }

    #[test]
    fn test_text_variant_contains_all_links() {
        let email = render_notification("user@example.com", &fields());
        assert!(email.text.contains("https://app.example.com/jobs/abc"));
        assert!(email.text.contains("unsubscribe"));
        assert!(email.text.contains("preferences"));
    }

    #[test]
    fn test_html_escapes_user_content() {
        let mut f = fields();
        f.schedule_name = "<script>alert(1)</script>.pdf".into();
        let email = render_notification("user@example.com", &f);
        let html = email.html.unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_error_rendered_when_present() {
        let mut f = fields();
        f.summary = None;
        f.error_message = Some("timeout".into());
        let email = render_notification("user@example.com", &f);
        assert!(email.text.contains("Error: timeout"));
    }
}
