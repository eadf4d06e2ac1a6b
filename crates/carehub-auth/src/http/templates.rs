//! Server-rendered pages for the authorize flow.
//!
//! Every form posts back to the current URL, so the authorize query string
//! travels with each submission. The hidden `page` field names the page the
//! form belongs to.

use crate::flow::{Page, PageView};
use crate::types::{Facility, Program};

/// Shared CSS for all flow pages.
const STYLES: &str = r#"
:root {
    --primary: #0f766e;
    --primary-dark: #115e59;
    --danger: #b91c1c;
    --danger-bg: #fee2e2;
    --notice-bg: #e0f2fe;
    --surface: #ffffff;
    --background: #f1f5f9;
    --text: #0f172a;
    --text-muted: #64748b;
    --border: #cbd5e1;
    --radius: 8px;
}

* { margin: 0; padding: 0; box-sizing: border-box; }

body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: var(--background);
    color: var(--text);
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
    line-height: 1.5;
}

.card {
    width: 100%;
    max-width: 400px;
    background: var(--surface);
    border: 1px solid var(--border);
    border-radius: var(--radius);
    padding: 2rem;
}

.card-title { font-size: 1.25rem; font-weight: 600; margin-bottom: 1.25rem; }

.alert { padding: 0.75rem; border-radius: var(--radius); margin-bottom: 1rem; font-size: 0.875rem; }
.alert-error { background: var(--danger-bg); color: var(--danger); }
.alert-notice { background: var(--notice-bg); }

.form-group { margin-bottom: 1rem; }
.form-label { display: block; font-size: 0.875rem; margin-bottom: 0.25rem; color: var(--text-muted); }
.form-input {
    width: 100%;
    padding: 0.625rem;
    border: 1px solid var(--border);
    border-radius: var(--radius);
    font-size: 1rem;
}

.choice {
    display: flex;
    align-items: center;
    gap: 0.75rem;
    padding: 0.75rem;
    border: 1px solid var(--border);
    border-radius: var(--radius);
    margin-bottom: 0.5rem;
    cursor: pointer;
}

.empty { color: var(--text-muted); font-size: 0.875rem; margin-bottom: 1rem; }

.btn {
    width: 100%;
    padding: 0.75rem;
    border: none;
    border-radius: var(--radius);
    background: var(--primary);
    color: #fff;
    font-size: 1rem;
    cursor: pointer;
}
.btn:hover { background: var(--primary-dark); }

.error-code { font-family: monospace; color: var(--text-muted); margin-top: 1rem; }
"#;

fn html_page(title: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + STYLES.len() + 256);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"utf-8\">\n");
    html.push_str("    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("    <title>");
    html.push_str(&html_escape(title));
    html.push_str(" - CareHub</title>\n    <style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n<div class=\"card\">\n");
    html.push_str(content);
    html.push_str("\n</div>\n</body>\n</html>");
    html
}

fn alert(content: &mut String, class: &str, message: Option<&str>) {
    if let Some(message) = message {
        content.push_str("<div class=\"alert ");
        content.push_str(class);
        content.push_str("\">");
        content.push_str(&html_escape(message));
        content.push_str("</div>\n");
    }
}

fn form_open(content: &mut String, page: Page) {
    content.push_str("<form method=\"POST\">\n");
    content.push_str("<input type=\"hidden\" name=\"page\" value=\"");
    content.push_str(page.as_str());
    content.push_str("\">\n");
}

/// Renders any flow page.
#[must_use]
pub fn render_page(view: &PageView) -> String {
    match view {
        PageView::Login { error, notice } => render_login(error.as_deref(), notice.as_deref()),
        PageView::ChooseProgram { programs, error } => {
            render_program_picker(programs, error.as_deref())
        }
        PageView::ChooseFacility { facilities, error } => {
            render_facility_picker(facilities, error.as_deref())
        }
    }
}

/// Renders the username/PIN form.
#[must_use]
pub fn render_login(error: Option<&str>, notice: Option<&str>) -> String {
    let mut content = String::with_capacity(2048);
    content.push_str("<div class=\"card-title\">Sign in to CareHub</div>\n");
    alert(&mut content, "alert-notice", notice);
    alert(&mut content, "alert-error", error);

    form_open(&mut content, Page::Login);
    content.push_str("<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"username\">Username</label>\n");
    content.push_str("<input type=\"text\" id=\"username\" name=\"username\" class=\"form-input\" ");
    content.push_str("required autocomplete=\"username\">\n</div>\n");
    content.push_str("<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"pin\">PIN</label>\n");
    content.push_str("<input type=\"password\" id=\"pin\" name=\"pin\" class=\"form-input\" ");
    content.push_str("inputmode=\"numeric\" required autocomplete=\"current-password\">\n</div>\n");
    content.push_str("<button type=\"submit\" class=\"btn\">Sign in</button>\n</form>");

    html_page("Sign In", &content)
}

fn render_choices<'a>(
    content: &mut String,
    field: &str,
    empty: &str,
    choices: impl ExactSizeIterator<Item = (&'a str, &'a str)>,
) {
    if choices.len() == 0 {
        content.push_str("<p class=\"empty\">");
        content.push_str(empty);
        content.push_str("</p>\n");
        return;
    }
    for (i, (id, name)) in choices.enumerate() {
        content.push_str("<label class=\"choice\"><input type=\"radio\" name=\"");
        content.push_str(field);
        content.push_str("\" value=\"");
        content.push_str(&html_escape(id));
        content.push('"');
        if i == 0 {
            content.push_str(" checked");
        }
        content.push('>');
        content.push_str(&html_escape(name));
        content.push_str("</label>\n");
    }
}

/// Renders the program picker.
#[must_use]
pub fn render_program_picker(programs: &[Program], error: Option<&str>) -> String {
    let mut content = String::with_capacity(2048);
    content.push_str("<div class=\"card-title\">Choose a program</div>\n");
    alert(&mut content, "alert-error", error);

    form_open(&mut content, Page::ChooseProgram);
    render_choices(
        &mut content,
        "program",
        "You are not a member of any program.",
        programs.iter().map(|p| (p.id.as_str(), p.name.as_str())),
    );
    content.push_str("<button type=\"submit\" class=\"btn\">Continue</button>\n</form>");

    html_page("Choose Program", &content)
}

/// Renders the facility picker.
#[must_use]
pub fn render_facility_picker(facilities: &[Facility], error: Option<&str>) -> String {
    let mut content = String::with_capacity(2048);
    content.push_str("<div class=\"card-title\">Choose a facility</div>\n");
    alert(&mut content, "alert-error", error);

    form_open(&mut content, Page::ChooseFacility);
    render_choices(
        &mut content,
        "facility",
        "This program has no facilities.",
        facilities.iter().map(|f| (f.id.as_str(), f.name.as_str())),
    );
    content.push_str("<button type=\"submit\" class=\"btn\">Continue</button>\n</form>");

    html_page("Choose Facility", &content)
}

/// Renders an authorize error that cannot be redirected to the client.
#[must_use]
pub fn render_error_page(error_code: &str, error_description: &str) -> String {
    let mut content = String::with_capacity(512);
    content.push_str("<div class=\"card-title\">Authorization error</div>\n");
    content.push_str("<p>");
    content.push_str(&html_escape(error_description));
    content.push_str("</p>\n<div class=\"error-code\">");
    content.push_str(&html_escape(error_code));
    content.push_str("</div>");

    html_page("Error", &content)
}

/// Simple HTML escaping to prevent XSS.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
