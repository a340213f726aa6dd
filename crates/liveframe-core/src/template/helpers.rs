//! Markup helpers for common elements.

use std::fmt;

use super::{escape_html, safe, Html, Safe};

/// HTTP method of a form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    #[default]
    Post,
}

impl fmt::Display for FormMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormMethod::Get => "get",
            FormMethod::Post => "post",
        })
    }
}

/// Attributes for [`form_for`].
#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    pub id: Option<String>,
    pub method: FormMethod,
    /// Event sent when the form is submitted.
    pub phx_submit: Option<String>,
    /// Event sent when any input changes.
    pub phx_change: Option<String>,
}

impl FormOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: FormMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn phx_submit(mut self, event: impl Into<String>) -> Self {
        self.phx_submit = Some(event.into());
        self
    }

    #[must_use]
    pub fn phx_change(mut self, event: impl Into<String>) -> Self {
        self.phx_change = Some(event.into());
        self
    }
}

/// Render an opening `<form>` tag.
///
/// Empty options are omitted. Every value is escaped.
#[must_use]
pub fn form_for(action: &str, options: &FormOptions) -> Html {
    crate::html!(
        "<form{} action=\"{}\" method=\"{}\"{}{}>",
        attribute("id", options.id.as_deref()),
        action,
        options.method.to_string(),
        attribute("phx-submit", options.phx_submit.as_deref()),
        attribute("phx-change", options.phx_change.as_deref())
    )
}

fn attribute(name: &str, value: Option<&str>) -> Option<Safe> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| safe(format!(" {name}=\"{}\"", escape_html(v))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_defaults_to_post() {
        let form = form_for("#", &FormOptions::default());
        assert_eq!(form.to_string(), r##"<form action="#" method="post">"##);
    }

    #[test]
    fn test_form_with_events() {
        let options = FormOptions::new()
            .id("search")
            .method(FormMethod::Get)
            .phx_submit("submit")
            .phx_change("suggest");
        assert_eq!(
            form_for("/search", &options).to_string(),
            r#"<form id="search" action="/search" method="get" phx-submit="submit" phx-change="suggest">"#
        );
    }

    #[test]
    fn test_form_escapes_values() {
        let options = FormOptions::new().phx_submit("a\"b");
        assert_eq!(
            form_for("/x?a=1&b=2", &options).to_string(),
            r#"<form action="/x?a=1&amp;b=2" method="post" phx-submit="a&quot;b">"#
        );
    }

    #[test]
    fn test_empty_option_is_omitted() {
        let options = FormOptions::new().id("");
        assert_eq!(form_for("#", &options).to_string(), r##"<form action="#" method="post">"##);
    }
}
