//! File-backed HTML templates with `{{key}}` placeholders.

use conducky_sanitize::escape_text;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::EmailError;

static TEMPLATE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("template name pattern is valid"));

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
});

pub fn is_valid_template_name(name: &str) -> bool {
    TEMPLATE_NAME.is_match(name)
}

/// Load `<dir>/<name>.html` and substitute escaped variables.
///
/// The name is checked against `[a-zA-Z0-9_-]+` and the resolved file (after
/// following symlinks) must still live inside `dir`. Unknown placeholders
/// render as empty strings.
pub async fn render_template(
    dir: &Path,
    name: &str,
    variables: &[(&str, &str)],
) -> Result<String, EmailError> {
    if !is_valid_template_name(name) {
        return Err(EmailError::InvalidTemplateName(name.to_string()));
    }

    let root = fs::canonicalize(dir).await.map_err(|err| match err.kind() {
        ErrorKind::NotFound => EmailError::TemplateNotFound(name.to_string()),
        _ => EmailError::TemplateRead(err),
    })?;

    let resolved = fs::canonicalize(root.join(format!("{name}.html")))
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => EmailError::TemplateNotFound(name.to_string()),
            _ => EmailError::TemplateRead(err),
        })?;

    if !resolved.starts_with(&root) {
        return Err(EmailError::TemplatePathOutsideAllowedDirectory);
    }

    let source = fs::read_to_string(&resolved).await?;
    Ok(substitute(&source, variables))
}

fn substitute(source: &str, variables: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(source, |caps: &Captures| {
            let key = &caps[1];
            variables
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| escape_text(value))
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn templates() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("greeting.html"),
            "<p>Hello {{name}}, visit {{ url }}{{missing}}</p>",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn renders_with_escaped_values() {
        let dir = templates();
        let html = render_template(
            dir.path(),
            "greeting",
            &[("name", "<b>Ana</b>"), ("url", "https://x.test/?a=1&b=2")],
        )
        .await
        .unwrap();

        assert_eq!(
            html,
            "<p>Hello &lt;b&gt;Ana&lt;/b&gt;, visit https://x.test/?a=1&amp;b=2</p>"
        );
    }

    #[tokio::test]
    async fn rejects_names_outside_the_allowed_alphabet() {
        let dir = templates();
        for name in ["", "../greeting", "a/b", "a\\b", "greeting.html", "na me", "é"] {
            let err = render_template(dir.path(), name, &[]).await.unwrap_err();
            assert!(
                matches!(err, EmailError::InvalidTemplateName(_)),
                "{name:?} should be rejected, got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn missing_template_is_not_found() {
        let dir = templates();
        let err = render_template(dir.path(), "absent", &[]).await.unwrap_err();
        assert!(matches!(err, EmailError::TemplateNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escaping_the_directory_is_rejected() {
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.html");
        std::fs::write(&secret, "top secret").unwrap();

        let dir = templates();
        std::os::unix::fs::symlink(&secret, dir.path().join("leak.html")).unwrap();

        let err = render_template(dir.path(), "leak", &[]).await.unwrap_err();
        assert!(matches!(err, EmailError::TemplatePathOutsideAllowedDirectory));
    }
}
