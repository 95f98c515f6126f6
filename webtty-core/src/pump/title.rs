//! Window title rendering

use crate::backend::ContainerInfo;

/// Default window title template
pub const DEFAULT_TITLE_FORMAT: &str = "{name} - {short_id}@{location}";

/// Render `format` for `container`
///
/// Recognised placeholders: `{name}`, `{id}`, `{short_id}`, `{image}`,
/// `{location}`. Anything else is left as written.
pub fn render_title(format: &str, container: &ContainerInfo) -> String {
    let name = container.name.trim_start_matches('/');
    format
        .replace("{name}", name)
        .replace("{short_id}", container.short_id())
        .replace("{id}", &container.id)
        .replace("{image}", &container.image)
        .replace("{location}", container.location_or_local())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_default_format() {
        let container = ContainerInfo {
            id: "0123456789abcdef".into(),
            name: "/web".into(),
            ..Default::default()
        };
        assert_eq!(
            render_title(DEFAULT_TITLE_FORMAT, &container),
            "web - 0123456789ab@127.0.0.1"
        );
    }

    #[test]
    fn uses_remote_location() {
        let container = ContainerInfo {
            id: "abc".into(),
            name: "db".into(),
            location: "10.0.0.5:8080".into(),
            ..Default::default()
        };
        assert_eq!(render_title("{name}@{location}", &container), "db@10.0.0.5:8080");
    }

    #[test]
    fn unknown_placeholders_untouched() {
        let container = ContainerInfo::default();
        assert_eq!(render_title("{nope}", &container), "{nope}");
    }
}
