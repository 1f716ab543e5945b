//! Node name sanitizing

/// Make an arbitrary string safe to use as a node or directory name.
///
/// Control characters are stripped, path separators become underscores and
/// colons are removed. An input that sanitizes to nothing yields `"unnamed"`
/// so callers always get a usable, stable name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| *c != ':')
        .map(|c| match c {
            '/' | '\\' => '_',
            other => other,
        })
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(sanitize_name("mouse12"), "mouse12");
        assert_eq!(sanitize_name("session 04"), "session 04");
    }

    #[test]
    fn test_separators_replaced() {
        assert_eq!(sanitize_name("video/cam0"), "video_cam0");
        assert_eq!(sanitize_name("video\\cam0"), "video_cam0");
    }

    #[test]
    fn test_colons_and_controls_removed() {
        assert_eq!(sanitize_name("run:1"), "run1");
        assert_eq!(sanitize_name("tab\there"), "tabhere");
    }

    #[test]
    fn test_empty_input_gets_stable_fallback() {
        assert_eq!(sanitize_name(""), "unnamed");
        assert_eq!(sanitize_name("  \t "), "unnamed");
        assert_eq!(sanitize_name("::"), "unnamed");
    }
}
