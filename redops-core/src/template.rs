//! `{{var}}` command templating.
//!
//! Step commands and conditions embed placeholders resolved against the
//! task context (and creation inputs). Rendering is a single explicit pass
//! that reports which placeholders stayed unresolved, so callers decide
//! what an incomplete render means (a skipped step, a command launched
//! as-is) instead of pattern-matching for leftover `{{` markers.

use std::collections::BTreeMap;

/// Outcome of rendering a template against a variable map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Placeholder names that had no value, in order of first appearance.
    pub unresolved: Vec<String>,
}

impl Rendered {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// A condition is ready when it resolved fully and is non-blank.
    pub fn is_ready_condition(&self) -> bool {
        self.is_complete() && !self.text.trim().is_empty()
    }
}

/// Replace every `{{key}}` placeholder with its value from `vars`.
/// Unknown placeholders are left verbatim and reported.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Rendered {
    let mut text = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        text.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key) {
                    Some(value) => text.push_str(value),
                    None => {
                        text.push_str("{{");
                        text.push_str(key);
                        text.push_str("}}");
                        if !unresolved.iter().any(|u| u == key) {
                            unresolved.push(key.to_string());
                        }
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated marker, copy through.
                text.push_str("{{");
                rest = after;
            }
        }
    }
    text.push_str(rest);

    Rendered { text, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let r = render("nmap -sV {{target}} -p {{ports}}", &vars(&[
            ("target", "10.0.0.1"),
            ("ports", "1-1024"),
        ]));
        assert_eq!(r.text, "nmap -sV 10.0.0.1 -p 1-1024");
        assert!(r.is_complete());
    }

    #[test]
    fn reports_unresolved_placeholders_once() {
        let r = render("{{a}} {{b}} {{a}}", &vars(&[("b", "x")]));
        assert_eq!(r.text, "{{a}} x {{a}}");
        assert_eq!(r.unresolved, vec!["a".to_string()]);
    }

    #[test]
    fn blank_render_is_not_a_ready_condition() {
        let r = render("{{dc_ip}}", &vars(&[("dc_ip", "   ")]));
        assert!(r.is_complete());
        assert!(!r.is_ready_condition());

        let r = render("{{dc_ip}}", &vars(&[]));
        assert!(!r.is_ready_condition());
    }

    #[test]
    fn tolerates_unterminated_marker() {
        let r = render("echo {{oops", &vars(&[]));
        assert_eq!(r.text, "echo {{oops");
        assert!(r.unresolved.is_empty());
    }
}
