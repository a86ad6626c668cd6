//! Text templates for pull request titles, bodies and comments.
//!
//! Placeholders are written `{{name}}`. A placeholder whose name has no
//! variable is left in the output verbatim, so a typo shows up in the
//! rendered text rather than silently vanishing.
//!
//! Configs written for the older bridge keep working: event fields are also
//! available under their `.Change.Subject` style names, and the review
//! comment's `%state%`, `%status%` and `%pr%` markers are read as
//! placeholders.

use std::collections::HashMap;

use crate::config::{GerritConfig, GitHubConfig};
use crate::types::{CombinedStatus, PatchsetCreated, PullRequestHandle};

/// Older names for the event variables.
const LEGACY_EVENT_NAMES: &[(&str, &str)] = &[
    (".Change.ID", "change.id"),
    (".Change.Project", "change.project"),
    (".Change.Branch", "change.branch"),
    (".Change.Subject", "change.subject"),
    (".Change.CommitMessage", "change.commit-message"),
    (".Change.URL", "change.url"),
    (".Patchset.Ref", "patchset.ref"),
    (".Patchset.Revision", "patchset.revision"),
    (".Patchset.Number", "patchset.number"),
];

/// Review comment markers and the placeholders they stand for.
const LEGACY_REVIEW_MARKERS: &[(&str, &str)] = &[
    ("%state%", "{{state}}"),
    ("%status%", "{{status}}"),
    ("%pr%", "{{pr}}"),
];

/// Variables available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(HashMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables describing a patchset-created event.
    pub fn for_event(event: &PatchsetCreated) -> Self {
        let change = &event.change;
        let patch_set = &event.patch_set;
        let mut vars = Self::new();
        vars.insert("change.id", change.id.as_str());
        vars.insert("change.project", &change.project);
        vars.insert("change.branch", &change.branch);
        vars.insert("change.subject", &change.subject);
        vars.insert("change.commit-message", &change.commit_message);
        vars.insert("change.url", &change.url);
        vars.insert("patchset.ref", &patch_set.git_ref);
        vars.insert("patchset.revision", patch_set.revision.as_str());
        vars.insert("patchset.number", patch_set.number.to_string());
        for (legacy, name) in LEGACY_EVENT_NAMES {
            if let Some(value) = vars.get(name).map(str::to_owned) {
                vars.insert(*legacy, value);
            }
        }
        vars
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns a copy with one more variable set.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// A template source. Multi-line templates are configured as a list of
/// lines and joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Template {
            source: source.into(),
        }
    }

    pub fn from_lines(lines: &[String]) -> Self {
        Template::new(lines.join("\n"))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitutes every known `{{name}}` placeholder.
    pub fn render(&self, vars: &TemplateVars) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                // Unterminated; emit the remainder as-is.
                out.push_str(&rest[start..]);
                return out;
            };
            let name = after_open[..end].trim();
            match vars.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after_open[end + 2..];
        }

        out.push_str(rest);
        out
    }
}

/// All templates the workflow renders, built once from configuration.
#[derive(Debug, Clone)]
pub struct Templates {
    pub pr_title: Template,
    pub pr_body: Template,
    pub review_comment: Template,
    pub close_comment: Template,
}

impl Templates {
    pub fn from_config(github: &GitHubConfig, gerrit: &GerritConfig) -> Self {
        Templates {
            pr_title: Template::new(github.pull_request.title.clone()),
            pr_body: Template::from_lines(&github.pull_request.body),
            review_comment: Template::new(upgrade_review_markers(
                &gerrit.comment.join("\n"),
            )),
            close_comment: Template::from_lines(&github.close_comment),
        }
    }

    /// Variables for the review comment: the event plus `state`, `status`
    /// and `pr`.
    pub fn review_vars(
        event: &PatchsetCreated,
        status: &CombinedStatus,
        pr: &PullRequestHandle,
    ) -> TemplateVars {
        TemplateVars::for_event(event)
            .with("state", status.state.as_api_str())
            .with("status", status.details())
            .with("pr", pr.html_url.clone())
    }

    /// Variables for the closing comment: the event plus `pr`.
    pub fn close_vars(event: &PatchsetCreated, pr: &PullRequestHandle) -> TemplateVars {
        TemplateVars::for_event(event).with("pr", pr.html_url.clone())
    }
}

fn upgrade_review_markers(source: &str) -> String {
    LEGACY_REVIEW_MARKERS
        .iter()
        .fold(source.to_string(), |source, (marker, placeholder)| {
            source.replace(marker, placeholder)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars::new()
            .with("change.subject", "[TASK] Fix")
            .with("pr", "https://github.com/o/r/pull/7")
    }

    #[test]
    fn substitutes_known_placeholders() {
        let t = Template::new("PR {{pr}} for {{change.subject}}");
        assert_eq!(
            t.render(&vars()),
            "PR https://github.com/o/r/pull/7 for [TASK] Fix"
        );
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let t = Template::new("{{ change.subject }}");
        assert_eq!(t.render(&vars()), "[TASK] Fix");
    }

    #[test]
    fn unknown_placeholder_is_left_verbatim() {
        let t = Template::new("a {{nope}} b {{pr}}");
        assert_eq!(t.render(&vars()), "a {{nope}} b https://github.com/o/r/pull/7");
    }

    #[test]
    fn unterminated_placeholder_is_left_verbatim() {
        let t = Template::new("x {{pr}} {{pr");
        assert_eq!(t.render(&vars()), "x https://github.com/o/r/pull/7 {{pr");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let vars = TemplateVars::new().with("a", "{{b}}").with("b", "nope");
        assert_eq!(Template::new("{{a}}").render(&vars), "{{b}}");
    }

    #[test]
    fn lines_are_joined_with_newlines() {
        let t = Template::from_lines(&["one".to_string(), "{{pr}}".to_string()]);
        assert_eq!(t.render(&vars()), "one\nhttps://github.com/o/r/pull/7");
    }

    #[test]
    fn event_variables() {
        let vars = TemplateVars::for_event(&crate::test_utils::sample_event());
        let t = Template::new("{{change.project}}@{{change.branch}} ps{{patchset.number}} {{patchset.ref}}");
        assert_eq!(
            t.render(&vars),
            "Packages/TYPO3.CMS@master ps3 refs/changes/10/40410/3"
        );
        assert_eq!(vars.get("change.id"), Some(crate::test_utils::CHANGE_ID));
    }

    #[test]
    fn older_event_names_still_render() {
        let vars = TemplateVars::for_event(&crate::test_utils::sample_event());
        let t = Template::new("{{.Change.Subject}} ({{.Patchset.Number}})");
        assert_eq!(t.render(&vars), format!("{} (3)", vars.get("change.subject").unwrap()));
    }

    #[test]
    fn percent_markers_become_placeholders() {
        assert_eq!(
            upgrade_review_markers("Build %state%: %pr%\n%status%"),
            "Build {{state}}: {{pr}}\n{{status}}"
        );
        assert_eq!(upgrade_review_markers("100% done"), "100% done");
    }

    #[test]
    fn empty_template_renders_empty() {
        assert_eq!(Template::from_lines(&[]).render(&vars()), "");
    }
}
