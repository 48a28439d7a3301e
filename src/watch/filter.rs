// src/watch/filter.rs

use std::fmt;
use std::sync::Arc;

use crate::config::model::WatchRule;

/// Include predicate handed to the watcher: `(relative_path, is_dir)`.
pub type WatchPredicate = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;

impl WatchRule {
    /// True if `rel` is one of the include paths or lies below one.
    pub fn covers(&self, rel: &str) -> bool {
        self.include_paths.iter().any(|inc| is_under(rel, inc))
    }

    /// True if `rel` is a strict ancestor directory of an include path, so
    /// it has to be watched to see the include path appear.
    pub fn leads_to(&self, rel: &str) -> bool {
        self.include_paths
            .iter()
            .any(|inc| !inc.is_empty() && (rel.is_empty() || inc.starts_with(&format!("{rel}/"))))
    }

    pub fn excludes(&self, rel: &str) -> bool {
        self.exclude_path.as_ref().is_some_and(|re| re.is_match(rel))
    }

    pub fn accepts_dir(&self, rel: &str) -> bool {
        (self.covers(rel) && !self.excludes(rel)) || self.leads_to(rel)
    }

    pub fn accepts_file(&self, rel: &str) -> bool {
        if !self.covers(rel) || self.excludes(rel) {
            return false;
        }
        self.include_file.as_ref().is_none_or(|re| re.is_match(rel))
    }

    /// Whether a batch touching `paths` should (re)start the deploy command.
    ///
    /// Without a deploy command nothing triggers. Without a trigger pattern
    /// any non-empty batch does.
    pub fn deploy_triggered_by<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> bool {
        if self.deploy_cmd.is_none() {
            return false;
        }
        let mut paths = paths.into_iter().peekable();
        match &self.deploy_path {
            None => paths.peek().is_some(),
            Some(re) => paths.any(|p| re.is_match(p)),
        }
    }
}

fn is_under(rel: &str, include: &str) -> bool {
    include.is_empty()
        || rel == include
        || (rel.starts_with(include) && rel.as_bytes().get(include.len()) == Some(&b'/'))
}

/// All watch rules of a client, in config order.
#[derive(Clone, Default)]
pub struct WatchFilter {
    rules: Arc<Vec<WatchRule>>,
}

impl fmt::Debug for WatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchFilter")
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl WatchFilter {
    pub fn new(rules: Vec<WatchRule>) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Should the watcher subscribe to / report this path?
    ///
    /// The base directory itself (`""`) is always accepted.
    pub fn is_watched(&self, rel: &str, is_dir: bool) -> bool {
        if rel.is_empty() || rel == "." {
            return true;
        }
        if is_dir {
            self.rules.iter().any(|r| r.accepts_dir(rel))
        } else {
            self.rules.iter().any(|r| r.accepts_file(rel))
        }
    }

    /// Index of the first rule whose include set covers `rel`.
    pub fn rule_for(&self, rel: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.covers(rel))
    }

    pub fn rule(&self, index: usize) -> Option<&WatchRule> {
        self.rules.get(index)
    }

    /// Turn the filter into the predicate form the watcher consumes.
    pub fn predicate(&self) -> WatchPredicate {
        let filter = self.clone();
        Arc::new(move |rel: &str, is_dir: bool| filter.is_watched(rel, is_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn rule(paths: &[&str]) -> WatchRule {
        WatchRule {
            include_paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn files_under_include_paths_only() {
        let filter = WatchFilter::new(vec![rule(&["src"])]);
        assert!(filter.is_watched("src/main.go", false));
        assert!(filter.is_watched("src/pkg/util.go", false));
        assert!(!filter.is_watched("app.jar", false));
        assert!(!filter.is_watched("srcx/main.go", false));
    }

    #[test]
    fn ancestors_of_include_paths_are_watched_dirs() {
        let filter = WatchFilter::new(vec![rule(&["svc/target/app.jar"])]);
        assert!(filter.is_watched("svc", true));
        assert!(filter.is_watched("svc/target", true));
        assert!(!filter.is_watched("svc/src", true));
        assert!(filter.is_watched("svc/target/app.jar", false));
        assert!(!filter.is_watched("svc/target/other.jar", false));
    }

    #[test]
    fn include_and_exclude_regexes() {
        let mut r = rule(&[""]);
        r.include_file = Some(Regex::new(r"\.(go|yml)$").unwrap());
        r.exclude_path = Some(Regex::new(r"(__|^vendor)").unwrap());
        let filter = WatchFilter::new(vec![r]);

        assert!(filter.is_watched("cmd/main.go", false));
        assert!(!filter.is_watched("README.md", false));
        assert!(!filter.is_watched("cmd/main.go___jb_tmp__", false));
        assert!(!filter.is_watched("vendor", true));
        assert!(filter.is_watched("cmd", true));
    }

    #[test]
    fn first_covering_rule_wins() {
        let filter = WatchFilter::new(vec![rule(&["a"]), rule(&["a/b", "c"])]);
        assert_eq!(filter.rule_for("a/b/x"), Some(0));
        assert_eq!(filter.rule_for("c/y"), Some(1));
        assert_eq!(filter.rule_for("d"), None);
    }

    #[test]
    fn deploy_trigger_pattern() {
        let mut r = rule(&[""]);
        assert!(!r.deploy_triggered_by(["a.jar"]));

        r.deploy_cmd = Some("run".into());
        assert!(r.deploy_triggered_by(["a.txt"]));
        assert!(!r.deploy_triggered_by(std::iter::empty::<&str>()));

        r.deploy_path = Some(Regex::new(r"\.jar$").unwrap());
        assert!(!r.deploy_triggered_by(["a.txt"]));
        assert!(r.deploy_triggered_by(["a.txt", "build/a.jar"]));
    }
}
