//! Backend selection, §4.6.3: explicit flag, then spec annotation, then id-glob pattern, then
//! the configured default. The resolved tag is what `create` persists into the state record.

use crate::spec::Spec;
use crate::state::BackendTag;
use std::str::FromStr;

/// What the caller already knows before routing: an optional explicit choice plus the id the
/// glob patterns match against.
#[derive(Clone, Debug, Default)]
pub struct RouteRequest {
    pub explicit: Option<BackendTag>,
}

pub struct Router<'a> {
    id_patterns: &'a [(String, String)],
    default_backend: &'a str,
}

impl<'a> Router<'a> {
    pub fn new(id_patterns: &'a [(String, String)], default_backend: &'a str) -> Self {
        Self {
            id_patterns,
            default_backend,
        }
    }

    /// Resolve a backend for `id`/`spec` per the §4.6.3 precedence order.
    pub fn resolve(&self, id: &str, spec: &Spec, request: &RouteRequest) -> Option<BackendTag> {
        if let Some(tag) = request.explicit {
            return Some(tag);
        }

        if let Some(tag) = self.from_annotation(spec) {
            return Some(tag);
        }

        for (pattern, backend) in self.id_patterns {
            if glob_match(pattern, id) {
                if let Some(tag) = parse_tag(backend) {
                    return Some(tag);
                }
            }
        }

        parse_tag(self.default_backend)
    }

    fn from_annotation(&self, spec: &Spec) -> Option<BackendTag> {
        let annotations = spec.annotations().as_ref()?;
        let value = annotations.get("runtime")?;
        parse_tag(value)
    }
}

fn parse_tag(name: &str) -> Option<BackendTag> {
    BackendTag::from_str(name).ok()
}

/// Minimal glob matcher supporting `*` as "any run of characters"; enough for id prefixes like
/// `lxc-*` or `kube-*` without pulling in a dedicated crate for a single wildcard.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[u8], text: &[u8]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some(b'*') => {
                inner(&pattern[1..], text)
                    || (!text.is_empty() && inner(pattern, &text[1..]))
            }
            Some(&c) => text.first().map_or(false, |&t| t == c) && inner(&pattern[1..], &text[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn spec_with_annotation(key: &str, value: &str) -> Spec {
        let mut annotations = HashMap::new();
        annotations.insert(key.to_string(), value.to_string());
        crate::spec::SpecBuilder::default()
            .annotations(annotations)
            .build()
            .unwrap()
    }

    #[test]
    fn glob_matches_prefix_wildcard() {
        assert!(glob_match("lxc-*", "lxc-web"));
        assert!(!glob_match("lxc-*", "kube-web"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn explicit_choice_wins_over_everything() {
        let router = Router::new(&[], "crun");
        let spec = spec_with_annotation("runtime", "lxc");
        let request = RouteRequest {
            explicit: Some(BackendTag::Vm),
        };
        assert_eq!(router.resolve("anything", &spec, &request), Some(BackendTag::Vm));
    }

    #[test]
    fn annotation_wins_over_glob_and_default() {
        let patterns = vec![("*".to_string(), "vm".to_string())];
        let router = Router::new(&patterns, "crun");
        let spec = spec_with_annotation("runtime", "lxc");
        let request = RouteRequest::default();
        assert_eq!(router.resolve("anything", &spec, &request), Some(BackendTag::Lxc));
    }

    #[test]
    fn glob_pattern_wins_over_default() {
        let patterns = vec![("lxc-*".to_string(), "lxc".to_string())];
        let router = Router::new(&patterns, "crun");
        let spec = Spec::default_skeleton();
        let request = RouteRequest::default();
        assert_eq!(router.resolve("lxc-web", &spec, &request), Some(BackendTag::Lxc));
        assert_eq!(router.resolve("other", &spec, &request), Some(BackendTag::Crun));
    }

    #[test]
    fn falls_back_to_default_when_nothing_else_matches() {
        let router = Router::new(&[], "crun");
        let spec = Spec::default_skeleton();
        let request = RouteRequest::default();
        assert_eq!(router.resolve("anything", &spec, &request), Some(BackendTag::Crun));
    }
}
