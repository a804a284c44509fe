use crate::error::FlowError;

/// Transport scheme named by an endpoint URL (§3, §6).
///
/// `Ref` covers the bare `id[;topicspec]` form used when a filter names a
/// peer by its declared id rather than a concrete `host:port` — the runner
/// resolves that id to the peer's actual listening endpoint at wiring time
/// (see DESIGN.md, "bare filter-id references").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Ipc,
    Ref,
}

/// One comma-separated topic-map entry after `;` (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSpec {
    /// Empty entry — default `main` only.
    Default,
    /// Bare topic name, passed through unrenamed.
    Topic(String),
    /// `in>out` rewrite.
    Rename { from: String, to: String },
    /// `*` — every topic, including reserved ones.
    Wildcard,
}

/// A parsed endpoint URL: `scheme://host[:port][/path][;topicspec,...][?]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    pub scheme: Scheme,
    /// Hostname (`Tcp`), filesystem path (`Ipc`), or peer filter id (`Ref`).
    pub authority: String,
    pub port: Option<u16>,
    pub topics: Vec<TopicSpec>,
    /// Trailing `?` anywhere in the URL — marks the source ephemeral (§4.3).
    pub ephemeral: bool,
}

impl EndpointUrl {
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        let mut s = raw.to_string();
        let ephemeral = if let Some(idx) = s.find('?') {
            s.remove(idx);
            true
        } else {
            false
        };

        let (scheme, rest) = if let Some(tail) = s.strip_prefix("tcp://") {
            (Scheme::Tcp, tail.to_string())
        } else if let Some(tail) = s.strip_prefix("ipc://") {
            (Scheme::Ipc, tail.to_string())
        } else {
            (Scheme::Ref, s.clone())
        };

        let (authority_part, topics_part) = match rest.find(';') {
            Some(idx) => (rest[..idx].to_string(), Some(rest[idx + 1..].to_string())),
            None => (rest, None),
        };

        let (authority, port) = match scheme {
            Scheme::Tcp => match authority_part.rsplit_once(':') {
                Some((host, port_str)) => {
                    let port = port_str
                        .parse::<u16>()
                        .map_err(|e| FlowError::config(format!("bad port in '{raw}': {e}")))?;
                    (host.to_string(), Some(port))
                }
                None => (authority_part, None),
            },
            Scheme::Ipc | Scheme::Ref => (authority_part, None),
        };

        if authority.is_empty() {
            return Err(FlowError::config(format!("empty host/id in endpoint url '{raw}'")));
        }

        let topics = match topics_part {
            None => vec![TopicSpec::Default],
            Some(spec) => spec
                .split(',')
                .map(|tok| parse_topic_spec(tok.trim()))
                .collect(),
        };

        Ok(Self { scheme, authority, port, topics, ephemeral })
    }

    /// Is this endpoint subscribed (directly or via `*`) to `wire_topic`, and
    /// if so, under what renamed local name?
    pub fn resolve(&self, wire_topic: &str) -> Option<String> {
        for spec in &self.topics {
            match spec {
                TopicSpec::Wildcard => return Some(wire_topic.to_string()),
                TopicSpec::Default if wire_topic == crate::topic::MAIN => {
                    return Some(crate::topic::MAIN.to_string());
                }
                TopicSpec::Topic(name) if name == wire_topic => return Some(name.clone()),
                // an empty `in` side (bare `;>out`) renames the *default*
                // topic, matching the `sources='A, B;>other'` join grammar.
                TopicSpec::Rename { from, to }
                    if from == wire_topic || (from.is_empty() && wire_topic == crate::topic::MAIN) =>
                {
                    return Some(to.clone());
                }
                _ => {}
            }
        }
        None
    }

    pub fn has_wildcard(&self) -> bool {
        self.topics.iter().any(|t| matches!(t, TopicSpec::Wildcard))
    }
}

fn parse_topic_spec(tok: &str) -> TopicSpec {
    if tok.is_empty() {
        TopicSpec::Default
    } else if tok == "*" {
        TopicSpec::Wildcard
    } else if let Some((from, to)) = tok.split_once('>') {
        TopicSpec::Rename { from: from.to_string(), to: to.to_string() }
    } else {
        TopicSpec::Topic(tok.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_tcp_url() {
        let u = EndpointUrl::parse("tcp://host:1234").unwrap();
        assert_eq!(u.scheme, Scheme::Tcp);
        assert_eq!(u.authority, "host");
        assert_eq!(u.port, Some(1234));
        assert_eq!(u.topics, vec![TopicSpec::Default]);
        assert!(!u.ephemeral);
    }

    #[test]
    fn parses_wildcard_ephemeral() {
        let u = EndpointUrl::parse("tcp://h?;*").unwrap();
        assert!(u.ephemeral);
        assert!(u.has_wildcard());
    }

    #[test]
    fn parses_rename_and_bare_topic_list() {
        let u = EndpointUrl::parse("tcp://h;main>other,aux").unwrap();
        assert_eq!(
            u.topics,
            vec![
                TopicSpec::Rename { from: "main".into(), to: "other".into() },
                TopicSpec::Topic("aux".into()),
            ]
        );
        assert_eq!(u.resolve("main"), Some("other".to_string()));
        assert_eq!(u.resolve("aux"), Some("aux".to_string()));
        assert_eq!(u.resolve("unrelated"), None);
    }

    #[test]
    fn bare_reference_has_no_scheme() {
        let u = EndpointUrl::parse("B;>other").unwrap();
        assert_eq!(u.scheme, Scheme::Ref);
        assert_eq!(u.authority, "B");
        assert_eq!(u.topics, vec![TopicSpec::Rename { from: String::new(), to: "other".into() }]);
    }

    #[test]
    fn default_topic_hides_reserved_without_wildcard() {
        let u = EndpointUrl::parse("tcp://h").unwrap();
        assert_eq!(u.resolve(crate::topic::METRICS), None);
        assert_eq!(u.resolve(crate::topic::MAIN), Some(crate::topic::MAIN.to_string()));
    }

    #[test]
    fn bare_rename_targets_the_default_topic() {
        let u = EndpointUrl::parse("B;>other").unwrap();
        assert_eq!(u.resolve(crate::topic::MAIN), Some("other".to_string()));
    }

    #[test]
    fn explicit_reserved_topic_name_is_allowed() {
        let u = EndpointUrl::parse("tcp://h;_metrics").unwrap();
        assert_eq!(u.resolve(crate::topic::METRICS), Some(crate::topic::METRICS.to_string()));
    }
}
