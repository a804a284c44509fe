use std::collections::{HashMap, HashSet};

use flowmesh_core::endpoint::{Scheme, TopicSpec};
use flowmesh_core::{EndpointUrl, FilterConfig};

use crate::error::RunnerError;

/// Resolves every bare filter-id reference (`Scheme::Ref`, e.g. `B;>other`)
/// in each filter's `sources` against its peers' declared outputs, and
/// builds the upstream/downstream dependency graph used by `prop_exit`
/// (§4.6) — both derived from the same peer address book, built once before
/// any worker connects anything (see `flowmesh_core::endpoint`'s doc comment
/// on `Scheme::Ref`: "the runner resolves that id to the peer's actual
/// listening endpoint at wiring time").
pub fn resolve_references(configs: &mut [FilterConfig]) -> Result<DependencyGraph, RunnerError> {
    let mut seen = HashSet::new();
    for cfg in configs.iter() {
        if !seen.insert(cfg.id.clone()) {
            return Err(RunnerError::DuplicateId(cfg.id.clone()));
        }
    }

    // id -> its own first concrete (non-Ref) output endpoint, topic-map
    // stripped, since that part comes from whichever URL *references* it.
    let mut addresses: HashMap<String, String> = HashMap::new();
    for cfg in configs.iter() {
        for raw in &cfg.outputs {
            let url = EndpointUrl::parse(raw)?;
            if let Some(addr) = bare_address(&url) {
                addresses.insert(cfg.id.clone(), addr);
                break;
            }
        }
    }

    let mut graph = DependencyGraph::new(configs.iter().map(|c| c.id.clone()));

    for cfg in configs.iter_mut() {
        for raw in cfg.sources.iter_mut() {
            let url = EndpointUrl::parse(raw)?;
            let peer_id = match url.scheme {
                Scheme::Ref => {
                    let addr = addresses.get(&url.authority).ok_or_else(|| RunnerError::UnknownPeer(url.authority.clone()))?;
                    *raw = rewrite_with_address(&url, addr)?;
                    Some(url.authority.clone())
                }
                Scheme::Tcp | Scheme::Ipc => {
                    let this_addr = bare_address(&url);
                    this_addr.and_then(|addr| addresses.iter().find(|(_, a)| **a == addr).map(|(id, _)| id.clone()))
                }
            };
            if let Some(peer_id) = peer_id {
                graph.add_edge(&cfg.id, &peer_id);
            }
        }
    }

    Ok(graph)
}

fn bare_address(url: &EndpointUrl) -> Option<String> {
    match url.scheme {
        Scheme::Tcp => Some(format!("tcp://{}:{}", url.authority, url.port?)),
        Scheme::Ipc => Some(format!("ipc://{}", url.authority)),
        Scheme::Ref => None,
    }
}

fn rewrite_with_address(original: &EndpointUrl, addr: &str) -> Result<String, RunnerError> {
    let mut resolved = EndpointUrl::parse(addr)?;
    resolved.topics = original.topics.clone();
    resolved.ephemeral = original.ephemeral;
    Ok(serialize_endpoint(&resolved))
}

fn serialize_endpoint(url: &EndpointUrl) -> String {
    let mut s = match url.scheme {
        Scheme::Tcp => format!("tcp://{}", url.authority),
        Scheme::Ipc => format!("ipc://{}", url.authority),
        Scheme::Ref => url.authority.clone(),
    };
    if let Some(port) = url.port {
        s.push(':');
        s.push_str(&port.to_string());
    }
    let topics = serialize_topics(&url.topics);
    if !topics.is_empty() {
        s.push(';');
        s.push_str(&topics);
    }
    if url.ephemeral {
        s.push('?');
    }
    s
}

fn serialize_topics(topics: &[TopicSpec]) -> String {
    topics
        .iter()
        .filter_map(|t| match t {
            TopicSpec::Default => None,
            TopicSpec::Wildcard => Some("*".to_string()),
            TopicSpec::Topic(name) => Some(name.clone()),
            TopicSpec::Rename { from, to } => Some(format!("{from}>{to}")),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Who reads from whom, derived once at wiring time. "Upstream of X" is the
/// set of ids X declares as sources; "downstream of X" is the set of ids
/// that declare X as one of theirs (§4.6 `prop_exit`).
pub struct DependencyGraph {
    upstream: HashMap<String, HashSet<String>>,
    downstream: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    fn new(ids: impl Iterator<Item = String>) -> Self {
        let mut upstream = HashMap::new();
        let mut downstream = HashMap::new();
        for id in ids {
            upstream.insert(id.clone(), HashSet::new());
            downstream.insert(id, HashSet::new());
        }
        Self { upstream, downstream }
    }

    fn add_edge(&mut self, consumer: &str, source: &str) {
        self.upstream.entry(consumer.to_string()).or_default().insert(source.to_string());
        self.downstream.entry(source.to_string()).or_default().insert(consumer.to_string());
    }

    pub fn upstream_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.upstream.get(id).into_iter().flatten()
    }

    pub fn downstream_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.downstream.get(id).into_iter().flatten()
    }
}
