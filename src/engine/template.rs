use std::sync::Arc;

use url::Url;

use crate::args::HttpMethod;

/// What every attempt of a run sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// One queued attempt: a sequence number plus the shared request shape.
///
/// Templates are immutable once enqueued; cloning only bumps a refcount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    seq: u64,
    spec: Arc<RequestSpec>,
}

impl RequestTemplate {
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }
}

/// Mints templates with increasing sequence numbers.
#[derive(Debug)]
pub struct TemplateFactory {
    spec: Arc<RequestSpec>,
    next_seq: u64,
}

impl TemplateFactory {
    #[must_use]
    pub fn new(spec: RequestSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            next_seq: 0,
        }
    }

    #[must_use]
    pub const fn minted(&self) -> u64 {
        self.next_seq
    }

    pub fn next_template(&mut self) -> RequestTemplate {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        RequestTemplate {
            seq,
            spec: Arc::clone(&self.spec),
        }
    }

    pub fn batch(&mut self, count: usize) -> impl Iterator<Item = RequestTemplate> + '_ {
        (0..count).map(move |_| self.next_template())
    }
}
