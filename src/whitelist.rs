use crate::decoder::NodeSet;
use crate::filter::FilterTable;
use std::collections::BTreeSet;

/// Shaped node names to keep, ordered by byte value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    nodes: BTreeSet<Vec<u8>>,
}

impl Whitelist {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.nodes.contains(name)
    }

    /// Names in ascending byte order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.nodes.iter().map(Vec::as_slice)
    }
}

/// Resolve every observed name through the filter, dropping names it does not know.
pub fn build(observed: &NodeSet, filter: &FilterTable) -> Whitelist {
    let nodes = observed
        .iter()
        .filter_map(|name| filter.lookup(name))
        .map(<[u8]>::to_vec)
        .collect();
    Whitelist { nodes }
}
