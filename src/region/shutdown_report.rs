use std::io;

/// What happened to every handle that was still open when a cache shut down.
///
/// An empty report means nothing leaked.
#[derive(Debug)]
pub struct ShutdownReport<K> {
    closed: Vec<(K, io::Result<()>)>,
}

impl<K> ShutdownReport<K> {
    pub(crate) fn new(closed: Vec<(K, io::Result<()>)>) -> ShutdownReport<K> {
        ShutdownReport { closed }
    }

    /// Handles that were still open and had to be force closed.
    pub fn leaked_count(&self) -> usize {
        self.closed.len()
    }

    /// True when no handle was left open.
    pub fn is_clean(&self) -> bool {
        self.closed.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&K, &io::Error)> {
        self.closed
            .iter()
            .filter_map(|(k, res)| res.as_ref().err().map(|e| (k, e)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, io::Result<()>)> {
        self.closed.iter()
    }

    pub fn into_results(self) -> Vec<(K, io::Result<()>)> {
        self.closed
    }
}

impl<K> Default for ShutdownReport<K> {
    fn default() -> Self {
        Self::new(vec![])
    }
}
