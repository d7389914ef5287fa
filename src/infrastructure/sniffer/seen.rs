use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Raw PDUs already reported during one sniffing session.
///
/// Cloning shares the underlying set; every channel worker of a session holds
/// a clone. The set only grows and is dropped with the session.
#[derive(Debug, Clone, Default)]
pub struct SeenPduSet {
    inner: Arc<Mutex<HashSet<Vec<u8>>>>,
}

impl SeenPduSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pdu`, returning `true` if it had not been seen before.
    pub fn insert_if_absent(&self, pdu: &[u8]) -> bool {
        // A poisoned lock still holds a consistent set
        let mut seen = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if seen.contains(pdu) {
            return false;
        }
        seen.insert(pdu.to_vec())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent() {
        let seen = SeenPduSet::new();
        assert!(seen.insert_if_absent(&[0x40, 0x06, 1, 2, 3, 4, 5, 6]));
        assert!(!seen.insert_if_absent(&[0x40, 0x06, 1, 2, 3, 4, 5, 6]));
        assert!(seen.insert_if_absent(&[0x40, 0x06, 1, 2, 3, 4, 5, 7]));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts_are_not_lost() {
        let seen = SeenPduSet::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let seen = seen.clone();
                std::thread::spawn(move || {
                    (0..200u16)
                        .filter(|i| seen.insert_if_absent(&i.to_be_bytes()))
                        .count()
                })
            })
            .collect();

        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 200);
        assert_eq!(seen.len(), 200);
    }
}
