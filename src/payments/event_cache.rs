use std::collections::{HashSet, VecDeque};

/// Recently processed event ids, newest last. When the cache grows past
/// its capacity only the newest half is kept.
#[derive(Debug)]
pub struct EventCache {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    pub fn insert(&mut self, event_id: &str) {
        if !self.ids.insert(event_id.to_string()) {
            return;
        }
        self.order.push_back(event_id.to_string());

        if self.order.len() > self.capacity {
            let keep = self.capacity / 2;
            while self.order.len() > keep {
                if let Some(oldest) = self.order.pop_front() {
                    self.ids.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_inserted_ids() {
        let mut cache = EventCache::new(10);
        cache.insert("evt_1");
        cache.insert("evt_1");

        assert!(cache.contains("evt_1"));
        assert!(!cache.contains("evt_2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overflow_keeps_the_newest_half() {
        let mut cache = EventCache::new(4);
        for i in 1..=5 {
            cache.insert(&format!("evt_{i}"));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("evt_4"));
        assert!(cache.contains("evt_5"));
        assert!(!cache.contains("evt_1"));
        assert!(!cache.contains("evt_3"));
    }
}
