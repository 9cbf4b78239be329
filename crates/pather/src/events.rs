// Diagnostic side channel for visualization tools
//
// Publishing is fire-and-forget: observers are called inline on the
// publishing thread and a bus with no observers simply drops the event.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::math::Vec3;
use crate::triangle::ChunkKey;

#[derive(Clone, Debug, PartialEq)]
pub enum NavEvent {
    ChunkAdded { key: ChunkKey, triangles: usize },
    PathCreated { map_id: u32, points: Vec<Vec3> },
    LinesAdded { map_id: u32, points: Vec<Vec3>, label: String },
    SphereAdded { map_id: u32, center: Vec3, radius: f32, label: String },
}

pub trait NavObserver: Send + Sync {
    fn on_event(&self, event: &NavEvent);
}

impl<F> NavObserver for F
where
    F: Fn(&NavEvent) + Send + Sync,
{
    fn on_event(&self, event: &NavEvent) {
        self(event)
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Vec<Arc<dyn NavObserver>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn NavObserver>) {
        self.observers.write().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn publish(&self, event: NavEvent) {
        let observers = self.observers.read();
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_publish_without_observers() {
        let bus = EventBus::new();
        bus.publish(NavEvent::PathCreated {
            map_id: 0,
            points: vec![],
        });
        assert_eq!(bus.observer_count(), 0);
    }

    #[test]
    fn test_clones_share_observers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let bus = EventBus::new();
        bus.subscribe(Arc::new(move |e: &NavEvent| sink.lock().push(e.clone())));

        let other = bus.clone();
        other.publish(NavEvent::ChunkAdded {
            key: ChunkKey::new(0, 31, 31),
            triangles: 12,
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], NavEvent::ChunkAdded { triangles: 12, .. }));
    }
}
